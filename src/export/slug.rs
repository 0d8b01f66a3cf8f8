//! Slug and filename helpers for the exported vault.

use chrono::{DateTime, Utc};

/// Lowercase, alphanumeric-and-dash slug, truncated to `max_chars` at a
/// dash boundary where possible.
pub fn slugify(text: &str, max_chars: usize) -> String {
    let slug = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.chars().count() <= max_chars {
        return slug;
    }
    let cut: String = slug.chars().take(max_chars).collect();
    match cut.rfind('-') {
        Some(position) if position > 0 => cut[..position].to_string(),
        _ => cut,
    }
}

/// Note filename: `YYYY-MM-DD__doc_type__slug__shortid.md`, dated by the
/// document's created date, never ingestion time.
pub fn note_filename(
    created: DateTime<Utc>,
    doc_type_label: &str,
    title: &str,
    short_id: &str,
) -> String {
    format!(
        "{}__{}__{}__{}.md",
        created.format("%Y-%m-%d"),
        doc_type_label,
        slugify(title, 40),
        short_id
    )
}

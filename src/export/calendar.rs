//! Daily, weekly, and monthly calendar notes.
//!
//! Each exported document links into `refs/days/<date>.md` under a
//! section for its document type; weekly and monthly roll-ups link their
//! constituent daily notes. Appends are deduplicated by note link, and
//! the exporter serializes writers per file with advisory locks.

use chrono::{DateTime, Datelike, Utc};
use std::path::{Path, PathBuf};

/// Relative path of the daily note for a date.
pub fn daily_path(date: DateTime<Utc>) -> PathBuf {
    PathBuf::from("refs")
        .join("days")
        .join(format!("{}.md", date.format("%Y-%m-%d")))
}

/// Relative path of the weekly note (ISO week) for a date.
pub fn weekly_path(date: DateTime<Utc>) -> PathBuf {
    let week = date.iso_week();
    PathBuf::from("refs")
        .join("weeks")
        .join(format!("{}-W{:02}.md", week.year(), week.week()))
}

/// Relative path of the monthly note for a date.
pub fn monthly_path(date: DateTime<Utc>) -> PathBuf {
    PathBuf::from("refs")
        .join("months")
        .join(format!("{}.md", date.format("%Y-%m")))
}

fn type_section_title(doc_type_label: &str) -> String {
    let mut chars = doc_type_label.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    format!("## {}", capitalized.replace('_', " "))
}

/// Append `entry` under `section` of the markdown file at `path`,
/// creating file and section as needed. No-op when the entry is already
/// present anywhere in the file.
pub fn append_under_section(
    path: &Path,
    header: &str,
    section: &str,
    entry: &str,
) -> std::io::Result<bool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => format!("# {header}\n"),
        Err(e) => return Err(e),
    };

    if content.contains(entry) {
        return Ok(false);
    }

    if let Some(position) = content.find(section) {
        // Insert at the end of this section: before the next "## " or EOF.
        let after_heading = position + section.len();
        let insert_at = content[after_heading..]
            .find("\n## ")
            .map(|offset| after_heading + offset)
            .unwrap_or(content.len());
        let insertion = format!("\n{entry}");
        let insert_at = if insert_at == content.len() && !content.ends_with('\n') {
            content.push('\n');
            content.len()
        } else {
            insert_at
        };
        content.insert_str(insert_at, &insertion);
    } else {
        if !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&format!("\n{section}\n{entry}\n"));
    }

    std::fs::write(path, content)?;
    Ok(true)
}

/// Link a document into its daily note and roll the day up into the
/// weekly and monthly notes.
pub fn record_document(
    vault_root: &Path,
    created: DateTime<Utc>,
    doc_type_label: &str,
    note_stem: &str,
    title: &str,
) -> std::io::Result<()> {
    let day_label = created.format("%Y-%m-%d").to_string();

    let daily = vault_root.join(daily_path(created));
    append_under_section(
        &daily,
        &day_label,
        &type_section_title(doc_type_label),
        &format!("- [[{note_stem}|{title}]]"),
    )?;

    let daily_link = format!("- [[refs/days/{day_label}|{day_label}]]");
    let week = created.iso_week();
    append_under_section(
        &vault_root.join(weekly_path(created)),
        &format!("{}-W{:02}", week.year(), week.week()),
        "## Days",
        &daily_link,
    )?;
    append_under_section(
        &vault_root.join(monthly_path(created)),
        &created.format("%Y-%m").to_string(),
        "## Days",
        &daily_link,
    )?;
    Ok(())
}

//! Markdown note rendering: unified frontmatter schema plus body layout.

use super::links::{link_entities, LinkTarget};
use super::slug::slugify;
use crate::chunk::{IGNORE_END, IGNORE_START};
use crate::config::AutoLinkMode;
use crate::enrich::{EnrichedMetadata, EntityRef};
use crate::extract::ExtractedDocument;
use crate::triage::Fingerprint;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything the renderer needs for one note.
pub struct NoteContext<'a> {
    pub doc_id: &'a str,
    pub doc: &'a ExtractedDocument,
    pub metadata: &'a EnrichedMetadata,
    pub fingerprint: &'a Fingerprint,
    pub triage_category: &'a str,
    pub do_index: bool,
    pub created_date: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub source_filename: &'a str,
}

#[derive(Serialize)]
struct FrontmatterDate<'a> {
    label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    iso: Option<&'a str>,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
struct RagBlock<'a> {
    quality_score: f64,
    recency_score: f64,
    novelty: f64,
    actionability: f64,
    signalness: f64,
    do_index: bool,
    triage_category: &'a str,
    enrichment_version: &'a str,
    provenance: Provenance<'a>,
}

#[derive(Serialize)]
struct Provenance<'a> {
    sha256: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_path: Option<&'a str>,
}

#[derive(Serialize)]
struct Frontmatter<'a> {
    id: &'a str,
    title: &'a str,
    source: &'a str,
    doc_type: &'a str,
    created_at: String,
    ingested_at: String,
    topics: &'a [String],
    projects: &'a [String],
    places: &'a [String],
    people: Vec<&'a str>,
    organizations: Vec<&'a str>,
    technologies: Vec<&'a str>,
    dates: Vec<FrontmatterDate<'a>>,
    tags: Vec<String>,
    rag: RagBlock<'a>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    gated: bool,
}

fn labels(entities: &[EntityRef]) -> Vec<&str> {
    entities.iter().map(|e| e.display_label()).collect()
}

fn date_kind_label(kind: crate::enrich::DateKind) -> &'static str {
    match kind {
        crate::enrich::DateKind::Absolute => "absolute",
        crate::enrich::DateKind::Relative => "relative",
        crate::enrich::DateKind::Implicit => "implicit",
    }
}

/// Derived namespaced tags, one per controlled-vocabulary value.
fn derive_tags(context: &NoteContext<'_>) -> Vec<String> {
    let metadata = context.metadata;
    let mut tags = Vec::new();
    for topic in &metadata.topics {
        tags.push(format!("topic/{}", slugify(topic, 60)));
    }
    for project in &metadata.projects {
        // Project ids already namespace themselves (project/...).
        let tag = if project.starts_with("project/") {
            project.clone()
        } else {
            format!("project/{}", slugify(project, 60))
        };
        tags.push(tag);
    }
    for place in &metadata.places {
        tags.push(format!("place/{}", slugify(place, 60)));
    }
    for person in &metadata.people {
        tags.push(format!("person/{}", slugify(person.display_label(), 60)));
    }
    for org in &metadata.organizations {
        tags.push(format!("org/{}", slugify(org.display_label(), 60)));
    }
    tags.push(format!("doc/{}", context.doc.doc_type.label()));
    tags
}

/// Render the YAML frontmatter block.
fn render_frontmatter(context: &NoteContext<'_>) -> Result<String, serde_yaml::Error> {
    let metadata = context.metadata;
    let frontmatter = Frontmatter {
        id: context.doc_id,
        title: &metadata.title,
        source: context.source_filename,
        doc_type: context.doc.doc_type.label(),
        created_at: context.created_date.format("%Y-%m-%d").to_string(),
        ingested_at: context.ingested_at.to_rfc3339(),
        topics: &metadata.topics,
        projects: &metadata.projects,
        places: &metadata.places,
        people: labels(&metadata.people),
        organizations: labels(&metadata.organizations),
        technologies: labels(&metadata.technologies),
        dates: metadata
            .dates
            .iter()
            .map(|d| FrontmatterDate {
                label: &d.raw,
                iso: d.iso.as_deref(),
                kind: date_kind_label(d.kind),
            })
            .collect(),
        tags: derive_tags(context),
        rag: RagBlock {
            quality_score: metadata.quality_score,
            recency_score: metadata.recency_score,
            novelty: metadata.novelty,
            actionability: metadata.actionability,
            signalness: metadata.signalness,
            do_index: context.do_index,
            triage_category: context.triage_category,
            enrichment_version: &metadata.enrichment_version,
            provenance: Provenance {
                sha256: &context.fingerprint.content_sha256,
                original_path: context.doc.source.original_path.as_deref(),
            },
        },
        gated: !context.do_index,
    };
    serde_yaml::to_string(&frontmatter)
}

/// All linkable entities of a note, dates included.
pub fn link_targets(metadata: &EnrichedMetadata) -> Vec<LinkTarget> {
    let mut targets: Vec<LinkTarget> = metadata.all_entities().map(LinkTarget::from_entity).collect();
    for date in &metadata.dates {
        if let Some(iso) = &date.iso {
            targets.push(LinkTarget {
                label: date.raw.clone(),
                path: format!("refs/dates/{iso}"),
            });
        }
    }
    targets
}

fn entity_group_line(name: &str, entities: &[EntityRef]) -> Option<String> {
    if entities.is_empty() {
        return None;
    }
    let links: Vec<String> = entities
        .iter()
        .map(|entity| {
            let target = LinkTarget::from_entity(entity);
            format!("[[{}|{}]]", target.path, target.label)
        })
        .collect();
    Some(format!("- **{}**: {}", name, links.join(", ")))
}

/// Render the full note.
pub fn render_note(
    context: &NoteContext<'_>,
    auto_link: AutoLinkMode,
) -> Result<String, serde_yaml::Error> {
    let metadata = context.metadata;
    let frontmatter = render_frontmatter(context)?;
    let targets = link_targets(metadata);
    let content = link_entities(&context.doc.text, &targets, auto_link);

    let mut body = String::new();
    body.push_str("---\n");
    body.push_str(&frontmatter);
    body.push_str("---\n\n");
    body.push_str(&format!("# {}\n\n", metadata.title));
    if !metadata.summary.is_empty() {
        body.push_str(&format!("> Summary: {}\n\n", metadata.summary));
    }

    body.push_str("## Key Facts\n\n");
    body.push_str(&format!(
        "- Type: {} · Created: {} · Category: {}\n",
        context.doc.doc_type.label(),
        context.created_date.format("%Y-%m-%d"),
        context.triage_category,
    ));
    body.push_str(&format!(
        "- Signalness: {:.2} · Quality: {:.2} · Recency: {:.2}\n",
        metadata.signalness, metadata.quality_score, metadata.recency_score,
    ));
    if !metadata.topics.is_empty() {
        body.push_str(&format!("- Topics: {}\n", metadata.topics.join(", ")));
    }
    if !metadata.projects.is_empty() {
        body.push_str(&format!("- Projects: {}\n", metadata.projects.join(", ")));
    }
    body.push('\n');

    body.push_str("## Content\n\n");
    body.push_str(content.trim_end());
    body.push_str("\n\n");

    let entity_lines: Vec<String> = [
        entity_group_line("People", &metadata.people),
        entity_group_line("Organizations", &metadata.organizations),
        entity_group_line("Technologies", &metadata.technologies),
        entity_group_line("Events", &metadata.events),
        entity_group_line("Concepts", &metadata.concepts),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !entity_lines.is_empty() {
        body.push_str("## Entities\n\n");
        body.push_str(&entity_lines.join("\n"));
        body.push_str("\n\n");
    }

    body.push_str("## Related Notes\n\n");
    body.push_str(&format!(
        "- [[refs/days/{}|Daily note]]\n",
        context.created_date.format("%Y-%m-%d")
    ));
    for project in &metadata.projects {
        body.push_str(&format!("- #{project}\n"));
    }
    body.push('\n');

    // Xref block: every referenced stub, excluded from embeddings.
    body.push_str(IGNORE_START);
    body.push_str("\n## Xref\n\n");
    for target in &targets {
        body.push_str(&format!("[[{}|{}]] ", target.path, target.label));
    }
    body.push('\n');
    body.push_str(IGNORE_END);
    body.push('\n');

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::EntityKind;
    use crate::extract::DocumentType;
    use chrono::TimeZone;

    fn sample_context<'a>(
        doc: &'a ExtractedDocument,
        metadata: &'a EnrichedMetadata,
        fingerprint: &'a Fingerprint,
    ) -> NoteContext<'a> {
        NoteContext {
            doc_id: "doc-1",
            doc,
            metadata,
            fingerprint,
            triage_category: "archival",
            do_index: true,
            created_date: Utc.with_ymd_and_hms(2024, 1, 22, 10, 30, 0).unwrap(),
            ingested_at: Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap(),
            source_filename: "update.eml",
        }
    }

    fn sample_metadata() -> EnrichedMetadata {
        let mut metadata = EnrichedMetadata::failed_shell("Kita schedule update", "v2");
        metadata.enrichment_failed = false;
        metadata.summary = "Weekly Kita schedule.".into();
        metadata.topics = vec!["education".into()];
        metadata.technologies = vec![EntityRef::unlinked("Fedora", EntityKind::Technology)];
        metadata.signalness = 0.4;
        metadata
    }

    fn sample_doc() -> ExtractedDocument {
        ExtractedDocument {
            text: "Schedule uses Fedora for the display kiosk.".into(),
            doc_type: DocumentType::Email,
            ..Default::default()
        }
    }

    #[test]
    fn frontmatter_has_unified_schema_fields() {
        let doc = sample_doc();
        let metadata = sample_metadata();
        let fingerprint = Fingerprint::compute(&doc);
        let note = render_note(&sample_context(&doc, &metadata, &fingerprint), AutoLinkMode::First)
            .unwrap();

        assert!(note.starts_with("---\n"));
        assert!(note.contains("id: doc-1"));
        assert!(note.contains("created_at: '2024-01-22'") || note.contains("created_at: 2024-01-22"));
        assert!(note.contains("doc_type: email"));
        assert!(note.contains("- topic/education"));
        assert!(note.contains("- doc/email"));
        assert!(note.contains("rag:"));
        assert!(note.contains("do_index: true"));
        assert!(note.contains("sha256:"));
        assert!(!note.contains("gated: true"));
    }

    #[test]
    fn gated_notes_carry_the_flag() {
        let doc = sample_doc();
        let metadata = sample_metadata();
        let fingerprint = Fingerprint::compute(&doc);
        let mut context = sample_context(&doc, &metadata, &fingerprint);
        context.do_index = false;
        let note = render_note(&context, AutoLinkMode::First).unwrap();
        assert!(note.contains("gated: true"));
        assert!(note.contains("do_index: false"));
    }

    #[test]
    fn body_sections_appear_in_order() {
        let doc = sample_doc();
        let metadata = sample_metadata();
        let fingerprint = Fingerprint::compute(&doc);
        let note = render_note(&sample_context(&doc, &metadata, &fingerprint), AutoLinkMode::First)
            .unwrap();

        let title = note.find("# Kita schedule update").unwrap();
        let summary = note.find("> Summary:").unwrap();
        let facts = note.find("## Key Facts").unwrap();
        let content = note.find("## Content").unwrap();
        let entities = note.find("## Entities").unwrap();
        let related = note.find("## Related Notes").unwrap();
        let xref = note.find("## Xref").unwrap();
        assert!(title < summary && summary < facts && facts < content);
        assert!(content < entities && entities < related && related < xref);
    }

    #[test]
    fn content_is_auto_linked_and_xref_is_ignored() {
        let doc = sample_doc();
        let metadata = sample_metadata();
        let fingerprint = Fingerprint::compute(&doc);
        let note = render_note(&sample_context(&doc, &metadata, &fingerprint), AutoLinkMode::First)
            .unwrap();

        assert!(note.contains("[[refs/technologies/fedora|Fedora]] for the display kiosk"));
        let xref_position = note.find("## Xref").unwrap();
        let ignore_position = note.find(IGNORE_START).unwrap();
        assert!(ignore_position < xref_position);
    }
}

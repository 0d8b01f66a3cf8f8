//! Enrichment record types.
//!
//! `EnrichmentDraft` is the JSON shape the LLM must emit; its schema is
//! derived with schemars and embedded in the prompt. `EnrichedMetadata` is
//! the validated, concept-linked, scored record the pipeline persists.
//! Records carry `enrichment_version`; older versions are migrated
//! explicitly, never duck-typed.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Typed entity categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Organization,
    Technology,
    Event,
    Concept,
}

impl EntityKind {
    /// Vault subdirectory for this entity kind's stub pages.
    pub fn stub_dir(&self) -> &'static str {
        match self {
            EntityKind::Person => "persons",
            EntityKind::Organization => "orgs",
            EntityKind::Technology => "technologies",
            EntityKind::Event => "events",
            EntityKind::Concept => "concepts",
        }
    }

    /// Namespace prefix used in frontmatter tags.
    pub fn tag_namespace(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Organization => "org",
            EntityKind::Technology => "tech",
            EntityKind::Event => "event",
            EntityKind::Concept => "concept",
        }
    }
}

/// An extracted entity, optionally linked to a vocabulary concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Surface form as it appears in the document.
    pub label: String,
    pub kind: EntityKind,
    /// Canonical concept id on a vocabulary hit (e.g., `vocab:Fedora`).
    pub concept_id: Option<String>,
    pub pref_label: Option<String>,
    /// Broader-concept path from the vocabulary.
    pub broader: Vec<String>,
    /// Unlinked entity worth adding to the vocabulary.
    pub suggested_for_vocab: bool,
}

impl EntityRef {
    pub fn unlinked(label: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            label: label.into(),
            kind,
            concept_id: None,
            pref_label: None,
            broader: Vec::new(),
            suggested_for_vocab: false,
        }
    }

    /// Display name preferring the canonical label.
    pub fn display_label(&self) -> &str {
        self.pref_label.as_deref().unwrap_or(&self.label)
    }
}

/// How a date was expressed in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DateKind {
    Absolute,
    Relative,
    Implicit,
}

/// A structured date mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRef {
    /// Verbatim text from the document.
    pub raw: String,
    /// Resolved ISO date (YYYY-MM-DD); absent when resolution failed.
    pub iso: Option<String>,
    pub kind: DateKind,
    /// What a relative date was resolved against.
    pub context_reference: Option<String>,
}

/// A date mention as emitted by the LLM, before resolution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DraftDate {
    /// The date exactly as written in the document.
    pub raw: String,
    /// ISO date if the mention is absolute, else null.
    #[serde(default)]
    pub iso: Option<String>,
    pub kind: DateKind,
}

/// The JSON object the enrichment LLM must return.
///
/// Entity fields are plain surface strings; linking and typing enforcement
/// happen in post-validation, not in the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EnrichmentDraft {
    /// Descriptive title, 10-80 characters.
    pub title: String,
    /// Two to four sentence summary.
    pub summary: String,
    /// Topics, restricted to the provided topic vocabulary.
    pub topics: Vec<String>,
    /// Projects, restricted to the provided project vocabulary.
    pub projects: Vec<String>,
    /// Places, restricted to the provided place vocabulary.
    pub places: Vec<String>,
    /// Real persons named in the document. Never software or products.
    pub people: Vec<String>,
    pub organizations: Vec<String>,
    /// Software, hardware, tools, and products.
    pub technologies: Vec<String>,
    pub events: Vec<String>,
    /// Abstract concepts central to the document.
    pub concepts: Vec<String>,
    pub dates: Vec<DraftDate>,
    /// Subject domain (e.g., "education", "infrastructure").
    pub domain: Option<String>,
    /// One of "low", "medium", "high".
    pub complexity: Option<String>,
    /// How much new information this adds, 0.0-1.0.
    pub novelty: Option<f64>,
    /// How action-demanding the content is, 0.0-1.0.
    pub actionability: Option<f64>,
}

/// Validated, linked, scored metadata. Immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedMetadata {
    pub title: String,
    pub summary: String,
    pub topics: Vec<String>,
    pub projects: Vec<String>,
    pub places: Vec<String>,
    pub people: Vec<EntityRef>,
    pub organizations: Vec<EntityRef>,
    pub technologies: Vec<EntityRef>,
    pub events: Vec<EntityRef>,
    pub concepts: Vec<EntityRef>,
    pub dates: Vec<DateRef>,
    /// Out-of-vocabulary values awaiting curator review.
    pub suggested_vocabulary_additions: Vec<String>,
    pub recency_score: f64,
    pub quality_score: f64,
    pub novelty: f64,
    pub actionability: f64,
    /// quality × novelty × actionability, all in [0,1].
    pub signalness: f64,
    pub domain: Option<String>,
    pub complexity: Option<String>,
    pub enrichment_version: String,
    /// Set when the whole provider chain failed; the gate drops these.
    pub enrichment_failed: bool,
}

impl EnrichedMetadata {
    /// Minimal shell used when enrichment fails: extraction title, empty
    /// lists, zero scores. The quality gate stops these documents.
    pub fn failed_shell(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: String::new(),
            topics: Vec::new(),
            projects: Vec::new(),
            places: Vec::new(),
            people: Vec::new(),
            organizations: Vec::new(),
            technologies: Vec::new(),
            events: Vec::new(),
            concepts: Vec::new(),
            dates: Vec::new(),
            suggested_vocabulary_additions: Vec::new(),
            recency_score: 0.0,
            quality_score: 0.0,
            novelty: 0.0,
            actionability: 0.0,
            signalness: 0.0,
            domain: None,
            complexity: None,
            enrichment_version: version.into(),
            enrichment_failed: true,
        }
    }

    /// Every linked or unlinked entity, across kinds.
    pub fn all_entities(&self) -> impl Iterator<Item = &EntityRef> {
        self.people
            .iter()
            .chain(&self.organizations)
            .chain(&self.technologies)
            .chain(&self.events)
            .chain(&self.concepts)
    }

    /// Canonical entity names for the fingerprint entity-set hash.
    pub fn canonical_entity_names(&self) -> Vec<String> {
        self.all_entities()
            .map(|e| e.display_label().to_string())
            .collect()
    }
}

/// Critic output: seven rubric scores in [0,5] plus the weighted aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScores {
    pub schema_compliance: f64,
    pub entity_quality: f64,
    pub topic_relevance: f64,
    pub summary_quality: f64,
    pub task_identification: f64,
    pub privacy: f64,
    pub chunking_suitability: f64,
    pub aggregate: f64,
    pub suggestions: Vec<String>,
}

/// Date carried on a document context when no better source exists.
pub fn fallback_created_date() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_shell_has_zero_signalness() {
        let shell = EnrichedMetadata::failed_shell("Some Title", "v2");
        assert!(shell.enrichment_failed);
        assert_eq!(shell.signalness, 0.0);
        assert!(shell.topics.is_empty());
    }

    #[test]
    fn draft_schema_mentions_required_fields() {
        let schema = schemars::schema_for!(EnrichmentDraft);
        let json = serde_json::to_string(&schema).unwrap();
        for field in ["title", "summary", "topics", "people", "technologies", "dates"] {
            assert!(json.contains(field), "schema missing {field}");
        }
    }

    #[test]
    fn draft_tolerates_missing_fields() {
        let draft: EnrichmentDraft = serde_json::from_str(r#"{"title": "T"}"#).unwrap();
        assert_eq!(draft.title, "T");
        assert!(draft.topics.is_empty());
        assert!(draft.novelty.is_none());
    }
}

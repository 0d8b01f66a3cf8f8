//! Post-validation of LLM enrichment output.
//!
//! The LLM is constrained by the vocabulary but never trusted: every
//! controlled field is re-checked here. Out-of-vocabulary values get one
//! repair attempt (edit distance <= 2, or an alt-label hit) before moving
//! to `suggested_vocabulary_additions`. People that name software or
//! hardware are reclassified into technologies. Validation is a fixed
//! point: running it twice changes nothing.

use super::schema::{EntityKind, EntityRef};
use super::vocabulary::{concept_label_index, ConceptKind, Vocabulary};
use chrono::{DateTime, Utc};

/// Maximum edit distance for vocabulary repair.
const REPAIR_DISTANCE: usize = 2;

/// Outcome of validating one controlled list.
#[derive(Debug, Default, PartialEq)]
pub struct ValidatedList {
    /// Values confirmed (or repaired) against the vocabulary, canonical
    /// spelling, original order, de-duplicated.
    pub values: Vec<String>,
    /// Values that could not be repaired.
    pub suggestions: Vec<String>,
}

/// Validate a controlled list against its vocabulary.
pub fn validate_list(candidates: &[String], vocabulary: &[String]) -> ValidatedList {
    let mut out = ValidatedList::default();
    for candidate in candidates {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        let resolved = Vocabulary::canonical(vocabulary, candidate)
            .or_else(|| Vocabulary::nearest(vocabulary, candidate, REPAIR_DISTANCE));
        match resolved {
            Some(canonical) => {
                if !out.values.iter().any(|v| v == canonical) {
                    out.values.push(canonical.to_string());
                }
            }
            None => {
                if !out.suggestions.iter().any(|s| s == candidate) {
                    out.suggestions.push(candidate.to_string());
                }
            }
        }
    }
    out
}

/// Link an entity surface form against the concept table.
pub fn link_entity(label: &str, kind: EntityKind, vocabulary: &Vocabulary) -> EntityRef {
    match vocabulary.find_concept(label) {
        Some(concept) => EntityRef {
            label: label.to_string(),
            kind,
            concept_id: Some(concept.id.clone()),
            pref_label: Some(concept.pref_label.clone()),
            broader: concept.broader.clone(),
            suggested_for_vocab: false,
        },
        None => EntityRef {
            suggested_for_vocab: true,
            ..EntityRef::unlinked(label, kind)
        },
    }
}

/// Build entity lists from draft surface forms, enforcing typing rules.
///
/// Returns (people, technologies) after moving any "person" whose label
/// matches a Software or Hardware concept into the technology list.
pub fn classify_people(
    people: &[String],
    technologies: &mut Vec<EntityRef>,
    vocabulary: &Vocabulary,
) -> Vec<EntityRef> {
    let index = concept_label_index(vocabulary);
    let mut validated_people = Vec::new();
    for label in people {
        let label = label.trim();
        if label.is_empty() {
            continue;
        }
        let misfiled = index
            .get(&label.to_lowercase())
            .map(|concept| matches!(concept.kind, ConceptKind::Software | ConceptKind::Hardware))
            .unwrap_or(false);
        if misfiled {
            let entity = link_entity(label, EntityKind::Technology, vocabulary);
            if !technologies.iter().any(|t| t.label == entity.label) {
                technologies.push(entity);
            }
        } else {
            validated_people.push(link_entity(label, EntityKind::Person, vocabulary));
        }
    }
    validated_people
}

/// Build a deduplicated entity list of one kind from draft surface forms.
pub fn link_entities(labels: &[String], kind: EntityKind, vocabulary: &Vocabulary) -> Vec<EntityRef> {
    let mut out: Vec<EntityRef> = Vec::new();
    for label in labels {
        let label = label.trim();
        if label.is_empty() {
            continue;
        }
        let entity = link_entity(label, kind, vocabulary);
        if !out
            .iter()
            .any(|existing| existing.display_label().eq_ignore_ascii_case(entity.display_label()))
        {
            out.push(entity);
        }
    }
    out
}

// --- Title rules ---

/// Phrases that mark a title as LLM filler rather than description.
const GENERIC_PHRASES: &[&str] = &[
    "untitled",
    "here are",
    "here is",
    "key points",
    "summary of the document",
    "no title",
];

/// A generic title is rejected and regenerated once.
pub fn is_generic_title(title: &str, filename: &str) -> bool {
    let trimmed = title.trim();
    let chars = trimmed.chars().count();
    if chars < 10 || chars > 80 {
        return true;
    }
    let lower = trimmed.to_lowercase();
    if GENERIC_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return true;
    }
    // Filename-shaped: equals the upload name, or looks like one.
    let stem = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    if lower == filename.to_lowercase() || lower == stem.to_lowercase() {
        return true;
    }
    let wordless = !trimmed.contains(' ');
    wordless && (trimmed.contains('_') || trimmed.contains('-') || trimmed.contains('.'))
}

/// Last-resort title: date-prefixed filename stem.
pub fn fallback_title(filename: &str, created: DateTime<Utc>) -> String {
    let stem = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename)
        .replace(['_', '-'], " ");
    let stem = if stem.trim().is_empty() {
        "document".to_string()
    } else {
        stem.trim().to_string()
    };
    format!("{} {}", created.format("%Y-%m-%d"), stem)
}

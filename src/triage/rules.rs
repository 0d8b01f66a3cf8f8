//! Junk heuristics and pattern rules.
//!
//! Junk detection runs before any LLM spend: very short documents,
//! marketing blasts, header-only emails. Pattern rules classify documents
//! into actionable categories (financial, legal, medical, scheduling) that
//! continue through the pipeline as metadata.

use crate::extract::{email, DocumentType, ExtractedDocument};

/// Below this many chars a document is junk outright.
const MIN_CONTENT_CHARS: usize = 25;

/// Marketing phrases; two or more hits mark the document as junk.
const MARKETING_PATTERNS: &[&str] = &[
    "unsubscribe",
    "limited time offer",
    "click here",
    "view this email in your browser",
    "special offer",
    "act now",
    "exclusive deal",
    "no longer wish to receive",
];

/// Why a document was classified as junk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JunkReason {
    TooShort,
    Marketing,
    HeaderOnlyEmail,
}

impl std::fmt::Display for JunkReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JunkReason::TooShort => write!(f, "content below minimum length"),
            JunkReason::Marketing => write!(f, "marketing patterns"),
            JunkReason::HeaderOnlyEmail => write!(f, "header-only email"),
        }
    }
}

/// Check the junk heuristics, cheapest first.
pub fn junk_reason(doc: &ExtractedDocument) -> Option<JunkReason> {
    if doc.text.trim().chars().count() < MIN_CONTENT_CHARS {
        return Some(JunkReason::TooShort);
    }
    if doc.doc_type == DocumentType::Email && email::is_header_only(doc) {
        return Some(JunkReason::HeaderOnlyEmail);
    }
    let lower = doc.text.to_lowercase();
    let hits = MARKETING_PATTERNS
        .iter()
        .filter(|pattern| lower.contains(*pattern))
        .count();
    if hits >= 2 {
        return Some(JunkReason::Marketing);
    }
    None
}

/// An actionable category matched by pattern rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionableKind {
    Financial,
    Legal,
    Medical,
    Scheduling,
}

struct PatternRule {
    kind: ActionableKind,
    keywords: &'static [&'static str],
    /// Confidence contribution per keyword hit, saturating at 0.9.
    weight: f64,
}

const PATTERN_RULES: &[PatternRule] = &[
    PatternRule {
        kind: ActionableKind::Financial,
        keywords: &[
            "invoice", "rechnung", "payment due", "iban", "account statement", "tax", "steuer",
            "betrag",
        ],
        weight: 0.25,
    },
    PatternRule {
        kind: ActionableKind::Legal,
        keywords: &[
            "contract", "vertrag", "terms and conditions", "hereby", "kündigung", "notice period",
            "liability",
        ],
        weight: 0.25,
    },
    PatternRule {
        kind: ActionableKind::Medical,
        keywords: &[
            "diagnosis", "prescription", "arzt", "patient", "befund", "impfung", "appointment with dr",
        ],
        weight: 0.3,
    },
    PatternRule {
        kind: ActionableKind::Scheduling,
        keywords: &[
            "schedule", "termin", "meeting on", "calendar", "rsvp", "deadline", "due date",
        ],
        weight: 0.2,
    },
];

/// Best-matching actionable category with its confidence, if any rule hits.
pub fn actionable_match(doc: &ExtractedDocument) -> Option<(ActionableKind, f64)> {
    let lower = doc.text.to_lowercase();
    let mut best: Option<(ActionableKind, f64)> = None;
    for rule in PATTERN_RULES {
        let hits = rule
            .keywords
            .iter()
            .filter(|keyword| lower.contains(*keyword))
            .count();
        if hits == 0 {
            continue;
        }
        let confidence = (rule.weight * hits as f64).min(0.9);
        if best.map(|(_, c)| confidence > c).unwrap_or(true) {
            best = Some((rule.kind, confidence));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractedDocument;

    fn doc_with_text(text: &str) -> ExtractedDocument {
        ExtractedDocument {
            text: text.to_string(),
            doc_type: DocumentType::Text,
            ..Default::default()
        }
    }

    #[test]
    fn tiny_documents_are_junk() {
        assert_eq!(
            junk_reason(&doc_with_text("hi")),
            Some(JunkReason::TooShort)
        );
    }

    #[test]
    fn marketing_needs_two_patterns() {
        let one = doc_with_text("Please unsubscribe if you want, otherwise enjoy the newsletter with actual content worth reading.");
        assert_eq!(junk_reason(&one), None);

        let two = doc_with_text(
            "Limited time offer! Click here to claim your discount before it expires tonight.",
        );
        assert_eq!(junk_reason(&two), Some(JunkReason::Marketing));
    }

    #[test]
    fn invoice_text_matches_financial() {
        let doc = doc_with_text(
            "Invoice 2024-017: payment due by 15 March. IBAN DE02 1234 5678 9012 3456 78.",
        );
        let (kind, confidence) = actionable_match(&doc).unwrap();
        assert_eq!(kind, ActionableKind::Financial);
        assert!(confidence > 0.4);
    }

    #[test]
    fn plain_prose_matches_nothing() {
        let doc = doc_with_text(
            "Yesterday we walked through the park and discussed the novel's unusual structure.",
        );
        assert!(actionable_match(&doc).is_none());
    }
}

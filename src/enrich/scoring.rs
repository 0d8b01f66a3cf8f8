//! Enrichment scoring heuristics.
//!
//! recency decays exponentially with document age; entity richness,
//! content depth, and extraction confidence are simple count/length
//! heuristics. signalness is the product of quality, novelty, and
//! actionability and is what the quality gate thresholds against.

use crate::extract::{ExtractedDocument, ExtractionMethod};
use chrono::{DateTime, Utc};

/// Characters at which content depth saturates.
const DEPTH_SATURATION_CHARS: f64 = 5000.0;

/// Entities at which entity richness saturates.
const RICHNESS_SATURATION: f64 = 10.0;

/// `exp(-age_days / tau)`, clamped to [0,1].
pub fn recency_score(created: DateTime<Utc>, now: DateTime<Utc>, tau_days: f64) -> f64 {
    let age_days = (now - created).num_seconds().max(0) as f64 / 86_400.0;
    (-age_days / tau_days.max(f64::EPSILON)).exp().clamp(0.0, 1.0)
}

pub fn entity_richness(entity_count: usize) -> f64 {
    (entity_count as f64 / RICHNESS_SATURATION).min(1.0)
}

pub fn content_depth(text: &str) -> f64 {
    (text.chars().count() as f64 / DEPTH_SATURATION_CHARS).min(1.0)
}

/// Confidence in the extraction path that produced the text.
pub fn extraction_confidence(doc: &ExtractedDocument) -> f64 {
    let base = match doc.extraction_method {
        ExtractionMethod::Native => 1.0,
        ExtractionMethod::Ocr => 0.7,
        ExtractionMethod::VisualLlm => 0.6,
    };
    if doc.truncated {
        base * 0.9
    } else {
        base
    }
}

/// Weighted aggregate of the sub-scores, in [0,1].
pub fn quality_score(
    richness: f64,
    depth: f64,
    extraction: f64,
    recency: f64,
) -> f64 {
    (0.3 * richness + 0.3 * depth + 0.2 * extraction + 0.2 * recency).clamp(0.0, 1.0)
}

/// quality x novelty x actionability.
pub fn signalness(quality: f64, novelty: f64, actionability: f64) -> f64 {
    (quality.clamp(0.0, 1.0) * novelty.clamp(0.0, 1.0) * actionability.clamp(0.0, 1.0))
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::extract::DocumentType;

    #[test]
    fn fresh_documents_score_near_one() {
        let now = Utc::now();
        let score = recency_score(now, now, 180.0);
        assert!(score > 0.99);
    }

    #[test]
    fn recency_halves_around_tau_ln2() {
        let now = Utc::now();
        let created = now - Duration::days(125); // ~180 * ln 2
        let score = recency_score(created, now, 180.0);
        assert!((score - 0.5).abs() < 0.01, "score was {score}");
    }

    #[test]
    fn richness_and_depth_saturate() {
        assert_eq!(entity_richness(25), 1.0);
        assert!(entity_richness(5) < 1.0);
        assert_eq!(content_depth(&"x".repeat(10_000)), 1.0);
    }

    #[test]
    fn near_empty_documents_stay_below_gate() {
        // Scenario: < 100 chars, no entities, moderate LLM estimates.
        let quality = quality_score(
            entity_richness(0),
            content_depth("A tiny note with barely any content at all."),
            1.0,
            1.0,
        );
        let signal = signalness(quality, 0.5, 0.5);
        assert!(signal < 0.2, "signalness was {signal}");
    }

    #[test]
    fn ocr_extraction_lowers_confidence() {
        let doc = ExtractedDocument {
            doc_type: DocumentType::Scanned,
            extraction_method: ExtractionMethod::Ocr,
            ..Default::default()
        };
        assert_eq!(extraction_confidence(&doc), 0.7);
    }
}

//! Quality gate: decide whether a document is indexed.
//!
//! Fail-closed counterpart to triage: no vectors without usable metadata.
//! Gated documents still export with `gated: true` and land in the
//! metadata index so future duplicate detection sees them.

use crate::enrich::{EnrichedMetadata, QualityScores};
use crate::triage::{TriageCategory, TriageDecision};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Minimum critic aggregate (0-5) when the critic is enabled.
const MIN_CRITIC_AGGREGATE: f64 = 2.0;

/// Why a document was gated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    EnrichmentFailed,
    LowSignalness { signalness: f64, sigma_min: f64 },
    Junk,
    CriticScore { aggregate: f64 },
}

impl std::fmt::Display for GateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateReason::EnrichmentFailed => write!(f, "enrichment failed"),
            GateReason::LowSignalness {
                signalness,
                sigma_min,
            } => write!(f, "signalness {signalness:.3} below {sigma_min}"),
            GateReason::Junk => write!(f, "triaged as junk"),
            GateReason::CriticScore { aggregate } => {
                write!(f, "critic aggregate {aggregate:.2} below {MIN_CRITIC_AGGREGATE}")
            }
        }
    }
}

/// The gate verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub do_index: bool,
    pub reason: Option<GateReason>,
}

impl GateDecision {
    fn pass() -> Self {
        Self {
            do_index: true,
            reason: None,
        }
    }

    fn stop(reason: GateReason) -> Self {
        Self {
            do_index: false,
            reason: Some(reason),
        }
    }
}

/// Evaluate the gate policy. With gating disabled everything indexes.
pub fn evaluate(
    metadata: &EnrichedMetadata,
    triage: &TriageDecision,
    critic: Option<&QualityScores>,
    sigma_min: f64,
    enabled: bool,
) -> GateDecision {
    if !enabled {
        return GateDecision::pass();
    }

    let decision = if metadata.enrichment_failed {
        GateDecision::stop(GateReason::EnrichmentFailed)
    } else if triage.category == TriageCategory::Junk {
        GateDecision::stop(GateReason::Junk)
    } else if metadata.signalness < sigma_min {
        GateDecision::stop(GateReason::LowSignalness {
            signalness: metadata.signalness,
            sigma_min,
        })
    } else if let Some(scores) = critic {
        if scores.aggregate < MIN_CRITIC_AGGREGATE {
            GateDecision::stop(GateReason::CriticScore {
                aggregate: scores.aggregate,
            })
        } else {
            GateDecision::pass()
        }
    } else {
        GateDecision::pass()
    };

    if let Some(reason) = &decision.reason {
        debug!(%reason, "document gated");
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triage::TriageAction;

    fn archival_triage() -> TriageDecision {
        TriageDecision {
            category: TriageCategory::Archival,
            confidence: 0.5,
            reasoning: "default".into(),
            action: TriageAction::Continue,
            matched_doc_id: None,
        }
    }

    fn metadata(signalness: f64) -> EnrichedMetadata {
        EnrichedMetadata {
            signalness,
            enrichment_failed: false,
            ..EnrichedMetadata::failed_shell("Title long enough here", "v2")
        }
    }

    #[test]
    fn failed_enrichment_always_gates() {
        let mut meta = metadata(0.9);
        meta.enrichment_failed = true;
        let decision = evaluate(&meta, &archival_triage(), None, 0.2, true);
        assert!(!decision.do_index);
        assert_eq!(decision.reason, Some(GateReason::EnrichmentFailed));
    }

    #[test]
    fn low_signalness_gates() {
        let decision = evaluate(&metadata(0.1), &archival_triage(), None, 0.2, true);
        assert!(!decision.do_index);
    }

    #[test]
    fn healthy_document_passes() {
        let decision = evaluate(&metadata(0.5), &archival_triage(), None, 0.2, true);
        assert!(decision.do_index);
    }

    #[test]
    fn critic_threshold_applies_when_present() {
        let scores = QualityScores {
            schema_compliance: 1.0,
            entity_quality: 1.0,
            topic_relevance: 1.0,
            summary_quality: 1.0,
            task_identification: 1.0,
            privacy: 1.0,
            chunking_suitability: 1.0,
            aggregate: 1.0,
            suggestions: vec![],
        };
        let decision = evaluate(&metadata(0.5), &archival_triage(), Some(&scores), 0.2, true);
        assert!(!decision.do_index);
    }

    #[test]
    fn disabled_gating_passes_everything() {
        let mut meta = metadata(0.0);
        meta.enrichment_failed = true;
        let decision = evaluate(&meta, &archival_triage(), None, 0.2, false);
        assert!(decision.do_index);
    }
}

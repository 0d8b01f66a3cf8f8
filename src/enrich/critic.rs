//! Enrichment critic (optional second LLM pass).
//!
//! Scores the enrichment on seven rubrics, 0-5 each. The weighted
//! aggregate feeds the quality gate; suggestions are recorded but never
//! block the document.

use super::schema::{EnrichedMetadata, QualityScores};
use crate::llm::{ChatMessage, CostRecord, FallbackChain, LlmError};
use serde::Deserialize;

/// Rubric weights; sum to 1.0.
const WEIGHTS: [(f64, &str); 7] = [
    (0.20, "schema_compliance"),
    (0.20, "entity_quality"),
    (0.15, "topic_relevance"),
    (0.15, "summary_quality"),
    (0.10, "task_identification"),
    (0.10, "privacy"),
    (0.10, "chunking_suitability"),
];

#[derive(Debug, Deserialize)]
struct CriticDraft {
    #[serde(default)]
    schema_compliance: f64,
    #[serde(default)]
    entity_quality: f64,
    #[serde(default)]
    topic_relevance: f64,
    #[serde(default)]
    summary_quality: f64,
    #[serde(default)]
    task_identification: f64,
    #[serde(default)]
    privacy: f64,
    #[serde(default)]
    chunking_suitability: f64,
    #[serde(default)]
    suggestions: Vec<String>,
}

fn clamp_rubric(value: f64) -> f64 {
    value.clamp(0.0, 5.0)
}

/// Run the critic over an enrichment result.
pub async fn review(
    chain: &FallbackChain,
    metadata: &EnrichedMetadata,
    content_window: &str,
    spent_usd: f64,
) -> Result<(QualityScores, CostRecord), LlmError> {
    let rubric_list = WEIGHTS
        .iter()
        .map(|(_, name)| format!("\"{name}\": <0-5>"))
        .collect::<Vec<_>>()
        .join(", ");

    let metadata_json =
        serde_json::to_string_pretty(metadata).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    let prompt = format!(
        "Review this metadata extracted from a document. Score each rubric \
         from 0 (unusable) to 5 (excellent) and list concrete improvement \
         suggestions.\n\nReturn only JSON: {{{rubric_list}, \"suggestions\": \
         [\"...\"]}}\n\nMETADATA:\n{metadata_json}\n\nDOCUMENT (excerpt):\n{content_window}"
    );

    let (completion, cost) = chain
        .complete(
            vec![
                ChatMessage::system("You are a strict metadata quality reviewer."),
                ChatMessage::user(prompt),
            ],
            1024,
            spent_usd,
        )
        .await?;

    let draft: CriticDraft = serde_json::from_str(super::extract_json(&completion.text))
        .map_err(|e| LlmError::InvalidResponse(format!("critic output: {e}")))?;

    let scores = [
        clamp_rubric(draft.schema_compliance),
        clamp_rubric(draft.entity_quality),
        clamp_rubric(draft.topic_relevance),
        clamp_rubric(draft.summary_quality),
        clamp_rubric(draft.task_identification),
        clamp_rubric(draft.privacy),
        clamp_rubric(draft.chunking_suitability),
    ];
    let aggregate = WEIGHTS
        .iter()
        .zip(scores)
        .map(|((weight, _), score)| weight * score)
        .sum();

    Ok((
        QualityScores {
            schema_compliance: scores[0],
            entity_quality: scores[1],
            topic_relevance: scores[2],
            summary_quality: scores[3],
            task_identification: scores[4],
            privacy: scores[5],
            chunking_suitability: scores[6],
            aggregate,
            suggestions: draft.suggestions,
        },
        cost,
    ))
}

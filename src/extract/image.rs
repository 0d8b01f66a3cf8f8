//! Image extraction: OCR with confidence, visual-LLM fallback.

use super::ocr::{ocr_output_usable, OcrEngine};
use super::pdf::MIN_OCR_CONFIDENCE;
use super::types::{DocumentType, ExtractedDocument, ExtractionMethod, RawDocument};
use super::{markdown, ExtractionError};
use crate::llm::FallbackChain;
use tracing::debug;

/// Extract text from an image via OCR, escalating to the visual LLM when
/// confidence or output quality is too low. Exactly one visual call runs
/// on escalation.
pub async fn extract_image(
    raw: &RawDocument,
    ocr: Option<&dyn OcrEngine>,
    vision: Option<&FallbackChain>,
    spent_usd: f64,
) -> Result<ExtractedDocument, ExtractionError> {
    let ocr_result = match ocr {
        Some(engine) => match engine.recognize(&raw.content).await {
            Ok(result) => Some(result),
            Err(e) => {
                debug!(error = %e, "ocr failed on image, escalating");
                None
            }
        },
        None => None,
    };

    if let Some(result) = &ocr_result {
        if result.confidence >= MIN_OCR_CONFIDENCE && ocr_output_usable(result) {
            return Ok(assemble(raw, result.text.clone(), ExtractionMethod::Ocr, None));
        }
    }

    let vision = vision.ok_or_else(|| {
        ExtractionError::fatal("image OCR unusable and no visual LLM configured")
    })?;
    let prompt = "Transcribe all text visible in this image as markdown. \
                  Start with a single line 'Summary: <one sentence>'.";
    let (completion, cost) = vision
        .vision_complete(vec![raw.content.clone()], prompt, 2048, spent_usd)
        .await
        .map_err(|e| ExtractionError::fatal(format!("visual extraction failed: {e}")))?;

    Ok(assemble(
        raw,
        completion.text,
        ExtractionMethod::VisualLlm,
        Some(cost),
    ))
}

fn assemble(
    raw: &RawDocument,
    text: String,
    method: ExtractionMethod,
    page_cost: Option<crate::llm::CostRecord>,
) -> ExtractedDocument {
    let (sections, first_heading) = markdown::parse_structure(&text);
    ExtractedDocument {
        text,
        doc_type: DocumentType::Image,
        title: first_heading,
        sections,
        extraction_method: method,
        created_date: raw.provided.as_ref().and_then(|p| p.created_date),
        page_cost,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ocr::MockOcr;
    use crate::llm::{FallbackChain, MockLlm};
    use std::sync::Arc;

    #[tokio::test]
    async fn confident_ocr_short_circuits() {
        let ocr = MockOcr::new("a receipt for garden supplies totaling twelve euros", 0.92);
        let llm = Arc::new(MockLlm::new("vision").push_text("never"));
        let mut vision = FallbackChain::new(5);
        vision.push(llm.clone(), "v", 1);

        let raw = RawDocument::new(vec![1, 2, 3], "receipt.png");
        let doc = extract_image(&raw, Some(&ocr), Some(&vision), 0.0)
            .await
            .unwrap();

        assert_eq!(doc.extraction_method, ExtractionMethod::Ocr);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn low_confidence_triggers_exactly_one_visual_call() {
        let ocr = MockOcr::new("zz9 ## @@", 0.2);
        let llm =
            Arc::new(MockLlm::new("vision").push_text("Summary: a receipt\n\nGarden supplies 12 EUR"));
        let mut vision = FallbackChain::new(5);
        vision.push(llm.clone(), "v", 1);

        let raw = RawDocument::new(vec![1, 2, 3], "receipt.png");
        let doc = extract_image(&raw, Some(&ocr), Some(&vision), 0.0)
            .await
            .unwrap();

        assert_eq!(doc.extraction_method, ExtractionMethod::VisualLlm);
        assert!(doc.page_cost.is_some());
        assert_eq!(llm.call_count(), 1);
    }
}

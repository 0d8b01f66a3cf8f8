//! PDF extraction: embedded text first, OCR second, visual LLM last.
//!
//! Embedded text comes from lopdf page by page. When average text density
//! per page is below threshold the document is treated as scanned: pages
//! are rendered through the `PageRenderer` collaborator and recognized by
//! the OCR engine. Garbled OCR output escalates to a single visual-LLM call
//! over all page images, with the page cost attached to the result.

use super::markdown;
use super::ocr::{ocr_output_usable, OcrEngine, OcrError, OcrResult};
use super::types::{
    DocumentType, ExtractedDocument, ExtractionMethod, PdfMetadata, RawDocument, SourceMetadata,
};
use super::ExtractionError;
use crate::llm::FallbackChain;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Minimum average chars per page for embedded text to count as real.
pub const MIN_CHARS_PER_PAGE: f64 = 200.0;

/// Minimum OCR engine confidence before escalating to the visual LLM.
pub const MIN_OCR_CONFIDENCE: f64 = 0.55;

/// Renders one PDF page to an image for the OCR / visual-LLM paths.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_page(&self, pdf: &[u8], page_index: usize) -> Result<Vec<u8>, OcrError>;
}

/// Renderer stub for tests: returns the page index as a tiny byte tag.
pub struct MockRenderer;

#[async_trait]
impl PageRenderer for MockRenderer {
    async fn render_page(&self, _pdf: &[u8], page_index: usize) -> Result<Vec<u8>, OcrError> {
        Ok(vec![page_index as u8])
    }
}

/// Collaborators needed by the scanned-page fallback chain.
pub struct PdfFallbacks<'a> {
    pub ocr: Option<&'a dyn OcrEngine>,
    pub renderer: Option<&'a dyn PageRenderer>,
    pub vision: Option<&'a FallbackChain>,
    /// Document LLM spend so far, for the vision budget check.
    pub spent_usd: f64,
}

/// Extract a PDF, walking the fallback chain as needed.
pub async fn extract_pdf(
    raw: &RawDocument,
    fallbacks: PdfFallbacks<'_>,
) -> Result<ExtractedDocument, ExtractionError> {
    let document = lopdf::Document::load_mem(&raw.content)
        .map_err(|e| ExtractionError::fatal(format!("unreadable pdf: {e}")))?;

    let pages: Vec<u32> = document.get_pages().keys().copied().collect();
    let page_count = pages.len();
    if page_count == 0 {
        return Err(ExtractionError::fatal("pdf has no pages"));
    }

    let mut page_texts = Vec::with_capacity(page_count);
    for page in &pages {
        match document.extract_text(&[*page]) {
            Ok(text) => page_texts.push(text),
            Err(e) => {
                debug!(page, error = %e, "embedded text extraction failed for page");
                page_texts.push(String::new());
            }
        }
    }

    let total_chars: usize = page_texts.iter().map(|t| t.trim().chars().count()).sum();
    let density = total_chars as f64 / page_count as f64;

    if density >= MIN_CHARS_PER_PAGE {
        let text = page_texts.join("\n\n");
        return Ok(assemble(raw, text, page_count, 0, ExtractionMethod::Native));
    }

    debug!(density, page_count, "pdf below text density threshold, treating as scanned");
    extract_scanned(raw, &raw.content, page_count, fallbacks).await
}

/// OCR every page; escalate to one visual-LLM call when recognition fails.
async fn extract_scanned(
    raw: &RawDocument,
    pdf_bytes: &[u8],
    page_count: usize,
    fallbacks: PdfFallbacks<'_>,
) -> Result<ExtractedDocument, ExtractionError> {
    let (ocr, renderer) = match (fallbacks.ocr, fallbacks.renderer) {
        (Some(ocr), Some(renderer)) => (ocr, renderer),
        _ => {
            return Err(ExtractionError::fatal(
                "scanned pdf but no OCR engine/renderer configured",
            ))
        }
    };

    let mut images = Vec::with_capacity(page_count);
    for index in 0..page_count {
        let image = renderer
            .render_page(pdf_bytes, index)
            .await
            .map_err(|e| ExtractionError::fatal(format!("page render failed: {e}")))?;
        images.push(image);
    }

    let mut page_results: Vec<OcrResult> = Vec::with_capacity(page_count);
    for image in &images {
        match ocr.recognize(image).await {
            Ok(result) => page_results.push(result),
            Err(e) => {
                warn!(error = %e, "ocr failed on page");
                page_results.push(OcrResult {
                    text: String::new(),
                    confidence: 0.0,
                });
            }
        }
    }

    let mean_confidence =
        page_results.iter().map(|r| r.confidence).sum::<f64>() / page_count as f64;
    let combined = OcrResult {
        text: page_results
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
        confidence: mean_confidence,
    };

    if mean_confidence >= MIN_OCR_CONFIDENCE && ocr_output_usable(&combined) {
        return Ok(assemble(
            raw,
            combined.text,
            page_count,
            page_count,
            ExtractionMethod::Ocr,
        ));
    }

    // OCR unusable: one visual-LLM call over all pages.
    let vision = fallbacks.vision.ok_or_else(|| {
        ExtractionError::fatal("ocr quality too low and no visual LLM configured")
    })?;
    let prompt = "Transcribe these scanned document pages into markdown, \
                  preserving headings, tables, and lists in reading order. \
                  Start with a single line 'Summary: <one sentence>'.";
    let (completion, cost) = vision
        .vision_complete(images, prompt, 4096, fallbacks.spent_usd)
        .await
        .map_err(|e| ExtractionError::fatal(format!("visual extraction failed: {e}")))?;

    let mut doc = assemble(
        raw,
        completion.text,
        page_count,
        page_count,
        ExtractionMethod::VisualLlm,
    );
    doc.page_cost = Some(cost);
    Ok(doc)
}

fn assemble(
    raw: &RawDocument,
    text: String,
    page_count: usize,
    fallback_pages: usize,
    method: ExtractionMethod,
) -> ExtractedDocument {
    let (sections, first_heading) = markdown::parse_structure(&text);
    let doc_type = if method == ExtractionMethod::Native {
        DocumentType::Pdf
    } else {
        DocumentType::Scanned
    };
    ExtractedDocument {
        text,
        doc_type,
        title: first_heading.or_else(|| {
            raw.provided
                .as_ref()
                .and_then(|p| p.title.clone())
        }),
        sections,
        source: SourceMetadata {
            pdf: Some(PdfMetadata {
                page_count,
                producer: None,
                fallback_pages,
            }),
            ..Default::default()
        },
        extraction_method: method,
        created_date: raw.provided.as_ref().and_then(|p| p.created_date),
        ..Default::default()
    }
}

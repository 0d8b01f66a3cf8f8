//! Extraction stage: raw bytes to canonicalized text plus structure.
//!
//! Dispatch order: declared MIME type, then filename extension, then
//! content sniffing. Every extractor produces an `ExtractedDocument` whose
//! `sections` are the sole structural input the chunker consumes.

pub mod chat;
pub mod email;
pub mod markdown;
pub mod ocr;
pub mod office;
pub mod pdf;
pub mod types;
pub mod whatsapp;

mod image;

pub use image::extract_image;
pub use ocr::{MockOcr, OcrEngine, OcrError, OcrResult};
pub use office::{MockConverter, OfficeConverter};
pub use pdf::{MockRenderer, PageRenderer, PdfFallbacks};
pub use types::{
    ChatTurn, DocumentType, EmailMetadata, ExtractedDocument, ExtractionMethod, PdfMetadata,
    ProvidedMetadata, RawDocument, Section, SectionKind, SourceMetadata, TurnRole,
};

use crate::llm::FallbackChain;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Extraction failure, either fatal for the document or recoverable by the
/// format's fallback chain.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct ExtractionError {
    pub reason: String,
    pub recoverable: bool,
}

impl ExtractionError {
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            recoverable: false,
        }
    }

    pub fn recoverable(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            recoverable: true,
        }
    }
}

/// Resolved input format used for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputFormat {
    Pdf,
    Email,
    Markdown,
    Text,
    Image,
    ChatJson,
    Whatsapp,
    Office,
    Unknown,
}

/// The extraction stage with its collaborators.
///
/// OCR engine, page renderer, office converter, and vision chain are all
/// optional; missing collaborators shrink the fallback chain rather than
/// failing construction.
pub struct Extractor {
    ocr: Option<Arc<dyn OcrEngine>>,
    renderer: Option<Arc<dyn PageRenderer>>,
    converter: Option<Arc<dyn OfficeConverter>>,
    vision: Option<Arc<FallbackChain>>,
    /// Bounds concurrent image-heavy extractions (OCR, visual LLM).
    image_permits: Arc<Semaphore>,
    max_document_chars: usize,
}

impl Extractor {
    pub fn new(max_document_chars: usize, max_image_extractions: usize) -> Self {
        Self {
            ocr: None,
            renderer: None,
            converter: None,
            vision: None,
            image_permits: Arc::new(Semaphore::new(max_image_extractions.max(1))),
            max_document_chars,
        }
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn OfficeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_vision(mut self, vision: Arc<FallbackChain>) -> Self {
        self.vision = Some(vision);
        self
    }

    /// Convert raw bytes into an extracted document.
    ///
    /// `spent_usd` is the document's LLM spend so far; visual-LLM fallbacks
    /// check it against the budget.
    pub async fn extract(
        &self,
        raw: &RawDocument,
        spent_usd: f64,
    ) -> Result<ExtractedDocument, ExtractionError> {
        let format = resolve_format(raw);
        debug!(filename = %raw.filename, ?format, "extracting");

        let mut doc = match format {
            InputFormat::Pdf => {
                let _permit = self.acquire_image_permit().await?;
                pdf::extract_pdf(
                    raw,
                    PdfFallbacks {
                        ocr: self.ocr.as_deref(),
                        renderer: self.renderer.as_deref(),
                        vision: self.vision.as_deref(),
                        spent_usd,
                    },
                )
                .await?
            }
            InputFormat::Email => email::extract_email(raw)?,
            InputFormat::Image => {
                let _permit = self.acquire_image_permit().await?;
                extract_image(raw, self.ocr.as_deref(), self.vision.as_deref(), spent_usd).await?
            }
            InputFormat::ChatJson => chat::extract_chat(raw)?,
            InputFormat::Whatsapp => whatsapp::extract_whatsapp(raw)?,
            InputFormat::Office => office::extract_office(raw, self.converter.as_deref()).await?,
            InputFormat::Markdown => extract_text_like(raw, DocumentType::Markdown)?,
            InputFormat::Text => extract_text_like(raw, DocumentType::Text)?,
            InputFormat::Unknown => extract_text_like(raw, DocumentType::Other)?,
        };

        // Apply caller-provided metadata over format-derived values.
        if let Some(provided) = &raw.provided {
            if doc.title.is_none() {
                doc.title = provided.title.clone();
            }
            if doc.created_date.is_none() {
                doc.created_date = provided.created_date;
            }
            if doc.source.original_path.is_none() {
                doc.source.original_path = provided.source_path.clone();
            }
        }

        truncate_in_place(&mut doc, self.max_document_chars);

        if doc.text.trim().is_empty() {
            return Err(ExtractionError::fatal("extracted text is empty"));
        }
        Ok(doc)
    }

    async fn acquire_image_permit(
        &self,
    ) -> Result<tokio::sync::SemaphorePermit<'_>, ExtractionError> {
        self.image_permits
            .acquire()
            .await
            .map_err(|_| ExtractionError::fatal("image extraction semaphore closed"))
    }
}

/// Plain text and markdown both go through the structure parser; they only
/// differ in the recorded document type.
fn extract_text_like(
    raw: &RawDocument,
    doc_type: DocumentType,
) -> Result<ExtractedDocument, ExtractionError> {
    let text = String::from_utf8_lossy(&raw.content).into_owned();
    if whatsapp::looks_like_whatsapp(&text) {
        return whatsapp::extract_whatsapp(raw);
    }
    let (sections, first_heading) = markdown::parse_structure(&text);
    Ok(ExtractedDocument {
        text,
        doc_type,
        title: first_heading,
        sections,
        ..Default::default()
    })
}

fn resolve_format(raw: &RawDocument) -> InputFormat {
    if let Some(declared) = raw.declared_type.as_deref() {
        if let Some(format) = format_from_mime(declared) {
            return format;
        }
    }
    if let Some(format) = format_from_extension(&raw.filename) {
        return format;
    }
    sniff_content(&raw.content)
}

fn format_from_mime(mime: &str) -> Option<InputFormat> {
    let mime = mime.split(';').next().unwrap_or(mime).trim();
    match mime {
        "application/pdf" => Some(InputFormat::Pdf),
        "message/rfc822" => Some(InputFormat::Email),
        "text/markdown" => Some(InputFormat::Markdown),
        "text/plain" => Some(InputFormat::Text),
        "application/json" => Some(InputFormat::ChatJson),
        m if m.starts_with("image/") => Some(InputFormat::Image),
        "application/msword"
        | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        | "application/vnd.openxmlformats-officedocument.presentationml.presentation"
        | "application/vnd.oasis.opendocument.text" => Some(InputFormat::Office),
        _ => None,
    }
}

fn format_from_extension(filename: &str) -> Option<InputFormat> {
    let extension = filename.rsplit('.').next()?.to_lowercase();
    match extension.as_str() {
        "pdf" => Some(InputFormat::Pdf),
        "eml" => Some(InputFormat::Email),
        "md" | "markdown" => Some(InputFormat::Markdown),
        "txt" | "text" => Some(InputFormat::Text),
        "png" | "jpg" | "jpeg" | "webp" | "gif" | "tif" | "tiff" | "bmp" => {
            Some(InputFormat::Image)
        }
        "json" => Some(InputFormat::ChatJson),
        "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" => {
            Some(InputFormat::Office)
        }
        _ => None,
    }
}

fn sniff_content(content: &[u8]) -> InputFormat {
    if content.starts_with(b"%PDF-") {
        return InputFormat::Pdf;
    }
    if content.starts_with(&[0x89, b'P', b'N', b'G']) || content.starts_with(&[0xff, 0xd8, 0xff]) {
        return InputFormat::Image;
    }
    if content.starts_with(b"{") || content.starts_with(b"[") {
        return InputFormat::ChatJson;
    }
    let head = String::from_utf8_lossy(&content[..content.len().min(2048)]);
    if whatsapp::looks_like_whatsapp(&head) {
        return InputFormat::Whatsapp;
    }
    if head.starts_with("From:") || head.starts_with("Received:") || head.starts_with("Return-Path:")
    {
        return InputFormat::Email;
    }
    InputFormat::Unknown
}

/// Cut text at the configured maximum (on a char boundary), recompute the
/// section map, and flag the document. Chat turns past the cut are dropped.
fn truncate_in_place(doc: &mut ExtractedDocument, max_chars: usize) {
    if doc.text.chars().count() <= max_chars {
        return;
    }
    let cut: usize = doc
        .text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(doc.text.len());
    doc.text.truncate(cut);
    doc.truncated = true;
    let (sections, _) = markdown::parse_structure(&doc.text);
    doc.sections = sections;

    if !doc.turns.is_empty() {
        let mut budget = doc.text.len();
        doc.turns.retain(|turn| {
            let keep = budget >= turn.text.len();
            budget = budget.saturating_sub(turn.text.len());
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn markdown_dispatch_by_extension() {
        let extractor = Extractor::new(400_000, 2);
        let raw = RawDocument::new(b"# Title\n\nBody.".to_vec(), "note.md");
        let doc = extractor.extract(&raw, 0.0).await.unwrap();
        assert_eq!(doc.doc_type, DocumentType::Markdown);
        assert_eq!(doc.title.as_deref(), Some("Title"));
    }

    #[tokio::test]
    async fn declared_mime_beats_extension() {
        let extractor = Extractor::new(400_000, 2);
        let raw = RawDocument::new(b"plain body".to_vec(), "note.md")
            .with_declared_type("text/plain");
        let doc = extractor.extract(&raw, 0.0).await.unwrap();
        assert_eq!(doc.doc_type, DocumentType::Text);
    }

    #[tokio::test]
    async fn empty_document_fails_extraction() {
        let extractor = Extractor::new(400_000, 2);
        let raw = RawDocument::new(b"   \n\n  ".to_vec(), "blank.txt");
        let err = extractor.extract(&raw, 0.0).await.unwrap_err();
        assert!(!err.recoverable);
    }

    #[tokio::test]
    async fn oversized_text_is_truncated_and_flagged() {
        let extractor = Extractor::new(100, 2);
        let body = "word ".repeat(200);
        let raw = RawDocument::new(body.into_bytes(), "big.txt");
        let doc = extractor.extract(&raw, 0.0).await.unwrap();
        assert!(doc.truncated);
        assert!(doc.text.chars().count() <= 100);
    }

    #[tokio::test]
    async fn whatsapp_sniffed_from_txt() {
        let extractor = Extractor::new(400_000, 2);
        let export = "1/22/24, 10:30 - Anna: hi\n1/22/24, 10:31 - Ben: hello\n";
        let raw = RawDocument::new(export.as_bytes().to_vec(), "chat.txt");
        let doc = extractor.extract(&raw, 0.0).await.unwrap();
        assert_eq!(doc.doc_type, DocumentType::Whatsapp);
    }
}

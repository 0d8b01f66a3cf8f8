//! Extraction artifact types.
//!
//! `RawDocument` exists only between ingress and Extract; everything
//! downstream reads the immutable `ExtractedDocument`.

use crate::llm::CostRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Uploaded bytes plus origin hints. Discarded after extraction.
#[derive(Debug, Clone, Default)]
pub struct RawDocument {
    pub content: Vec<u8>,
    pub filename: String,
    /// Declared MIME type from the caller, if any.
    pub declared_type: Option<String>,
    pub provided: Option<ProvidedMetadata>,
}

impl RawDocument {
    pub fn new(content: impl Into<Vec<u8>>, filename: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            filename: filename.into(),
            declared_type: None,
            provided: None,
        }
    }

    pub fn with_declared_type(mut self, mime: impl Into<String>) -> Self {
        self.declared_type = Some(mime.into());
        self
    }

    pub fn with_provided(mut self, provided: ProvidedMetadata) -> Self {
        self.provided = Some(provided);
        self
    }
}

/// Caller-supplied metadata accompanying an upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidedMetadata {
    pub title: Option<String>,
    pub created_date: Option<DateTime<Utc>>,
    pub source_path: Option<String>,
    /// Set on attachments fanned out from an email.
    pub parent_message_id: Option<String>,
}

/// Document format category after extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Pdf,
    Email,
    Office,
    Markdown,
    Text,
    Image,
    Scanned,
    LlmChat,
    Whatsapp,
    Other,
}

impl DocumentType {
    /// Stable lowercase label used in filenames and frontmatter tags.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Email => "email",
            DocumentType::Office => "office",
            DocumentType::Markdown => "markdown",
            DocumentType::Text => "text",
            DocumentType::Image => "image",
            DocumentType::Scanned => "scanned",
            DocumentType::LlmChat => "llm_chat",
            DocumentType::Whatsapp => "whatsapp",
            DocumentType::Other => "other",
        }
    }

    /// Chat-shaped documents chunk by turns, not by sections.
    pub fn is_chat(&self) -> bool {
        matches!(self, DocumentType::LlmChat | DocumentType::Whatsapp)
    }
}

/// How the text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    #[default]
    Native,
    Ocr,
    VisualLlm,
}

/// Structural element kind within the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Heading,
    Paragraph,
    Table,
    Code,
    List,
}

/// One structural element, spanning a char range of `ExtractedDocument.text`.
///
/// Sections are ordered and non-overlapping; they are the sole structural
/// input the chunker consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub heading_level: Option<u8>,
    /// Heading text for `Heading` sections.
    pub title: Option<String>,
    /// Byte span into the extracted text.
    pub span: Range<usize>,
    pub token_estimate: usize,
}

/// Speaker role in a chat transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    /// Named group-chat participant (WhatsApp).
    Participant,
}

/// One turn of a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub author: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub text: String,
}

/// Parsed email headers carried through to export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailMetadata {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: Option<String>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub date: Option<DateTime<Utc>>,
}

/// PDF document properties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PdfMetadata {
    pub page_count: usize,
    pub producer: Option<String>,
    /// Pages that went through OCR or the visual LLM.
    pub fallback_pages: usize,
}

/// Format-specific source metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub email: Option<EmailMetadata>,
    pub pdf: Option<PdfMetadata>,
    /// Chat participants, in order of first appearance.
    pub participants: Vec<String>,
    pub original_path: Option<String>,
}

/// Canonicalized text plus structure. Immutable after extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub text: String,
    pub doc_type: DocumentType,
    /// Best-effort title from headings, headers, or filename.
    pub title: Option<String>,
    pub sections: Vec<Section>,
    /// Present for chat-shaped documents, empty otherwise.
    pub turns: Vec<ChatTurn>,
    pub source: SourceMetadata,
    pub extraction_method: ExtractionMethod,
    /// Authoring date when the format carries one (email Date, chat export).
    pub created_date: Option<DateTime<Utc>>,
    /// Text was cut at the configured maximum.
    pub truncated: bool,
    /// Cost of visual-LLM page extraction, when that path ran.
    pub page_cost: Option<CostRecord>,
    /// Sibling raw documents discovered during extraction (email attachments).
    #[serde(skip)]
    pub attachments: Vec<RawDocument>,
}

impl Default for DocumentType {
    fn default() -> Self {
        DocumentType::Other
    }
}

impl ExtractedDocument {
    /// Section text slice, clamped to the current text length.
    pub fn section_text(&self, section: &Section) -> &str {
        let end = section.span.end.min(self.text.len());
        let start = section.span.start.min(end);
        &self.text[start..end]
    }
}

//! Office document extraction.
//!
//! Office formats route through a pluggable converter collaborator that
//! produces markdown-ish text with heading structure. When no converter is
//! configured, UTF-8 payloads fall back to plain-text extraction and
//! anything else is a fatal extraction error.

use super::types::{DocumentType, ExtractedDocument, RawDocument};
use super::{markdown, ExtractionError};
use async_trait::async_trait;

/// Converts an office document into text with heading structure.
#[async_trait]
pub trait OfficeConverter: Send + Sync {
    async fn convert(&self, content: &[u8], filename: &str) -> Result<String, ExtractionError>;
}

/// Converter stub for tests: returns fixed markdown.
pub struct MockConverter(pub String);

#[async_trait]
impl OfficeConverter for MockConverter {
    async fn convert(&self, _content: &[u8], _filename: &str) -> Result<String, ExtractionError> {
        Ok(self.0.clone())
    }
}

/// Extract an office document through the converter, or fall back to UTF-8.
pub async fn extract_office(
    raw: &RawDocument,
    converter: Option<&dyn OfficeConverter>,
) -> Result<ExtractedDocument, ExtractionError> {
    let text = match converter {
        Some(converter) => converter.convert(&raw.content, &raw.filename).await?,
        None => match std::str::from_utf8(&raw.content) {
            Ok(text) => text.to_string(),
            Err(_) => {
                return Err(ExtractionError::fatal(
                    "binary office document and no converter configured",
                ))
            }
        },
    };

    let (sections, first_heading) = markdown::parse_structure(&text);
    Ok(ExtractedDocument {
        text,
        doc_type: DocumentType::Office,
        title: first_heading,
        sections,
        created_date: raw.provided.as_ref().and_then(|p| p.created_date),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn converter_output_is_structured() {
        let converter = MockConverter("# Quarterly Report\n\nRevenue grew.".into());
        let raw = RawDocument::new(vec![0u8, 1, 2], "report.docx");
        let doc = extract_office(&raw, Some(&converter)).await.unwrap();
        assert_eq!(doc.title.as_deref(), Some("Quarterly Report"));
        assert_eq!(doc.doc_type, DocumentType::Office);
    }

    #[tokio::test]
    async fn binary_without_converter_is_fatal() {
        let raw = RawDocument::new(vec![0xff, 0xfe, 0x01], "report.docx");
        assert!(extract_office(&raw, None).await.is_err());
    }
}

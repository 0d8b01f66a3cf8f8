//! Email (.eml) extraction via mail-parser.
//!
//! Headers become source metadata, the plaintext alternative becomes the
//! body, and attachments fan out as sibling raw documents linked by the
//! parent message id. `created_date` comes from the Date header; the
//! pipeline only falls back to ingestion time when the header is absent.

use super::types::{
    DocumentType, EmailMetadata, ExtractedDocument, ProvidedMetadata, RawDocument, SourceMetadata,
};
use super::{markdown, ExtractionError};
use chrono::{DateTime, TimeZone, Utc};
use mail_parser::{Address, HeaderValue, MessageParser, MimeHeaders};

fn address_list(addr: Option<&Address>) -> Vec<String> {
    addr.map(|a| {
        a.iter()
            .filter_map(|entry| entry.address().map(|s| s.to_string()))
            .collect()
    })
    .unwrap_or_default()
}

fn text_list(value: &HeaderValue) -> Vec<String> {
    match value {
        HeaderValue::Text(t) => vec![t.to_string()],
        HeaderValue::TextList(list) => list.iter().map(|t| t.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Parse an RFC 5322 message into an `ExtractedDocument`.
pub fn extract_email(raw: &RawDocument) -> Result<ExtractedDocument, ExtractionError> {
    let message = MessageParser::default()
        .parse(&raw.content)
        .ok_or_else(|| ExtractionError::fatal("unparseable email message"))?;

    let date: Option<DateTime<Utc>> = message
        .date()
        .and_then(|d| Utc.timestamp_opt(d.to_timestamp(), 0).single());

    let meta = EmailMetadata {
        from: message
            .from()
            .and_then(|a| a.first())
            .and_then(|addr| addr.address().map(|s| s.to_string())),
        to: address_list(message.to()),
        cc: address_list(message.cc()),
        subject: message.subject().map(|s| s.to_string()),
        message_id: message.message_id().map(|s| s.to_string()),
        in_reply_to: text_list(message.in_reply_to()).into_iter().next(),
        references: message
            .header("References")
            .map(text_list)
            .unwrap_or_default(),
        date,
    };

    // Plaintext alternative preferred; mail-parser already converts the
    // HTML-only case to text for body_text().
    let body = message
        .body_text(0)
        .map(|b| b.trim().to_string())
        .unwrap_or_default();

    let mut text = String::new();
    if let Some(subject) = &meta.subject {
        text.push_str(&format!("Subject: {}\n", subject));
    }
    if let Some(from) = &meta.from {
        text.push_str(&format!("From: {}\n", from));
    }
    if !meta.to.is_empty() {
        text.push_str(&format!("To: {}\n", meta.to.join(", ")));
    }
    if let Some(date) = &date {
        text.push_str(&format!("Date: {}\n", date.to_rfc3339()));
    }
    text.push('\n');
    text.push_str(&body);

    let mut attachments = Vec::new();
    for part in message.attachments() {
        let name = part
            .attachment_name()
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("attachment-{}", attachments.len() + 1));
        attachments.push(
            RawDocument::new(part.contents().to_vec(), name).with_provided(ProvidedMetadata {
                parent_message_id: meta.message_id.clone(),
                created_date: date,
                ..Default::default()
            }),
        );
    }

    let (sections, _) = markdown::parse_structure(&text);
    let title = meta
        .subject
        .clone()
        .filter(|s| !s.trim().is_empty());

    Ok(ExtractedDocument {
        text,
        doc_type: DocumentType::Email,
        title,
        sections,
        source: SourceMetadata {
            email: Some(meta),
            ..Default::default()
        },
        created_date: date,
        attachments,
        ..Default::default()
    })
}

/// Whether the message has headers but no body content.
/// Used by the triage junk heuristics.
pub fn is_header_only(doc: &ExtractedDocument) -> bool {
    if doc.doc_type != DocumentType::Email {
        return false;
    }
    match doc.text.split_once("\n\n") {
        Some((_, body)) => body.trim().is_empty(),
        None => true,
    }
}

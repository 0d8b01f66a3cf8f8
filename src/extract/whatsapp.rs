//! WhatsApp chat export extraction.
//!
//! Line-oriented parser for the two common export layouts:
//!   `1/22/24, 10:30 - Anna: message`
//!   `[22.01.24, 10:30:15] Anna: message`
//! Lines that match neither pattern continue the previous message. System
//! notices ("Messages are end-to-end encrypted", "<Media omitted>") are
//! dropped.

use super::types::{ChatTurn, DocumentType, ExtractedDocument, RawDocument, TurnRole};
use super::{markdown, ExtractionError};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

fn line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)^
              \[?
              (?P<date>\d{1,2}[./]\d{1,2}[./]\d{2,4}),\s
              (?P<time>\d{1,2}:\d{2}(?::\d{2})?)
              \]?
              \s(?:-\s)?
              (?P<author>[^:]{1,60}):\s
              (?P<body>.*)$",
        )
        .expect("whatsapp line pattern")
    })
}

const SYSTEM_NOTICES: &[&str] = &[
    "Messages and calls are end-to-end encrypted",
    "<Media omitted>",
    "image omitted",
    "You created group",
];

fn parse_timestamp(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let stamp = format!("{date} {time}");
    const FORMATS: &[&str] = &[
        "%m/%d/%y %H:%M",
        "%d.%m.%y %H:%M:%S",
        "%d.%m.%Y %H:%M",
        "%m/%d/%Y %H:%M",
        "%d.%m.%y %H:%M",
    ];
    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&stamp, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Parse a WhatsApp text export into participant turns.
pub fn extract_whatsapp(raw: &RawDocument) -> Result<ExtractedDocument, ExtractionError> {
    let content = String::from_utf8_lossy(&raw.content);
    let mut turns: Vec<ChatTurn> = Vec::new();
    let mut participants: Vec<String> = Vec::new();

    for line in content.lines() {
        if let Some(captures) = line_pattern().captures(line) {
            let body = captures.name("body").map(|m| m.as_str()).unwrap_or("");
            if SYSTEM_NOTICES.iter().any(|notice| body.contains(notice)) {
                continue;
            }
            let author = captures["author"].trim().to_string();
            if !participants.contains(&author) {
                participants.push(author.clone());
            }
            turns.push(ChatTurn {
                role: TurnRole::Participant,
                author: Some(author),
                timestamp: parse_timestamp(&captures["date"], &captures["time"]),
                text: body.to_string(),
            });
        } else if let Some(last) = turns.last_mut() {
            // Continuation of a multi-line message.
            last.text.push('\n');
            last.text.push_str(line);
        }
    }

    if turns.is_empty() {
        return Err(ExtractionError::fatal("no whatsapp messages recognized"));
    }

    let created_date = turns.iter().find_map(|t| t.timestamp);

    let mut text = String::new();
    for turn in &turns {
        let author = turn.author.as_deref().unwrap_or("?");
        text.push_str(&format!("**{}:** {}\n\n", author, turn.text.trim()));
    }

    let (sections, _) = markdown::parse_structure(&text);

    let mut doc = ExtractedDocument {
        text,
        doc_type: DocumentType::Whatsapp,
        title: None,
        sections,
        turns,
        created_date,
        ..Default::default()
    };
    doc.source.participants = participants;
    Ok(doc)
}

/// Heuristic: does this text look like a WhatsApp export?
pub fn looks_like_whatsapp(text: &str) -> bool {
    text.lines()
        .take(10)
        .filter(|line| line_pattern().is_match(line))
        .count()
        >= 2
}

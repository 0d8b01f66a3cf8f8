//! LLM chat transcript extraction (ChatGPT / Claude exports).
//!
//! Accepts three JSON shapes: a flat `messages` array with role/content,
//! the Claude export (`chat_messages` with sender/text), and the ChatGPT
//! export (`mapping` tree ordered by create_time). Turn boundaries are
//! preserved as explicit structural markers for the turn-based chunker.

use super::types::{ChatTurn, DocumentType, ExtractedDocument, RawDocument, TurnRole};
use super::{markdown, ExtractionError};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Parse a chat export into alternating user/assistant turns.
pub fn extract_chat(raw: &RawDocument) -> Result<ExtractedDocument, ExtractionError> {
    let value: Value = serde_json::from_slice(&raw.content)
        .map_err(|e| ExtractionError::fatal(format!("unparseable chat export: {e}")))?;

    let title = value
        .get("title")
        .or_else(|| value.get("name"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let turns = parse_messages_array(&value)
        .or_else(|| parse_claude_export(&value))
        .or_else(|| parse_chatgpt_mapping(&value))
        .ok_or_else(|| ExtractionError::fatal("unrecognized chat export shape"))?;

    if turns.is_empty() {
        return Err(ExtractionError::fatal("chat export contains no turns"));
    }

    let created_date = turns.iter().find_map(|t| t.timestamp);

    let mut text = String::new();
    if let Some(title) = &title {
        text.push_str(&format!("# {}\n\n", title));
    }
    for turn in &turns {
        let speaker = match turn.role {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
            TurnRole::Participant => turn.author.as_deref().unwrap_or("Participant"),
        };
        text.push_str(&format!("**{}:** {}\n\n", speaker, turn.text.trim()));
    }

    let (sections, _) = markdown::parse_structure(&text);

    Ok(ExtractedDocument {
        text,
        doc_type: DocumentType::LlmChat,
        title,
        sections,
        turns,
        created_date,
        ..Default::default()
    })
}

fn role_of(s: &str) -> Option<TurnRole> {
    match s {
        "user" | "human" => Some(TurnRole::User),
        "assistant" | "model" => Some(TurnRole::Assistant),
        _ => None, // system/tool messages are not conversation turns
    }
}

fn timestamp_of(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let value = value?;
    if let Some(secs) = value.as_f64() {
        return Utc.timestamp_opt(secs as i64, 0).single();
    }
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// `{"messages": [{"role": ..., "content": ...}]}`
fn parse_messages_array(value: &Value) -> Option<Vec<ChatTurn>> {
    let messages = value.get("messages")?.as_array()?;
    let mut turns = Vec::new();
    for message in messages {
        let role = role_of(message.get("role")?.as_str()?);
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if let Some(role) = role {
            if !content.trim().is_empty() {
                turns.push(ChatTurn {
                    role,
                    author: None,
                    timestamp: timestamp_of(message.get("timestamp")),
                    text: content.to_string(),
                });
            }
        }
    }
    Some(turns)
}

/// Claude export: `{"chat_messages": [{"sender": "human"|"assistant", "text": ...}]}`
fn parse_claude_export(value: &Value) -> Option<Vec<ChatTurn>> {
    let messages = value.get("chat_messages")?.as_array()?;
    let mut turns = Vec::new();
    for message in messages {
        let role = role_of(message.get("sender")?.as_str()?);
        let text = message
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if let Some(role) = role {
            if !text.trim().is_empty() {
                turns.push(ChatTurn {
                    role,
                    author: None,
                    timestamp: timestamp_of(message.get("created_at")),
                    text: text.to_string(),
                });
            }
        }
    }
    Some(turns)
}

/// ChatGPT export: `{"mapping": {id: {"message": {...}}}}`, ordered by
/// create_time since the tree order is storage order, not reading order.
fn parse_chatgpt_mapping(value: &Value) -> Option<Vec<ChatTurn>> {
    let mapping = value.get("mapping")?.as_object()?;
    let mut dated: Vec<(f64, ChatTurn)> = Vec::new();
    for node in mapping.values() {
        let Some(message) = node.get("message") else {
            continue;
        };
        let Some(role) = message
            .pointer("/author/role")
            .and_then(Value::as_str)
            .and_then(role_of)
        else {
            continue;
        };
        let text = message
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            continue;
        }
        let create_time = message
            .get("create_time")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        dated.push((
            create_time,
            ChatTurn {
                role,
                author: None,
                timestamp: timestamp_of(message.get("create_time")),
                text,
            },
        ));
    }
    dated.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    Some(dated.into_iter().map(|(_, t)| t).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_messages_shape_parses() {
        let export = serde_json::json!({
            "title": "Fedora USB",
            "messages": [
                {"role": "user", "content": "How do I write a Fedora ISO to USB?"},
                {"role": "assistant", "content": "Use dd or Fedora Media Writer."},
                {"role": "system", "content": "hidden"},
            ]
        });
        let raw = RawDocument::new(serde_json::to_vec(&export).unwrap(), "chat.json");
        let doc = extract_chat(&raw).unwrap();

        assert_eq!(doc.doc_type, DocumentType::LlmChat);
        assert_eq!(doc.turns.len(), 2);
        assert_eq!(doc.turns[0].role, TurnRole::User);
        assert_eq!(doc.title.as_deref(), Some("Fedora USB"));
        assert!(doc.text.contains("**Assistant:** Use dd"));
    }

    #[test]
    fn chatgpt_mapping_orders_by_create_time() {
        let export = serde_json::json!({
            "title": "t",
            "mapping": {
                "b": {"message": {"author": {"role": "assistant"},
                       "content": {"parts": ["second"]}, "create_time": 200.0}},
                "a": {"message": {"author": {"role": "user"},
                       "content": {"parts": ["first"]}, "create_time": 100.0}},
            }
        });
        let raw = RawDocument::new(serde_json::to_vec(&export).unwrap(), "conversations.json");
        let doc = extract_chat(&raw).unwrap();
        assert_eq!(doc.turns[0].text, "first");
        assert_eq!(doc.turns[1].text, "second");
    }

    #[test]
    fn empty_export_is_fatal() {
        let raw = RawDocument::new(b"{\"messages\": []}".to_vec(), "chat.json");
        assert!(extract_chat(&raw).is_err());
    }
}

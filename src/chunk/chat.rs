//! Turn-based chunking for chat transcripts.
//!
//! Turns are grouped into pairs (question/answer where roles alternate),
//! then one to three pairs per chunk, splitting early on topic shift.
//! Shift detection: explicit markers, a change of leading question word,
//! or key-term overlap below threshold between adjacent pairs. Each chunk
//! is prefixed with a synthesized topic header from its first user turn.

use crate::extract::{ChatTurn, TurnRole};

/// Max turn-pairs per chunk.
const MAX_PAIRS: usize = 3;

/// Below this key-term overlap adjacent pairs are different topics.
const MIN_TERM_OVERLAP: f64 = 0.2;

const SHIFT_MARKERS: &[&str] = &[
    "next question",
    "changing topic",
    "different topic",
    "new topic",
    "unrelated question",
    "on another note",
];

const QUESTION_WORDS: &[&str] = &["what", "how", "why", "when", "where", "who", "which"];

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "to", "of", "in", "on",
    "for", "with", "it", "this", "that", "you", "i", "my", "your", "do", "does", "can", "could",
    "should", "would", "have", "has", "not", "be", "me", "we", "they", "there",
];

/// One question/answer grouping of consecutive turns.
#[derive(Debug, Clone)]
pub struct TurnPair {
    pub turns: Vec<ChatTurn>,
}

impl TurnPair {
    fn text(&self) -> String {
        self.turns
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn first_user_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|t| t.role != TurnRole::Assistant)
            .map(|t| t.text.as_str())
    }
}

/// Group turns into pairs: a non-assistant turn opens a pair, following
/// assistant turns complete it. Orphan assistant turns open their own pair.
pub fn pair_turns(turns: &[ChatTurn]) -> Vec<TurnPair> {
    let mut pairs: Vec<TurnPair> = Vec::new();
    for turn in turns {
        let opens_pair = turn.role != TurnRole::Assistant;
        match pairs.last_mut() {
            Some(last) if !opens_pair => last.turns.push(turn.clone()),
            _ => pairs.push(TurnPair {
                turns: vec![turn.clone()],
            }),
        }
    }
    pairs
}

fn key_terms(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.len() > 3 && !STOPWORDS.contains(word))
        .map(str::to_string)
        .collect()
}

fn term_overlap(a: &str, b: &str) -> f64 {
    let terms_a: std::collections::HashSet<String> = key_terms(a).into_iter().collect();
    let terms_b: std::collections::HashSet<String> = key_terms(b).into_iter().collect();
    if terms_a.is_empty() || terms_b.is_empty() {
        return 0.0;
    }
    let shared = terms_a.intersection(&terms_b).count() as f64;
    shared / terms_a.len().min(terms_b.len()) as f64
}

fn question_word(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    let first_words: Vec<&str> = lower.split_whitespace().take(3).collect();
    QUESTION_WORDS
        .iter()
        .find(|word| first_words.contains(*word))
        .copied()
}

/// Topic shift between two adjacent pairs.
pub fn topic_shift(previous: &TurnPair, next: &TurnPair) -> bool {
    if let Some(user_text) = next.first_user_text() {
        let lower = user_text.to_lowercase();
        if SHIFT_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return true;
        }
    }

    if let (Some(previous_user), Some(next_user)) =
        (previous.first_user_text(), next.first_user_text())
    {
        let previous_word = question_word(previous_user);
        let next_word = question_word(next_user);
        if let (Some(previous_word), Some(next_word)) = (previous_word, next_word) {
            if previous_word != next_word
                && term_overlap(&previous.text(), &next.text()) < MIN_TERM_OVERLAP
            {
                return true;
            }
        }
    }

    term_overlap(&previous.text(), &next.text()) < MIN_TERM_OVERLAP
}

/// Group pairs into chunks of 1-3 pairs, never spanning a topic shift.
pub fn group_pairs(pairs: Vec<TurnPair>) -> Vec<Vec<TurnPair>> {
    let mut groups: Vec<Vec<TurnPair>> = Vec::new();
    for pair in pairs {
        let start_new = match groups.last() {
            None => true,
            Some(group) => {
                group.len() >= MAX_PAIRS
                    || group
                        .last()
                        .map(|last| topic_shift(last, &pair))
                        .unwrap_or(true)
            }
        };
        if start_new {
            groups.push(vec![pair]);
        } else if let Some(group) = groups.last_mut() {
            group.push(pair);
        }
    }
    groups
}

/// Synthesized `### Turn topic` header from the group's first user turn.
pub fn topic_header(group: &[TurnPair]) -> String {
    let topic = group
        .first()
        .and_then(|pair| pair.first_user_text())
        .map(|text| {
            let first_line = text.lines().next().unwrap_or(text);
            let mut topic: String = first_line.trim().trim_end_matches('?').to_string();
            if topic.chars().count() > 60 {
                topic = topic.chars().take(57).collect::<String>() + "...";
            }
            topic
        })
        .unwrap_or_else(|| "Conversation".to_string());
    format!("### {topic}")
}

/// Render one group as chunk text: topic header plus speaker-labelled turns.
pub fn render_group(group: &[TurnPair]) -> String {
    let mut out = topic_header(group);
    out.push_str("\n\n");
    for pair in group {
        for turn in &pair.turns {
            let speaker = match turn.role {
                TurnRole::User => "User",
                TurnRole::Assistant => "Assistant",
                TurnRole::Participant => turn.author.as_deref().unwrap_or("Participant"),
            };
            out.push_str(&format!("**{}:** {}\n\n", speaker, turn.text.trim()));
        }
    }
    out.trim_end().to_string()
}

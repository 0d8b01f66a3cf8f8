//! Chunking stage: structure-aware semantic splitting.
//!
//! Consumes the section map from extraction. Tables and code blocks are
//! always standalone chunks; headings anchor section titles and parent
//! paths; paragraph and list runs accumulate greedily to the token target
//! with sentence-boundary forced splits above the maximum. Chat documents
//! chunk by turns instead. Ignore blocks are stripped before any text
//! reaches a chunk. Chunking is deterministic.

pub mod chat;
pub mod ignore;

pub use ignore::{IGNORE_END, IGNORE_START};

use crate::extract::{ExtractedDocument, SectionKind};
use crate::tokens::estimate_tokens;
use serde::{Deserialize, Serialize};

/// Kind of content in a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Heading,
    Paragraph,
    Table,
    Code,
    List,
    Mixed,
    ChatTurn,
}

impl ChunkType {
    pub fn label(&self) -> &'static str {
        match self {
            ChunkType::Heading => "heading",
            ChunkType::Paragraph => "paragraph",
            ChunkType::Table => "table",
            ChunkType::Code => "code",
            ChunkType::List => "list",
            ChunkType::Mixed => "mixed",
            ChunkType::ChatTurn => "chat_turn",
        }
    }
}

/// One embeddable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `doc_id#sequence`.
    pub chunk_id: String,
    pub text: String,
    pub sequence: usize,
    pub chunk_type: ChunkType,
    /// Nearest preceding heading.
    pub section_title: Option<String>,
    /// Heading path from the document root.
    pub parent_sections: Vec<String>,
    pub token_estimate: usize,
    pub parent_doc_id: String,
}

/// The chunking stage.
#[derive(Debug, Clone)]
pub struct Chunker {
    target_tokens: usize,
    max_tokens: usize,
}

impl Chunker {
    pub fn new(target_tokens: usize, max_tokens: usize) -> Self {
        Self {
            target_tokens,
            max_tokens: max_tokens.max(target_tokens),
        }
    }

    /// Split a document into ordered chunks.
    pub fn chunk(&self, doc: &ExtractedDocument, doc_id: &str) -> Vec<Chunk> {
        if doc.doc_type.is_chat() && !doc.turns.is_empty() {
            return self.chunk_turns(doc, doc_id);
        }
        self.chunk_sections(doc, doc_id)
    }

    fn chunk_turns(&self, doc: &ExtractedDocument, doc_id: &str) -> Vec<Chunk> {
        let groups = chat::group_pairs(chat::pair_turns(&doc.turns));
        let mut builder = ChunkBuilder::new(doc_id);
        for group in &groups {
            let text = chat::render_group(group);
            builder.push(text, ChunkType::ChatTurn, None, Vec::new());
        }
        builder.finish()
    }

    fn chunk_sections(&self, doc: &ExtractedDocument, doc_id: &str) -> Vec<Chunk> {
        let ignored = ignore::ignore_ranges(&doc.text);
        let mut builder = ChunkBuilder::new(doc_id);
        // (title, level) stack of enclosing headings.
        let mut heading_stack: Vec<(String, u8)> = Vec::new();
        let mut accumulator = Accumulator::default();

        for section in &doc.sections {
            let text = ignore::visible_text(&doc.text, section.span.clone(), &ignored);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            match section.kind {
                SectionKind::Heading => {
                    self.flush(&mut accumulator, &mut builder, &heading_stack);
                    let level = section.heading_level.unwrap_or(1);
                    while heading_stack
                        .last()
                        .map(|(_, l)| *l >= level)
                        .unwrap_or(false)
                    {
                        heading_stack.pop();
                    }
                    heading_stack.push((
                        section.title.clone().unwrap_or_else(|| text.to_string()),
                        level,
                    ));
                    accumulator.add(text, ChunkType::Heading);
                }
                SectionKind::Table | SectionKind::Code => {
                    self.flush(&mut accumulator, &mut builder, &heading_stack);
                    let chunk_type = if section.kind == SectionKind::Table {
                        ChunkType::Table
                    } else {
                        ChunkType::Code
                    };
                    let (title, parents) = heading_context(&heading_stack);
                    builder.push(text.to_string(), chunk_type, title, parents);
                }
                SectionKind::Paragraph | SectionKind::List => {
                    let kind = if section.kind == SectionKind::List {
                        ChunkType::List
                    } else {
                        ChunkType::Paragraph
                    };
                    let incoming = estimate_tokens(text);
                    if !accumulator.is_empty()
                        && accumulator.tokens + incoming > self.target_tokens
                    {
                        self.flush(&mut accumulator, &mut builder, &heading_stack);
                    }
                    accumulator.add(text, kind);
                }
            }
        }
        self.flush(&mut accumulator, &mut builder, &heading_stack);
        builder.finish()
    }

    fn flush(
        &self,
        accumulator: &mut Accumulator,
        builder: &mut ChunkBuilder,
        heading_stack: &[(String, u8)],
    ) {
        if accumulator.is_empty() {
            return;
        }
        let (title, parents) = heading_context(heading_stack);
        let chunk_type = accumulator.chunk_type();
        let text = std::mem::take(&mut accumulator.parts).join("\n\n");
        accumulator.reset();

        if estimate_tokens(&text) <= self.max_tokens {
            builder.push(text, chunk_type, title, parents);
            return;
        }
        // Over the hard ceiling: split at sentence boundaries.
        for piece in split_at_sentences(&text, self.max_tokens) {
            builder.push(piece, chunk_type, title.clone(), parents.clone());
        }
    }
}

fn heading_context(stack: &[(String, u8)]) -> (Option<String>, Vec<String>) {
    let title = stack.last().map(|(t, _)| t.clone());
    let parents = stack.iter().map(|(t, _)| t.clone()).collect();
    (title, parents)
}

/// Greedy sentence packing under a token ceiling. Sentences that alone
/// exceed the ceiling are emitted as-is; a sentence boundary is the
/// closest safe split point available.
fn split_at_sentences(text: &str, max_tokens: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for sentence in split_sentences(text) {
        let candidate_tokens = estimate_tokens(&current) + estimate_tokens(sentence);
        if !current.is_empty() && candidate_tokens > max_tokens {
            pieces.push(current.trim().to_string());
            current = String::new();
        }
        current.push_str(sentence);
    }
    if !current.trim().is_empty() {
        pieces.push(current.trim().to_string());
    }
    pieces
}

/// Split on sentence-ending punctuation followed by whitespace. Keeps
/// terminators attached to their sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?')
            && bytes.get(i + 1).map(|b| b.is_ascii_whitespace()).unwrap_or(true)
        {
            // Include the trailing whitespace with the finished sentence.
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            sentences.push(&text[start..j]);
            start = j;
            i = j;
        } else {
            i += 1;
        }
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

#[derive(Default)]
struct Accumulator {
    parts: Vec<String>,
    kinds: Vec<ChunkType>,
    tokens: usize,
}

impl Accumulator {
    fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    fn add(&mut self, text: &str, kind: ChunkType) {
        self.tokens += estimate_tokens(text);
        self.parts.push(text.to_string());
        self.kinds.push(kind);
    }

    fn reset(&mut self) {
        self.parts.clear();
        self.kinds.clear();
        self.tokens = 0;
    }

    /// Dominant content kind: a lone heading stays Heading; a heading plus
    /// one body kind takes the body kind; mixed bodies are Mixed.
    fn chunk_type(&self) -> ChunkType {
        let body_kinds: Vec<ChunkType> = self
            .kinds
            .iter()
            .copied()
            .filter(|k| *k != ChunkType::Heading)
            .collect();
        match body_kinds.as_slice() {
            [] => ChunkType::Heading,
            [first, rest @ ..] => {
                if rest.iter().all(|k| k == first) {
                    *first
                } else {
                    ChunkType::Mixed
                }
            }
        }
    }
}

struct ChunkBuilder {
    doc_id: String,
    chunks: Vec<Chunk>,
}

impl ChunkBuilder {
    fn new(doc_id: &str) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            chunks: Vec::new(),
        }
    }

    fn push(
        &mut self,
        text: String,
        chunk_type: ChunkType,
        section_title: Option<String>,
        parent_sections: Vec<String>,
    ) {
        let sequence = self.chunks.len();
        let token_estimate = estimate_tokens(&text);
        self.chunks.push(Chunk {
            chunk_id: format!("{}#{}", self.doc_id, sequence),
            text,
            sequence,
            chunk_type,
            section_title,
            parent_sections,
            token_estimate,
            parent_doc_id: self.doc_id.clone(),
        });
    }

    fn finish(self) -> Vec<Chunk> {
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::markdown::parse_structure;
    use crate::extract::DocumentType;

    fn doc_from_markdown(text: &str) -> ExtractedDocument {
        let (sections, title) = parse_structure(text);
        ExtractedDocument {
            text: text.to_string(),
            doc_type: DocumentType::Markdown,
            title,
            sections,
            ..Default::default()
        }
    }

    #[test]
    fn table_is_always_standalone() {
        let text = "Intro paragraph about operating systems.\n\n\
                    | os | kernel |\n|----|--------|\n| fedora | linux |\n\
                    | freebsd | bsd |\n\n\
                    Closing paragraph after the table.\n";
        let doc = doc_from_markdown(text);
        let chunks = Chunker::new(500, 800).chunk(&doc, "d1");

        let tables: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.chunk_type == ChunkType::Table)
            .collect();
        assert_eq!(tables.len(), 1);
        assert!(tables[0].text.contains("| fedora | linux |"));
        assert!(tables[0].text.contains("| freebsd | bsd |"));
    }

    #[test]
    fn code_is_always_standalone() {
        let text = "Before.\n\n```sh\necho hello\n```\n\nAfter.\n";
        let doc = doc_from_markdown(text);
        let chunks = Chunker::new(500, 800).chunk(&doc, "d1");
        assert!(chunks
            .iter()
            .any(|c| c.chunk_type == ChunkType::Code && c.text.contains("echo hello")));
    }

    #[test]
    fn headings_anchor_section_titles_and_parents() {
        let text = "# Guide\n\n## Install\n\nRun the installer.\n\n## Verify\n\nCheck the checksum.\n";
        let doc = doc_from_markdown(text);
        let chunks = Chunker::new(500, 800).chunk(&doc, "d1");

        let verify = chunks
            .iter()
            .find(|c| c.text.contains("Check the checksum"))
            .unwrap();
        assert_eq!(verify.section_title.as_deref(), Some("Verify"));
        assert_eq!(verify.parent_sections, vec!["Guide", "Verify"]);
    }

    #[test]
    fn small_document_is_a_single_chunk() {
        let doc = doc_from_markdown("Kita schedule: Mon 08:00, Wed 08:00\n");
        let chunks = Chunker::new(500, 800).chunk(&doc, "d1");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "d1#0");
    }

    #[test]
    fn oversized_run_splits_at_sentence_boundary() {
        let sentence = "This sentence talks about the maintenance schedule in detail. ";
        let text = sentence.repeat(80); // far over 800 tokens at chars/4
        let doc = doc_from_markdown(&text);
        let chunks = Chunker::new(500, 800).chunk(&doc, "d1");

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_estimate <= 800 + 20);
            assert!(chunk.text.ends_with('.') || chunk.text.ends_with("schedule in detail."));
        }
    }

    #[test]
    fn ignored_content_never_reaches_chunks() {
        let text = format!(
            "Visible paragraph.\n\n{IGNORE_START}\n\nhidden secret paragraph\n\n{IGNORE_END}\n\nAnother visible one.\n"
        );
        let doc = doc_from_markdown(&text);
        let chunks = Chunker::new(500, 800).chunk(&doc, "d1");
        for chunk in &chunks {
            assert!(!chunk.text.contains("hidden secret"));
        }
        assert!(chunks.iter().any(|c| c.text.contains("Visible paragraph")));
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "# A\n\npara one.\n\npara two.\n\n| a | b |\n|---|---|\n| 1 | 2 |\n";
        let doc = doc_from_markdown(text);
        let chunker = Chunker::new(500, 800);
        assert_eq!(chunker.chunk(&doc, "d1"), chunker.chunk(&doc, "d1"));
    }

    #[test]
    fn sequences_are_contiguous_and_ids_derived() {
        let text = "# A\n\none.\n\n```c\nx\n```\n\ntwo.\n";
        let doc = doc_from_markdown(text);
        let chunks = Chunker::new(500, 800).chunk(&doc, "doc-9");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence, i);
            assert_eq!(chunk.chunk_id, format!("doc-9#{i}"));
            assert_eq!(chunk.parent_doc_id, "doc-9");
        }
    }
}

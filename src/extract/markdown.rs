//! Markdown structure extraction.
//!
//! Walks the pulldown-cmark event stream with byte offsets and emits one
//! `Section` per top-level block: headings (ATX and setext), paragraphs,
//! fenced/indented code, tables, lists, blockquotes. Nested blocks are
//! covered by their outermost ancestor so section spans never overlap.

use super::types::{Section, SectionKind};
use crate::tokens::estimate_tokens;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// Parse markdown (or plain text) into ordered, non-overlapping sections.
///
/// Returns the sections and the first heading text, which doubles as the
/// extracted title candidate.
pub fn parse_structure(text: &str) -> (Vec<Section>, Option<String>) {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(text, options);

    let mut sections: Vec<Section> = Vec::new();
    let mut first_heading: Option<String> = None;

    // Byte offset up to which an already-emitted block covers the input.
    // Start events inside that range belong to a nested block.
    let mut covered_until: usize = 0;

    let mut in_heading = false;
    let mut heading_level: u8 = 0;
    let mut heading_span = 0..0;
    let mut heading_text = String::new();

    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                // Headings nested in an emitted block (e.g. a blockquote)
                // stay covered by it.
                if range.start < covered_until {
                    continue;
                }
                in_heading = true;
                heading_level = level as u8;
                heading_span = range;
                heading_text.clear();
            }
            Event::Text(t) | Event::Code(t) if in_heading => {
                heading_text.push_str(&t);
            }
            Event::End(TagEnd::Heading(_)) => {
                if !in_heading {
                    continue;
                }
                in_heading = false;
                let title = heading_text.trim().to_string();
                if first_heading.is_none() && !title.is_empty() {
                    first_heading = Some(title.clone());
                }
                push_section(
                    &mut sections,
                    text,
                    Section {
                        kind: SectionKind::Heading,
                        heading_level: Some(heading_level),
                        title: Some(title),
                        span: heading_span.clone(),
                        token_estimate: 0,
                    },
                );
                covered_until = covered_until.max(heading_span.end);
            }
            Event::Start(tag) => {
                if range.start < covered_until {
                    continue;
                }
                let kind = match tag {
                    Tag::CodeBlock(_) => Some(SectionKind::Code),
                    Tag::Table(_) => Some(SectionKind::Table),
                    Tag::List(_) => Some(SectionKind::List),
                    Tag::Paragraph | Tag::BlockQuote | Tag::HtmlBlock => {
                        Some(SectionKind::Paragraph)
                    }
                    _ => None,
                };
                if let Some(kind) = kind {
                    push_section(
                        &mut sections,
                        text,
                        Section {
                            kind,
                            heading_level: None,
                            title: None,
                            span: range.clone(),
                            token_estimate: 0,
                        },
                    );
                    covered_until = covered_until.max(range.end);
                }
            }
            _ => {}
        }
    }

    (sections, first_heading)
}

fn push_section(sections: &mut Vec<Section>, text: &str, mut section: Section) {
    let slice = &text[section.span.start.min(text.len())..section.span.end.min(text.len())];
    if slice.trim().is_empty() {
        return;
    }
    section.token_estimate = estimate_tokens(slice);
    sections.push(section);
}

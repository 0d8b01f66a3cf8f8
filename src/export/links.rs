//! Auto wiki-linking of entity mentions in exported bodies.
//!
//! The first occurrence of each known entity label becomes
//! `[[refs/<kind>/<slug>|Label]]`. Matches inside fenced code, inline
//! code, or existing wiki-links are skipped. Link-all mode links every
//! occurrence instead.

use super::slug::slugify;
use crate::config::AutoLinkMode;
use crate::enrich::EntityRef;
use std::ops::Range;

/// A linkable entity: display label plus its stub path.
#[derive(Debug, Clone)]
pub struct LinkTarget {
    pub label: String,
    pub path: String,
}

impl LinkTarget {
    pub fn from_entity(entity: &EntityRef) -> Self {
        let label = entity.display_label().to_string();
        Self {
            path: format!("refs/{}/{}", entity.kind.stub_dir(), slugify(&label, 60)),
            label,
        }
    }

    fn wiki_link(&self, surface: &str) -> String {
        format!("[[{}|{}]]", self.path, surface)
    }
}

/// Byte ranges where linking must not happen: fenced code blocks, inline
/// code spans, existing wiki-links.
fn protected_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();

    // Fenced code blocks.
    let mut fence_start: Option<usize> = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with("```") {
            match fence_start {
                None => fence_start = Some(offset),
                Some(start) => {
                    ranges.push(start..offset + line.len());
                    fence_start = None;
                }
            }
        }
        offset += line.len();
    }
    if let Some(start) = fence_start {
        ranges.push(start..text.len());
    }

    // Inline code spans and existing wiki-links.
    push_delimited(text, "`", "`", &mut ranges);
    push_delimited(text, "[[", "]]", &mut ranges);

    ranges.sort_by_key(|r| r.start);
    ranges
}

fn push_delimited(text: &str, open: &str, close: &str, ranges: &mut Vec<Range<usize>>) {
    let mut cursor = 0;
    while let Some(start_offset) = text[cursor..].find(open) {
        let start = cursor + start_offset;
        let search_from = start + open.len();
        match text[search_from..].find(close) {
            Some(end_offset) => {
                let end = search_from + end_offset + close.len();
                ranges.push(start..end);
                cursor = end;
            }
            None => break,
        }
    }
}

fn in_protected(position: usize, end: usize, ranges: &[Range<usize>]) -> bool {
    ranges
        .iter()
        .any(|range| position < range.end && end > range.start)
}

fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before_ok = start == 0
        || text[..start]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
    let after_ok = end >= text.len()
        || text[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
    before_ok && after_ok
}

/// Link entity mentions in `text` according to the mode.
pub fn link_entities(text: &str, targets: &[LinkTarget], mode: AutoLinkMode) -> String {
    let mut result = text.to_string();
    for target in targets {
        if target.label.is_empty() {
            continue;
        }
        let mut search_from = 0;
        loop {
            let ranges = protected_ranges(&result);
            let haystack = result[search_from..].to_lowercase();
            let needle = target.label.to_lowercase();
            let Some(found) = haystack.find(&needle) else {
                break;
            };
            let start = search_from + found;
            let end = start + target.label.len();
            // The lowercase haystack preserves ASCII offsets; for non-ASCII
            // labels fall back to skipping the occurrence on length drift.
            if end > result.len() || !result.is_char_boundary(start) || !result.is_char_boundary(end)
            {
                break;
            }

            if in_protected(start, end, &ranges) || !is_word_boundary(&result, start, end) {
                search_from = end;
                continue;
            }

            let surface = result[start..end].to_string();
            let link = target.wiki_link(&surface);
            result.replace_range(start..end, &link);
            search_from = start + link.len();

            if mode == AutoLinkMode::First {
                break;
            }
        }
    }
    result
}

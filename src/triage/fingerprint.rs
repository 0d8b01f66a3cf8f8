//! Document fingerprints for duplicate detection.
//!
//! Five cheap keys: a SHA-256 over normalized text, a title hash, an
//! entity-set hash (empty on first pass), a 64-bit SimHash over 5-token
//! shingles for near-duplicate lookup, and format-specific keys (email
//! Message-ID, hash of a chat's first two turns).

use crate::extract::ExtractedDocument;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Shingle width in tokens for the SimHash.
const SHINGLE_TOKENS: usize = 5;

/// Identity tuple persisted with every document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// SHA-256 over normalized text, hex-encoded.
    pub content_sha256: String,
    /// SHA-256 over the normalized title or first heading, if any.
    pub title_sha: Option<String>,
    /// SHA-256 over sorted canonical entity names; empty before enrichment.
    pub entity_set_sha: Option<String>,
    /// 64-bit SimHash for Hamming-distance near-duplicate lookup.
    pub simhash: u64,
    /// Email Message-ID header.
    pub message_id: Option<String>,
    /// Hash over a chat transcript's first two turns.
    pub chat_head_sha: Option<String>,
}

impl Fingerprint {
    /// Compute all keys available at triage time.
    pub fn compute(doc: &ExtractedDocument) -> Self {
        let normalized = normalize_text(&doc.text);
        let content_sha256 = sha256_hex(&normalized);

        let title_sha = doc
            .title
            .as_deref()
            .map(normalize_text)
            .filter(|t| !t.is_empty())
            .map(|t| sha256_hex(&t));

        let message_id = doc
            .source
            .email
            .as_ref()
            .and_then(|email| email.message_id.clone());

        let chat_head_sha = if doc.doc_type.is_chat() && doc.turns.len() >= 2 {
            let head = format!(
                "{}\n{}",
                normalize_text(&doc.turns[0].text),
                normalize_text(&doc.turns[1].text)
            );
            Some(sha256_hex(&head))
        } else {
            None
        };

        Self {
            content_sha256,
            title_sha,
            entity_set_sha: None,
            simhash: simhash64(&normalized),
            message_id,
            chat_head_sha,
        }
    }

    /// Attach the entity-set hash once canonical entities are known.
    pub fn with_entities(mut self, canonical_names: &[String]) -> Self {
        if !canonical_names.is_empty() {
            let mut sorted: Vec<&str> = canonical_names.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            self.entity_set_sha = Some(sha256_hex(&sorted.join("\n")));
        }
        self
    }

    /// Short hex prefix used in export filenames.
    pub fn short_id(&self) -> &str {
        &self.content_sha256[..4]
    }
}

/// Whitespace-collapsed, lowercased, diacritics-stripped text.
pub fn normalize_text(text: &str) -> String {
    let stripped: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// SimHash over token shingles: each shingle votes its hash bits up or
/// down; the sign of each bit position becomes the fingerprint bit.
pub fn simhash64(normalized: &str) -> u64 {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    if tokens.is_empty() {
        return 0;
    }

    let mut votes = [0i32; 64];
    let shingle_count = if tokens.len() > SHINGLE_TOKENS {
        tokens.len() - SHINGLE_TOKENS + 1
    } else {
        1
    };
    for start in 0..shingle_count {
        let end = (start + SHINGLE_TOKENS).min(tokens.len());
        let shingle = tokens[start..end].join(" ");
        let hash = fnv1a(shingle.as_bytes());
        for (bit, vote) in votes.iter_mut().enumerate() {
            if hash >> bit & 1 == 1 {
                *vote += 1;
            } else {
                *vote -= 1;
            }
        }
    }

    let mut fingerprint = 0u64;
    for (bit, vote) in votes.iter().enumerate() {
        if *vote > 0 {
            fingerprint |= 1 << bit;
        }
    }
    fingerprint
}

/// Similarity in [0,1] derived from Hamming distance.
pub fn simhash_similarity(a: u64, b: u64) -> f64 {
    1.0 - (a ^ b).count_ones() as f64 / 64.0
}

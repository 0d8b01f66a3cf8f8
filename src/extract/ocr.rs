//! OCR seam and recognition-quality heuristics.
//!
//! OCR engines are collaborators: image bytes in, text plus confidence out.
//! The quality proxy here decides whether OCR output is usable or the page
//! should escalate to the visual LLM.

use async_trait::async_trait;

/// Result of recognizing one image.
#[derive(Debug, Clone)]
pub struct OcrResult {
    pub text: String,
    /// Engine-reported confidence in [0,1].
    pub confidence: f64,
}

/// Errors from OCR engines.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("ocr engine error: {0}")]
    Engine(String),
}

/// Image-in, text-out recognition engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<OcrResult, OcrError>;
}

/// Mock OCR engine replaying a fixed result, for tests.
pub struct MockOcr {
    text: String,
    confidence: f64,
}

impl MockOcr {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

#[async_trait]
impl OcrEngine for MockOcr {
    async fn recognize(&self, _image: &[u8]) -> Result<OcrResult, OcrError> {
        Ok(OcrResult {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}

/// Ratio of tokens that look like real words: alphabetic, plausible length,
/// containing at least one vowel. A crude stand-in for a dictionary that
/// separates OCR garbage from prose reliably in practice.
pub fn word_ratio(text: &str) -> f64 {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let wordlike = tokens
        .iter()
        .filter(|t| {
            let stripped: String = t.chars().filter(|c| c.is_alphabetic()).collect();
            let len = stripped.chars().count();
            len >= 2
                && len <= 20
                && stripped
                    .to_lowercase()
                    .chars()
                    .any(|c| "aeiouäöü".contains(c))
        })
        .count();
    wordlike as f64 / tokens.len() as f64
}

/// Longest run of one repeated character. OCR failure on line art and
/// tables shows up as long runs of '.', '|', or '-'.
pub fn longest_char_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if Some(c) == prev && !c.is_whitespace() {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        longest = longest.max(run);
    }
    longest
}

/// Maximum repeated-character run before the page counts as garbled.
pub const MAX_CHAR_RUN: usize = 12;

/// Minimum word ratio for OCR output to count as usable text.
pub const MIN_WORD_RATIO: f64 = 0.5;

/// Whether OCR output is good enough to keep, or the page should go to the
/// visual LLM.
pub fn ocr_output_usable(result: &OcrResult) -> bool {
    if result.text.trim().is_empty() {
        return false;
    }
    word_ratio(&result.text) >= MIN_WORD_RATIO && longest_char_run(&result.text) < MAX_CHAR_RUN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prose_scores_high_word_ratio() {
        let ratio = word_ratio("the quick brown fox jumps over the lazy dog");
        assert!(ratio > 0.9, "ratio was {ratio}");
    }

    #[test]
    fn garbage_scores_low_word_ratio() {
        let ratio = word_ratio("x7#@ qq zz9 ---- |||| mmmm kkkk 0x3f");
        assert!(ratio < 0.5, "ratio was {ratio}");
    }

    #[test]
    fn char_runs_detected() {
        assert!(longest_char_run("table ............... end") >= 15);
        assert!(longest_char_run("normal sentence here") < 3);
    }

    #[test]
    fn usable_requires_both_checks() {
        let good = OcrResult {
            text: "an ordinary page of recognized prose about gardens".into(),
            confidence: 0.9,
        };
        assert!(ocr_output_usable(&good));

        let garbled = OcrResult {
            text: "gardens |||||||||||||||| prose about and more words here".into(),
            confidence: 0.9,
        };
        assert!(!ocr_output_usable(&garbled));
    }
}

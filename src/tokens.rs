//! Token estimation for chunk sizing.
//!
//! Default estimate is chars/4, which tracks BPE tokenizers closely enough
//! for sizing decisions. The `tiktoken` feature swaps in exact cl100k_base
//! counts.

#[cfg(feature = "tiktoken")]
mod exact {
    use std::sync::OnceLock;
    use tiktoken_rs::CoreBPE;

    fn bpe() -> Option<&'static CoreBPE> {
        static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();
        BPE.get_or_init(|| tiktoken_rs::cl100k_base().ok()).as_ref()
    }

    pub fn estimate(text: &str) -> usize {
        match bpe() {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => text.chars().count() / 4,
        }
    }
}

/// Estimate the token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    #[cfg(feature = "tiktoken")]
    {
        exact::estimate(text)
    }
    #[cfg(not(feature = "tiktoken"))]
    {
        text.chars().count() / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[cfg(not(feature = "tiktoken"))]
    #[test]
    fn estimate_is_quarter_of_chars() {
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }
}

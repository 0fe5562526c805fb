//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. This is close
//! enough for BPE tokenizers on English text and code, and the prompt budget
//! keeps a safety margin for the difference.

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

//! Text normalization and tokenization
//!
//! The same folding is applied to indexed text and to query criteria, so a
//! criterion matches a stored term exactly when both normalize alike.

use once_cell::sync::Lazy;
use regex::Regex;

/// HTML/XML character entities such as `&amp;` or `&#8217;`
static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&[#\w]+;").unwrap()
});

/// Anything that is not a word char, whitespace or hyphen
static NON_WORD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^-\w\s]").unwrap()
});

static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").unwrap()
});

/// Fold text to its canonical form: entities dropped, punctuation turned
/// into spaces, whitespace collapsed, lowercased and trimmed.
pub fn normalize(text: &str) -> String {
    let text = ENTITY_REGEX.replace_all(text, "");
    let text = NON_WORD_REGEX.replace_all(&text, " ");
    let text = WHITESPACE_REGEX.replace_all(&text, " ");
    text.to_lowercase().trim().to_string()
}

/// Normalize `text` and keep the tokens whose char count exceeds `min_len`.
pub fn tokenize(text: &str, min_len: usize) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|token| token.chars().count() > min_len)
        .map(str::to_string)
        .collect()
}

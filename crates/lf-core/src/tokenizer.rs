use regex::Regex;
use std::sync::LazyLock;

use crate::node::NodeKind;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

/// Characters that always form a token of their own.
pub const PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', ':', '\'', '"', '(', ')', '-'];

/// One unit of tokenized text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub kind: NodeKind,
}

impl Token {
    fn new(text: String) -> Self {
        let kind = if WORD.is_match(&text) {
            NodeKind::Word
        } else {
            NodeKind::Punctuation
        };
        Self { text, kind }
    }
}

pub fn is_punctuation(c: char) -> bool {
    PUNCTUATION.contains(&c)
}

/// Split text into word runs and single punctuation characters.
///
/// Whitespace separates tokens and never becomes one. A run that is not
/// purely ASCII alphanumeric (e.g. "naïve") is still one token, classed as
/// punctuation.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_whitespace() || is_punctuation(c) {
            if !current.is_empty() {
                tokens.push(Token::new(std::mem::take(&mut current)));
            }
            if is_punctuation(c) {
                tokens.push(Token::new(c.to_string()));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(Token::new(current));
    }

    tokens
}

/// Lowercased whitespace-separated words.
pub fn split_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

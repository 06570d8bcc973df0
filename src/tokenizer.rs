use std::ops::Range;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Word,
    Separator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

impl Token<'_> {
    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }

    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Lazy tokenizer over a borrowed string.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Tokens<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.text[self.pos..];
        let first = rest.chars().next()?;
        let in_word = is_word_char(first);
        let len = rest
            .char_indices()
            .find(|&(_, ch)| is_word_char(ch) != in_word)
            .map(|(idx, _)| idx)
            .unwrap_or(rest.len());
        let start = self.pos;
        self.pos += len;
        Some(Token {
            kind: if in_word {
                TokenKind::Word
            } else {
                TokenKind::Separator
            },
            text: &rest[..len],
            start,
            end: self.pos,
        })
    }
}

impl std::iter::FusedIterator for Tokens<'_> {}

/// Splits `text` into alternating word and separator runs that concatenate back to `text`.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    Tokens::new(text).collect()
}

/// Only the word tokens of `text`.
pub fn words(text: &str) -> impl Iterator<Item = Token<'_>> {
    Tokens::new(text).filter(|token| token.is_word())
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(text: &str) -> String {
        tokenize(text).iter().map(|token| token.text).collect()
    }

    #[test]
    fn reassembly_is_exact() {
        let inputs = [
            "",
            "...",
            "   ",
            "grace",
            "The grace and virtue of the Grace inspired hope.",
            "  leading and trailing  ",
            "snake_case, dash-separated; naïve café… done!",
            "line one\nline two\r\n\ttabbed",
            "数字123 and émoji 🙂!",
        ];
        for input in inputs {
            assert_eq!(reassemble(input), input, "input {input:?}");
        }
    }

    #[test]
    fn empty_input_has_no_tokens() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn pure_punctuation_is_one_separator() {
        let tokens = tokenize("?!, ...");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Separator);
        assert_eq!(tokens[0].span(), 0..7);
    }

    #[test]
    fn words_and_separators_alternate() {
        let tokens = tokenize("Hope, grace_2!");
        let kinds: Vec<_> = tokens.iter().map(|t| (t.kind, t.text)).collect();
        assert_eq!(
            kinds,
            [
                (TokenKind::Word, "Hope"),
                (TokenKind::Separator, ", "),
                (TokenKind::Word, "grace_2"),
                (TokenKind::Separator, "!"),
            ]
        );
    }

    #[test]
    fn offsets_are_byte_offsets() {
        let text = "café au lait";
        let tokens = tokenize(text);
        for token in &tokens {
            assert_eq!(&text[token.span()], token.text);
        }
        assert_eq!(tokens[0].end, "café".len());
    }

    #[test]
    fn words_skips_separators() {
        let found: Vec<_> = words("a, b; c").map(|t| t.text).collect();
        assert_eq!(found, ["a", "b", "c"]);
    }
}

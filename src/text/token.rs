use std::{fmt::Debug, sync::Arc};

use once_cell::sync::Lazy;
use regex::Regex;

/// Default token pattern: word runs, chained across single embedded periods
/// so that "U.S" or "e.g" stay one token.
pub const DEFAULT_PATTERN: &str = r"\w+(\.?\w+)*";

pub const WHITESPACE_NAME: &str = "whitespace";

static DEFAULT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_PATTERN).expect("default token pattern compiles"));

/// A token as it appears in the raw text.
/// `start..end` is the byte range of `text` inside the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    /// 0-based position among the tokens of the document
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

/// Tokenizer
/// Splits a document into tokens with their offsets.
///
/// Implementations must be interchangeable: same `Token` shape, sequential
/// `index` starting at 0, and a `name` that changes whenever the offsets
/// they produce would change. The name is stored on every index row.
pub trait Tokenizer: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Lazily scan `text`. Calling it again restarts from the beginning.
    fn tokenize<'a>(&'a self, text: &'a str) -> Box<dyn Iterator<Item = Token<'a>> + 'a>;
}

/// Regular-expression tokenizer, the default.
#[derive(Debug, Clone)]
pub struct RegexTokenizer {
    name: String,
    pattern: Regex,
}

impl Default for RegexTokenizer {
    fn default() -> Self {
        Self {
            name: format!("regex:{DEFAULT_PATTERN}"),
            pattern: DEFAULT_REGEX.clone(),
        }
    }
}

impl RegexTokenizer {
    /// Tokenizer with a custom pattern; each match is one token
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: format!("regex:{pattern}"),
            pattern: Regex::new(pattern)?,
        })
    }
}

impl Tokenizer for RegexTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn tokenize<'a>(&'a self, text: &'a str) -> Box<dyn Iterator<Item = Token<'a>> + 'a> {
        Box::new(self.pattern.find_iter(text).enumerate().map(|(index, m)| Token {
            text: m.as_str(),
            index,
            start: m.start(),
            end: m.end(),
        }))
    }
}

/// Splits on Unicode whitespace. Punctuation stays attached to its word.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn name(&self) -> &str {
        WHITESPACE_NAME
    }

    fn tokenize<'a>(&'a self, text: &'a str) -> Box<dyn Iterator<Item = Token<'a>> + 'a> {
        Box::new(WhitespaceTokens { text, pos: 0, index: 0 })
    }
}

struct WhitespaceTokens<'a> {
    text: &'a str,
    pos: usize,
    index: usize,
}

impl<'a> Iterator for WhitespaceTokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let rest = &self.text[self.pos..];
        let (skip, _) = rest.char_indices().find(|(_, c)| !c.is_whitespace())?;
        let start = self.pos + skip;
        let len = self.text[start..]
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
            .map_or(self.text.len() - start, |(i, _)| i);
        let end = start + len;
        self.pos = end;
        let token = Token { text: &self.text[start..end], index: self.index, start, end };
        self.index += 1;
        Some(token)
    }
}

/// Find a tokenizer from the name stored on an index row.
pub fn resolve(name: &str) -> Option<Arc<dyn Tokenizer>> {
    if name == WHITESPACE_NAME {
        return Some(Arc::new(WhitespaceTokenizer));
    }
    let pattern = name.strip_prefix("regex:")?;
    if pattern == DEFAULT_PATTERN {
        return Some(Arc::new(RegexTokenizer::default()));
    }
    RegexTokenizer::new(pattern)
        .ok()
        .map(|t| Arc::new(t) as Arc<dyn Tokenizer>)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(tokenizer: &'a dyn Tokenizer, text: &'a str) -> Vec<&'a str> {
        tokenizer.tokenize(text).map(|t| t.text).collect()
    }

    #[test]
    fn regex_keeps_abbreviations_together() {
        let t = RegexTokenizer::default();
        assert_eq!(texts(&t, "The U.S. economy, e.g. jobs"), vec!["The", "U.S", "economy", "e.g", "jobs"]);
    }

    #[test]
    fn offsets_slice_back_to_the_token() {
        let text = "  hello,   wide world ";
        for tokenizer in [&RegexTokenizer::default() as &dyn Tokenizer, &WhitespaceTokenizer] {
            for (i, token) in tokenizer.tokenize(text).enumerate() {
                assert_eq!(token.index, i);
                assert_eq!(&text[token.start..token.end], token.text);
            }
        }
    }

    #[test]
    fn whitespace_keeps_punctuation() {
        assert_eq!(texts(&WhitespaceTokenizer, "hello,\tworld!\n"), vec!["hello,", "world!"]);
        assert!(texts(&WhitespaceTokenizer, "   ").is_empty());
    }

    #[test]
    fn tokenize_restarts() {
        let t = RegexTokenizer::default();
        let first: Vec<_> = t.tokenize("a b c").collect();
        let second: Vec<_> = t.tokenize("a b c").collect();
        assert_eq!(first, second);
    }

    #[test]
    fn resolve_round_trips_names() {
        let custom = RegexTokenizer::new(r"[a-z]+").unwrap();
        for name in [RegexTokenizer::default().name(), WHITESPACE_NAME, custom.name()] {
            assert_eq!(resolve(name).map(|t| t.name().to_string()).as_deref(), Some(name));
        }
        assert!(resolve("sudachi").is_none());
        assert!(resolve("regex:(").is_none());
    }
}

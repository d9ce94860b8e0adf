use std::fmt::Debug;

/// Normalizes a token before it becomes part of a sequence's identity.
pub trait Stemmer: Send + Sync + Debug {
    fn clean(&self, text: &str) -> String;
}

/// Whitespace collapse + trim + lowercase.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clean;

impl Stemmer for Clean {
    #[inline]
    fn clean(&self, text: &str) -> String {
        clean(text)
    }
}

/// Collapse every whitespace run to one space, trim, lowercase.
pub fn clean(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for part in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(part.chars().flat_map(char::to_lowercase));
    }
    out
}

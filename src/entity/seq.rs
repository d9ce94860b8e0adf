use std::{cmp::Ordering, fmt, ops::Add};

use serde::{Deserialize, Serialize};

use crate::{entity::SeqId, text::stem::clean};

/// Discriminant of a sequence.
/// `Word("the")` and `Gram("the")` are different sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeqKind {
    /// exactly one token
    Word,
    /// two or more tokens joined by single spaces
    Gram,
}

impl SeqKind {
    /// Kind of a sequence made of `tokens` tokens
    #[inline]
    pub fn of_len(tokens: usize) -> Self {
        if tokens <= 1 { SeqKind::Word } else { SeqKind::Gram }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeqKind::Word => "word",
            SeqKind::Gram => "gram",
        }
    }
}

impl fmt::Display for SeqKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seq
/// The unit of indexing: a normalized token string tagged as Word or Gram.
///
/// Identity is `(kind, text)`. Ordering goes by text first so that a sorted
/// list reads alphabetically, with the kind only breaking ties.
///
/// # Examples
/// ```
/// use seqdex::entity::{Seq, SeqKind};
///
/// let gram = Seq::word("New") + Seq::word("York");
/// assert_eq!(gram.kind(), SeqKind::Gram);
/// assert_eq!(gram.text(), "new york");
/// assert_ne!(Seq::word("the"), Seq::gram(&["the"]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Seq {
    kind: SeqKind,
    text: Box<str>,
}

impl Seq {
    /// Build from text that is already cleaned.
    /// The parser uses this; everything public goes through `clean`.
    #[inline]
    pub(crate) fn from_clean(kind: SeqKind, text: impl Into<Box<str>>) -> Self {
        Seq { kind, text: text.into() }
    }

    /// A single-token sequence
    pub fn word(text: &str) -> Self {
        Seq::from_clean(SeqKind::Word, clean(text))
    }

    /// A multi-token sequence; each token is cleaned and joined by one space.
    /// The kind is `Gram` regardless of how many tokens are given.
    pub fn gram<T>(tokens: &[T]) -> Self
    where
        T: AsRef<str>,
    {
        let text = tokens
            .iter()
            .map(|t| clean(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Seq::from_clean(SeqKind::Gram, text)
    }

    /// Word for one token, Gram for several
    pub fn from_tokens<T>(tokens: &[T]) -> Self
    where
        T: AsRef<str>,
    {
        match tokens {
            [single] => Seq::word(single.as_ref()),
            _ => Seq::gram(tokens),
        }
    }

    #[inline]
    pub fn kind(&self) -> SeqKind {
        self.kind
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_word(&self) -> bool {
        self.kind == SeqKind::Word
    }

    pub fn is_gram(&self) -> bool {
        self.kind == SeqKind::Gram
    }

    /// Tokens of the sequence
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.text.split(' ').filter(|t| !t.is_empty())
    }

    /// Number of tokens
    pub fn len(&self) -> usize {
        self.tokens().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl Ord for Seq {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text.cmp(&other.text).then(self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for Seq {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.kind, self.text)
    }
}

/// Composition: any two sequences join into a Gram.
impl<'a> Add<&'a Seq> for &'a Seq {
    type Output = Seq;

    fn add(self, rhs: &'a Seq) -> Seq {
        let text = match (self.is_empty(), rhs.is_empty()) {
            (true, _) => rhs.text.to_string(),
            (_, true) => self.text.to_string(),
            _ => format!("{} {}", self.text, rhs.text),
        };
        Seq::from_clean(SeqKind::Gram, text)
    }
}

impl Add for Seq {
    type Output = Seq;

    fn add(self, rhs: Seq) -> Seq {
        &self + &rhs
    }
}

/// A sequence as stored: the value plus its id and reference count.
/// `count` always equals the number of index rows pointing at `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqRecord {
    pub id: SeqId,
    pub seq: Seq,
    pub count: u64,
}

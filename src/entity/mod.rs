//! Entities that the store persists: documents, sequences and the index
//! rows linking them.

pub mod seq;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use seq::{Seq, SeqKind, SeqRecord};

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

row_id!(
    /// Store-assigned document key
    DocumentId, "doc"
);
row_id!(
    /// Store-assigned sequence key
    SeqId, "seq"
);
row_id!(IndexId, "idx");

/// Optional document metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: Option<String>,
    pub url: Option<String>,
    /// unix seconds
    pub created: Option<u64>,
    /// number of tokens, filled in by the indexer
    pub word_count: Option<u64>,
}

impl DocumentMeta {
    pub fn titled(title: impl Into<String>) -> Self {
        Self { title: Some(title.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub text: String,
    pub meta: DocumentMeta,
}

/// Where one occurrence sits in its document.
///
/// Token positions are inclusive. `start..end` is a byte range into the
/// document text, so `&text[start..end]` is the raw occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub first_token: usize,
    pub last_token: usize,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn token_len(&self) -> usize {
        self.last_token - self.first_token + 1
    }
}

/// One occurrence of one sequence in one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub id: IndexId,
    pub document: DocumentId,
    pub seq: SeqId,
    pub span: Span,
    /// name of the tokenizer the offsets refer to
    pub tokenizer: Box<str>,
}

/// An index row before the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIndex {
    pub document: DocumentId,
    pub seq: SeqId,
    pub span: Span,
    pub tokenizer: Box<str>,
}

impl NewIndex {
    pub(crate) fn with_id(self, id: IndexId) -> Index {
        Index {
            id,
            document: self.document,
            seq: self.seq,
            span: self.span,
            tokenizer: self.tokenizer,
        }
    }
}

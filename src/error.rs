//! Error types shared across the crate.

use thiserror::Error;

use crate::entity::{DocumentId, IndexId, SeqId};

/// Malformed configuration, detected when something is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A network needs at least an input and an output layer
    #[error("a network needs at least 2 layers, got {0}")]
    TooFewLayers(usize),
    /// A layer without nodes cannot be connected
    #[error("layer {0} has no nodes")]
    EmptyLayer(usize),
    /// Weight range with lower bound above upper bound
    #[error("invalid weight range [{0}, {1}]")]
    WeightRange(f64, f64),
    /// Out of range parameter
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors raised at the persistence boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness or reference rule would be broken
    #[error("integrity violation: {0}")]
    Integrity(String),
    /// Referenced row does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// Transaction failed and was rolled back
    #[error("storage failure: {0}")]
    Storage(String),
    /// Snapshot encode/decode failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_cbor::Error),
}

impl StoreError {
    /// Integrity conflicts come from racing writers and may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Integrity(_))
    }

    pub(crate) fn missing_document(id: DocumentId) -> Self {
        StoreError::NotFound(format!("document {id}"))
    }

    pub(crate) fn missing_seq(id: SeqId) -> Self {
        StoreError::NotFound(format!("sequence {id}"))
    }

    pub(crate) fn missing_index(id: IndexId) -> Self {
        StoreError::NotFound(format!("index {id}"))
    }
}

/// Errors raised by the indexer and the concordance.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("document {0} does not exist")]
    DocumentNotFound(DocumentId),
    /// Offsets of an index only make sense for the tokenizer that produced them
    #[error("index was built with tokenizer `{indexed}`, which is not available here (have `{current}`)")]
    TokenizerMismatch { indexed: String, current: String },
}

/// Crate level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("encoding error: {0}")]
    Cbor(#[from] serde_cbor::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Persistence boundary.
//!
//! The indexer and the concordance only talk to storage through these
//! traits:
//!
//! - [`Reader`]: lookups, including the batched `matching` existence check
//!   and `indexes(document)`.
//! - [`Writer`]: create/delete for documents, sequences and index rows.
//! - [`Store`]: hands out readers and runs all-or-nothing transactions.
//!
//! [`MemoryStore`] is the implementation shipped with the crate.

pub mod memory;
pub mod serde;

use ::serde::{Deserialize, Serialize};

use crate::{
    entity::{Document, DocumentId, DocumentMeta, Index, IndexId, NewIndex, Seq, SeqId, SeqKind, SeqRecord},
    error::StoreError,
};

pub use memory::MemoryStore;
pub use self::serde::StoreSnapshot;

/// Row counts and write generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub documents: usize,
    pub seqs: usize,
    pub indexes: usize,
    pub generation: u64,
}

/// Read side of the store. Missing rows come back as `None`, never as errors.
pub trait Reader {
    fn document(&self, id: DocumentId) -> Option<Document>;

    fn document_ids(&self) -> Vec<DocumentId>;

    fn seq(&self, id: SeqId) -> Option<SeqRecord>;

    /// Look a sequence up by identity
    fn find(&self, seq: &Seq) -> Option<SeqRecord>;

    /// Batched existence check: the stored sequences of `kind` whose text is
    /// one of `texts`. Texts must already be cleaned. Unknown texts are
    /// simply absent from the result.
    fn matching(&self, kind: SeqKind, texts: &[&str]) -> Vec<SeqRecord>;

    /// Every stored sequence
    fn seqs(&self) -> Vec<SeqRecord>;

    /// Index rows of a document with the sequence each one references,
    /// ordered by row id
    fn indexes(&self, document: DocumentId) -> Vec<(Index, SeqRecord)>;

    /// Index rows referencing a sequence, ordered by row id
    fn occurrences(&self, seq: SeqId) -> Vec<Index>;

    fn stats(&self) -> StoreStats;

    /// Incremented by every committed transaction that wrote something
    fn generation(&self) -> u64 {
        self.stats().generation
    }

    fn word(&self, text: &str) -> Option<SeqRecord> {
        self.find(&Seq::word(text))
    }

    fn gram(&self, tokens: &[&str]) -> Option<SeqRecord> {
        self.find(&Seq::gram(tokens))
    }
}

/// Write side, only reachable inside a transaction.
pub trait Writer: Reader {
    fn add_document(&mut self, text: String, meta: DocumentMeta) -> Result<DocumentId, StoreError>;

    /// Replace text/metadata of an existing document
    fn update_document(&mut self, document: Document) -> Result<(), StoreError>;

    /// Delete a document. Its index rows go with it, and sequences left
    /// without any index row are dropped as well.
    fn remove_document(&mut self, id: DocumentId) -> Result<(), StoreError>;

    /// Insert a sequence with count 0.
    /// Fails with `Integrity` when `(kind, text)` is already stored.
    /// A sequence still at count 0 when the transaction commits fails the commit.
    fn add_seq(&mut self, seq: Seq) -> Result<SeqId, StoreError>;

    /// Delete a sequence. Fails with `Integrity` while index rows reference it.
    fn remove_seq(&mut self, id: SeqId) -> Result<(), StoreError>;

    /// Insert an index row; the referenced sequence's count goes up by one.
    fn add_index(&mut self, index: NewIndex) -> Result<IndexId, StoreError>;

    /// Delete an index row; the referenced sequence's count goes down by one.
    fn remove_index(&mut self, id: IndexId) -> Result<Index, StoreError>;
}

/// Store
/// A handle the caller passes into every indexing and lookup operation.
pub trait Store: Send + Sync {
    /// Run `f` against a consistent view. Reads may run concurrently.
    fn read<T>(&self, f: impl FnOnce(&dyn Reader) -> T) -> T;

    /// Run `f` as one transaction. Writers are serialized; when `f` returns
    /// an error, or the commit checks fail, every write it made is undone.
    fn transaction<T, E>(&self, f: impl FnOnce(&mut dyn Writer) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>;
}

//! This crate is a sequence index and concordance engine with a small neural network on top.
pub mod config;
pub mod entity;
pub mod error;
pub mod evaluate;
pub mod index;
pub mod network;
pub mod store;
pub mod text;
pub mod utils;

/// Indexer
/// Parses documents into Words and Grams and merges them into a store.
///
/// Every occurrence becomes one `Index` row, and every stored sequence keeps
/// a count equal to its number of rows. A sequence whose count drops to
/// zero is deleted in the same transaction.
///
/// - `add` / `remove` / `update`: single documents, one transaction each
/// - `add_many`: parallel parsing, sequential merging
/// - `index_text`: store and index a new text in one step
/// - `preview`: dry-run parse without writing
pub use index::Indexer;

/// Concordance
/// Read-only queries over the index: look a query string up, list its
/// occurrences per document, and rebuild keyword-in-context lines from the
/// stored offsets.
pub use index::Concordance;

/// Parser
/// Sliding-window n-gram extraction over cleaned tokens.
/// Pure, so it can run in parallel or as a dry run.
pub use text::Parser;

/// In-memory store
/// Transactions hold a write lock and are undone on error, so a failed
/// merge leaves nothing behind. Can be snapshotted to CBOR and restored.
///
/// # Serialization
/// Through `StoreSnapshot`, or `to_bytes` / `from_bytes`.
pub use store::MemoryStore;

/// Persistence traits: `Reader`, `Writer` and `Store`
pub use store::{Reader, Store, Writer};

/// Word or Gram
pub use entity::{Seq, SeqKind};

/// Tanh multilayer perceptron whose input and output nodes carry payloads
pub use network::NeuralNetwork;

/// Ranked results
pub use evaluate::{Rank, Ranker, Score};

pub use error::{Error, Result};

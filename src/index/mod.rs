//! Indexing: merge a document's parse into the store, and take it back out.
//!
//! Every operation runs inside one store transaction, so a failure part way
//! through a merge leaves no index rows, sequences or counts behind.

pub mod concordance;

use std::{borrow::Cow, collections::{BTreeSet, HashMap}, sync::Arc};

use ahash::RandomState;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::IndexerConfig,
    entity::{DocumentId, DocumentMeta, NewIndex, Seq, SeqId, SeqKind, Span},
    error::{ConfigError, IndexError},
    store::{Store, Writer},
    text::{Parse, Parser, Stemmer, Tokenizer},
};

pub use concordance::{Concordance, Kwic, Window};

/// What one indexing operation changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub document: DocumentId,
    pub indexes_added: usize,
    pub indexes_removed: usize,
    /// sequences inserted by this operation
    pub seqs_created: usize,
    /// sequences that already existed and gained rows
    pub seqs_merged: usize,
    /// sequences garbage collected at count zero
    pub seqs_removed: usize,
}

impl IndexReport {
    pub fn new(document: DocumentId) -> Self {
        Self {
            document,
            indexes_added: 0,
            indexes_removed: 0,
            seqs_created: 0,
            seqs_merged: 0,
            seqs_removed: 0,
        }
    }

    /// Fold the counters of a later phase into this report
    pub fn absorb(&mut self, other: IndexReport) {
        self.indexes_added += other.indexes_added;
        self.indexes_removed += other.indexes_removed;
        self.seqs_created += other.seqs_created;
        self.seqs_merged += other.seqs_merged;
        self.seqs_removed += other.seqs_removed;
    }

    /// true when nothing was written
    pub fn is_noop(&self) -> bool {
        self.indexes_added == 0 && self.indexes_removed == 0
    }
}

/// Indexer
/// Merges parsed documents into a [`Store`] and keeps sequence counts equal
/// to the number of index rows referencing them.
///
/// - `add`: parse, look up existing sequences in batches, insert the missing
///   ones, then one index row per occurrence.
/// - `remove`: drop the document's index rows, then every sequence whose
///   count fell to zero.
/// - `update`: `remove` then `add` in the same transaction.
///
/// `add` is not idempotent: adding an indexed document again counts its
/// occurrences twice. Use `update` to re-index.
///
/// # Examples
/// ```
/// use seqdex::{config::IndexerConfig, entity::DocumentMeta, index::Indexer, store::{MemoryStore, Reader, Store}};
///
/// let store = MemoryStore::new();
/// let indexer = Indexer::new(&store, IndexerConfig::default()).unwrap();
/// let report = indexer.index_text("the cat sat on the mat", DocumentMeta::default()).unwrap();
/// assert_eq!(report.indexes_added, 6 + 5 + 4);
/// assert_eq!(store.read(|r| r.word("the")).unwrap().count, 2);
/// ```
pub struct Indexer<'s, S: Store> {
    store: &'s S,
    parser: Parser,
    config: IndexerConfig,
}

impl<'s, S: Store> Indexer<'s, S> {
    pub fn new(store: &'s S, config: IndexerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            parser: Parser::new(config.max_gram_length),
            config,
        })
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.parser = self.parser.with_tokenizer(tokenizer);
        self
    }

    pub fn with_stemmer(mut self, stemmer: Arc<dyn Stemmer>) -> Self {
        self.parser = self.parser.with_stemmer(stemmer);
        self
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    /// Dry run: what `add` would merge for `text`
    pub fn preview(&self, text: &str) -> Parse {
        self.parser.parse(text)
    }

    #[instrument(skip(self))]
    pub fn add(&self, document: DocumentId) -> Result<IndexReport, IndexError> {
        let report = self.store.transaction(|tx| {
            let text = tx.document(document).ok_or(IndexError::DocumentNotFound(document))?.text;
            let parse = self.parser.parse(&text);
            merge(tx, document, &parse, self.config.match_batch_size)
        })?;
        info!(
            indexes = report.indexes_added,
            created = report.seqs_created,
            merged = report.seqs_merged,
            "document indexed"
        );
        Ok(report)
    }

    /// Take a document out of the index. A document without index rows is left alone.
    #[instrument(skip(self))]
    pub fn remove(&self, document: DocumentId) -> Result<IndexReport, IndexError> {
        let report = self.store.transaction(|tx| unmerge(tx, document))?;
        if report.is_noop() {
            debug!("document was not indexed");
        } else {
            info!(indexes = report.indexes_removed, removed = report.seqs_removed, "document unindexed");
        }
        Ok(report)
    }

    /// Re-index a document from its current text. Running it any number of
    /// times leaves the same counts as one `add`.
    #[instrument(skip(self))]
    pub fn update(&self, document: DocumentId) -> Result<IndexReport, IndexError> {
        let report = self.store.transaction(|tx| {
            let mut report = unmerge(tx, document)?;
            let text = tx.document(document).ok_or(IndexError::DocumentNotFound(document))?.text;
            let parse = self.parser.parse(&text);
            report.absorb(merge(tx, document, &parse, self.config.match_batch_size)?);
            Ok::<_, IndexError>(report)
        })?;
        info!(
            removed = report.indexes_removed,
            added = report.indexes_added,
            "document re-indexed"
        );
        Ok(report)
    }

    /// Store a new document and index it in one transaction
    #[instrument(skip_all, fields(bytes = text.len()))]
    pub fn index_text(&self, text: &str, meta: DocumentMeta) -> Result<IndexReport, IndexError> {
        let parse = self.parser.parse(text);
        let report = self.store.transaction(|tx| {
            let document = tx.add_document(text.to_string(), meta)?;
            merge(tx, document, &parse, self.config.match_batch_size)
        })?;
        info!(document = %report.document, indexes = report.indexes_added, "document stored and indexed");
        Ok(report)
    }

    /// Index several documents. Parsing runs in parallel; each merge then
    /// runs in its own transaction, in the order given. Stops at the first
    /// failure, keeping the documents merged before it.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub fn add_many(&self, documents: &[DocumentId]) -> Result<Vec<IndexReport>, IndexError> {
        let texts = self.store.read(|r| {
            documents
                .iter()
                .map(|&id| r.document(id).map(|d| (id, d.text)).ok_or(IndexError::DocumentNotFound(id)))
                .collect::<Result<Vec<_>, _>>()
        })?;
        let parses: Vec<Parse> = texts.par_iter().map(|(_, text)| self.parser.parse(text)).collect();
        debug!(parsed = parses.len(), "parsed documents");

        let mut reports = Vec::with_capacity(texts.len());
        for ((id, text), parse) in texts.iter().zip(&parses) {
            let report = self.store.transaction(|tx| {
                let current = tx.document(*id).ok_or(IndexError::DocumentNotFound(*id))?;
                // edited since it was read: parse again
                let parse = if current.text == *text {
                    Cow::Borrowed(parse)
                } else {
                    Cow::Owned(self.parser.parse(&current.text))
                };
                merge(tx, *id, &parse, self.config.match_batch_size)
            })?;
            reports.push(report);
        }
        info!(
            indexes = reports.iter().map(|r| r.indexes_added).sum::<usize>(),
            "documents indexed"
        );
        Ok(reports)
    }
}

/// Write one index row per occurrence in `parse`, inserting sequences the
/// store does not know yet.
fn merge(tx: &mut dyn Writer, id: DocumentId, parse: &Parse, batch: usize) -> Result<IndexReport, IndexError> {
    let mut document = tx.document(id).ok_or(IndexError::DocumentNotFound(id))?;
    let existing = tx.indexes(id).len();
    if existing > 0 {
        warn!(document = %id, existing, "document is already indexed, its occurrences will be counted twice");
    }
    let mut report = IndexReport::new(id);
    for kind in [SeqKind::Word, SeqKind::Gram] {
        let entries: Vec<(&Seq, &[Span])> = parse.of_kind(kind).collect();
        for chunk in entries.chunks(batch.max(1)) {
            let texts: Vec<&str> = chunk.iter().map(|(seq, _)| seq.text()).collect();
            let known: HashMap<Seq, SeqId, RandomState> =
                tx.matching(kind, &texts).into_iter().map(|r| (r.seq, r.id)).collect();
            debug!(%kind, batch = texts.len(), known = known.len(), "matched sequences");
            for (seq, spans) in chunk {
                let seq_id = match known.get(*seq) {
                    Some(&seq_id) => {
                        report.seqs_merged += 1;
                        seq_id
                    }
                    None => {
                        report.seqs_created += 1;
                        tx.add_seq((*seq).clone())?
                    }
                };
                for span in spans.iter() {
                    tx.add_index(NewIndex {
                        document: id,
                        seq: seq_id,
                        span: *span,
                        tokenizer: parse.tokenizer.clone(),
                    })?;
                    report.indexes_added += 1;
                }
            }
        }
    }
    document.meta.word_count = Some(parse.token_count as u64);
    tx.update_document(document)?;
    Ok(report)
}

/// Remove every index row of a document and collect the sequences left at zero.
fn unmerge(tx: &mut dyn Writer, id: DocumentId) -> Result<IndexReport, IndexError> {
    let mut document = tx.document(id).ok_or(IndexError::DocumentNotFound(id))?;
    let mut report = IndexReport::new(id);
    let rows = tx.indexes(id);
    if rows.is_empty() {
        return Ok(report);
    }
    let mut touched = BTreeSet::new();
    for (index, _) in rows {
        tx.remove_index(index.id)?;
        touched.insert(index.seq);
        report.indexes_removed += 1;
    }
    for seq in touched {
        if tx.seq(seq).is_some_and(|r| r.count == 0) {
            tx.remove_seq(seq)?;
            report.seqs_removed += 1;
        }
    }
    document.meta.word_count = None;
    tx.update_document(document)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entity::SeqRecord,
        error::StoreError,
        store::{MemoryStore, Reader},
    };

    fn stored(store: &MemoryStore, texts: &[&str]) -> Vec<DocumentId> {
        store
            .transaction(|tx| {
                texts
                    .iter()
                    .map(|t| tx.add_document(t.to_string(), DocumentMeta::default()))
                    .collect::<Result<Vec<_>, StoreError>>()
            })
            .unwrap()
    }

    fn indexer(store: &MemoryStore, max_gram_length: usize) -> Indexer<'_, MemoryStore> {
        Indexer::new(store, IndexerConfig { max_gram_length, ..Default::default() }).unwrap()
    }

    /// (kind, text, count) of every stored sequence, ids left out
    fn census(store: &MemoryStore) -> Vec<(SeqKind, String, u64)> {
        let mut out: Vec<_> = store
            .read(|r| r.seqs())
            .into_iter()
            .map(|SeqRecord { seq, count, .. }| (seq.kind(), seq.text().to_string(), count))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn invalid_config_is_rejected() {
        let store = MemoryStore::new();
        let config = IndexerConfig { match_batch_size: 0, ..Default::default() };
        assert!(Indexer::new(&store, config).is_err());
    }

    #[test]
    fn add_counts_every_occurrence() {
        let store = MemoryStore::new();
        let docs = stored(&store, &["to be or not to be"]);
        let report = indexer(&store, 2).add(docs[0]).unwrap();
        assert_eq!(report.indexes_added, 6 + 5);
        assert_eq!(store.read(|r| r.word("to")).unwrap().count, 2);
        assert_eq!(store.read(|r| r.gram(&["to", "be"])).unwrap().count, 2);
        assert_eq!(store.read(|r| r.document(docs[0])).unwrap().meta.word_count, Some(6));
        store.check_consistency().unwrap();
    }

    #[test]
    fn remove_restores_cardinalities() {
        let store = MemoryStore::new();
        let docs = stored(&store, &["the cat sat", "the dog sat down"]);
        let indexer = indexer(&store, 3);
        indexer.add(docs[0]).unwrap();
        let before = (census(&store), store.stats().indexes);

        indexer.add(docs[1]).unwrap();
        let report = indexer.remove(docs[1]).unwrap();
        assert_eq!(report.indexes_removed, 4 + 3 + 2);
        assert_eq!((census(&store), store.stats().indexes), before);
        store.check_consistency().unwrap();
    }

    #[test]
    fn shared_words_lose_one_count_unique_words_vanish() {
        let store = MemoryStore::new();
        let docs = stored(&store, &["apple shared", "shared banana"]);
        let indexer = indexer(&store, 1);
        indexer.add_many(&docs).unwrap();
        assert_eq!(store.read(|r| r.word("shared")).unwrap().count, 2);

        let report = indexer.remove(docs[0]).unwrap();
        assert_eq!(report.seqs_removed, 1);
        assert!(store.read(|r| r.word("apple")).is_none());
        assert_eq!(store.read(|r| r.word("shared")).unwrap().count, 1);
    }

    #[test]
    fn removing_unindexed_document_is_a_noop() {
        let store = MemoryStore::new();
        let docs = stored(&store, &["never indexed"]);
        let generation = store.stats().generation;
        let report = indexer(&store, 3).remove(docs[0]).unwrap();
        assert!(report.is_noop());
        assert_eq!(store.stats().generation, generation);
    }

    #[test]
    fn missing_document_is_reported() {
        let store = MemoryStore::new();
        let err = indexer(&store, 3).add(DocumentId(99)).unwrap_err();
        assert!(matches!(err, IndexError::DocumentNotFound(DocumentId(99))));
        assert_eq!(store.stats().indexes, 0);
    }

    #[test]
    fn adding_twice_double_counts() {
        let store = MemoryStore::new();
        let docs = stored(&store, &["hello world"]);
        let indexer = indexer(&store, 2);
        indexer.add(docs[0]).unwrap();
        let again = indexer.add(docs[0]).unwrap();
        assert_eq!(again.seqs_created, 0);
        assert_eq!(again.seqs_merged, 3);
        assert_eq!(store.read(|r| r.word("hello")).unwrap().count, 2);
        store.check_consistency().unwrap();
    }

    #[test]
    fn update_is_idempotent() {
        let store = MemoryStore::new();
        let docs = stored(&store, &["a rose is a rose"]);
        let indexer = indexer(&store, 3);
        indexer.add(docs[0]).unwrap();
        let once = census(&store);
        indexer.update(docs[0]).unwrap();
        indexer.update(docs[0]).unwrap();
        assert_eq!(census(&store), once);
        store.check_consistency().unwrap();
    }

    #[test]
    fn update_follows_edited_text() {
        let store = MemoryStore::new();
        let docs = stored(&store, &["old words"]);
        let indexer = indexer(&store, 1);
        indexer.add(docs[0]).unwrap();
        store
            .transaction(|tx| {
                let mut doc = tx.document(docs[0]).unwrap();
                doc.text = "new words".into();
                tx.update_document(doc)
            })
            .unwrap();
        let report = indexer.update(docs[0]).unwrap();
        assert_eq!(report.seqs_removed, 2);
        assert!(store.read(|r| r.word("old")).is_none());
        assert_eq!(store.read(|r| r.word("new")).unwrap().count, 1);
    }

    #[test]
    fn batch_size_does_not_change_the_result() {
        let text = "one two three two one three one";
        let small = MemoryStore::new();
        let docs = stored(&small, &[text]);
        Indexer::new(&small, IndexerConfig { match_batch_size: 1, ..Default::default() })
            .unwrap()
            .add(docs[0])
            .unwrap();
        let large = MemoryStore::new();
        indexer(&large, 3).index_text(text, DocumentMeta::default()).unwrap();
        assert_eq!(census(&small), census(&large));
    }

    #[test]
    fn preview_writes_nothing() {
        let store = MemoryStore::new();
        let parse = indexer(&store, 2).preview("dry run only");
        assert_eq!(parse.len(), 3 + 2);
        assert_eq!(store.stats().seqs, 0);
    }

    #[test]
    fn add_many_keeps_order() {
        let store = MemoryStore::new();
        let docs = stored(&store, &["x y", "y z", "z x"]);
        let reports = indexer(&store, 1).add_many(&docs).unwrap();
        assert_eq!(reports.iter().map(|r| r.document).collect::<Vec<_>>(), docs);
        assert_eq!(reports[0].seqs_created, 2);
        assert_eq!(reports[2].seqs_created, 0);
        assert_eq!(store.read(|r| r.word("x")).unwrap().count, 2);
    }
}

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ahash::RandomState;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    entity::{Document, DocumentId, DocumentMeta, Index, IndexId, NewIndex, Seq, SeqId, SeqKind, SeqRecord},
    error::StoreError,
    store::{Reader, Store, StoreSnapshot, StoreStats, Writer},
};

/// Next free row ids
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextIds {
    pub document: u64,
    pub seq: u64,
    pub index: u64,
}

/// Tables and the secondary indexes kept in step with them.
/// The raw operations here do no validation; `Tx` does.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tables {
    pub(super) documents: BTreeMap<DocumentId, Document>,
    pub(super) seqs: BTreeMap<SeqId, SeqRecord>,
    /// unique (kind, text)
    pub(super) seq_keys: HashMap<Seq, SeqId, RandomState>,
    pub(super) indexes: BTreeMap<IndexId, Index>,
    pub(super) doc_indexes: HashMap<DocumentId, BTreeSet<IndexId>, RandomState>,
    pub(super) seq_indexes: HashMap<SeqId, BTreeSet<IndexId>, RandomState>,
    pub(super) next: NextIds,
    pub(super) generation: u64,
}

impl Tables {
    fn put_document(&mut self, doc: Document) -> Option<Document> {
        self.documents.insert(doc.id, doc)
    }

    fn take_document(&mut self, id: DocumentId) -> Option<Document> {
        self.documents.remove(&id)
    }

    pub(super) fn put_seq(&mut self, record: SeqRecord) {
        self.seq_keys.insert(record.seq.clone(), record.id);
        self.seqs.insert(record.id, record);
    }

    fn take_seq(&mut self, id: SeqId) -> Option<SeqRecord> {
        let record = self.seqs.remove(&id)?;
        self.seq_keys.remove(&record.seq);
        self.seq_indexes.remove(&id);
        Some(record)
    }

    /// Insert an index row and count it on its sequence
    pub(super) fn put_index(&mut self, index: Index) {
        if let Some(record) = self.seqs.get_mut(&index.seq) {
            record.count += 1;
        }
        self.doc_indexes.entry(index.document).or_default().insert(index.id);
        self.seq_indexes.entry(index.seq).or_default().insert(index.id);
        self.indexes.insert(index.id, index);
    }

    fn take_index(&mut self, id: IndexId) -> Option<Index> {
        let index = self.indexes.remove(&id)?;
        if let Some(record) = self.seqs.get_mut(&index.seq) {
            record.count = record.count.saturating_sub(1);
        }
        if let Some(ids) = self.doc_indexes.get_mut(&index.document) {
            ids.remove(&id);
            if ids.is_empty() {
                self.doc_indexes.remove(&index.document);
            }
        }
        if let Some(ids) = self.seq_indexes.get_mut(&index.seq) {
            ids.remove(&id);
            if ids.is_empty() {
                self.seq_indexes.remove(&index.seq);
            }
        }
        Some(index)
    }

    /// Verify that every count matches its index rows and nothing dangles.
    pub(super) fn check(&self) -> Result<(), StoreError> {
        for (id, record) in &self.seqs {
            let rows = self.seq_indexes.get(id).map_or(0, BTreeSet::len) as u64;
            if record.count != rows {
                return Err(StoreError::Integrity(format!(
                    "{} {} has count {} but {} index rows",
                    id, record.seq, record.count, rows
                )));
            }
            if rows == 0 {
                return Err(StoreError::Integrity(format!("{} {} has no index rows", id, record.seq)));
            }
            if self.seq_keys.get(&record.seq) != Some(id) {
                return Err(StoreError::Integrity(format!("{} {} is not uniquely keyed", id, record.seq)));
            }
        }
        if self.seq_keys.len() != self.seqs.len() {
            return Err(StoreError::Integrity("sequence key table out of step".into()));
        }
        for index in self.indexes.values() {
            if !self.documents.contains_key(&index.document) {
                return Err(StoreError::Integrity(format!("{} points at missing {}", index.id, index.document)));
            }
            if !self.seqs.contains_key(&index.seq) {
                return Err(StoreError::Integrity(format!("{} points at missing {}", index.id, index.seq)));
            }
            let listed = self
                .doc_indexes
                .get(&index.document)
                .is_some_and(|ids| ids.contains(&index.id));
            if !listed {
                return Err(StoreError::Integrity(format!("{} missing from its document list", index.id)));
            }
        }
        Ok(())
    }

    fn record_pairs(&self, ids: Option<&BTreeSet<IndexId>>) -> Vec<(Index, SeqRecord)> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| {
                let index = self.indexes.get(id)?;
                let record = self.seqs.get(&index.seq)?;
                Some((index.clone(), record.clone()))
            })
            .collect()
    }
}

impl Reader for Tables {
    fn document(&self, id: DocumentId) -> Option<Document> {
        self.documents.get(&id).cloned()
    }

    fn document_ids(&self) -> Vec<DocumentId> {
        self.documents.keys().copied().collect()
    }

    fn seq(&self, id: SeqId) -> Option<SeqRecord> {
        self.seqs.get(&id).cloned()
    }

    fn find(&self, seq: &Seq) -> Option<SeqRecord> {
        self.seq_keys.get(seq).and_then(|id| self.seqs.get(id)).cloned()
    }

    fn matching(&self, kind: SeqKind, texts: &[&str]) -> Vec<SeqRecord> {
        let mut seen = BTreeSet::new();
        texts
            .iter()
            .filter_map(|text| self.seq_keys.get(&Seq::from_clean(kind, *text)))
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.seqs.get(id).cloned())
            .collect()
    }

    fn seqs(&self) -> Vec<SeqRecord> {
        self.seqs.values().cloned().collect()
    }

    fn indexes(&self, document: DocumentId) -> Vec<(Index, SeqRecord)> {
        self.record_pairs(self.doc_indexes.get(&document))
    }

    fn occurrences(&self, seq: SeqId) -> Vec<Index> {
        self.seq_indexes
            .get(&seq)
            .into_iter()
            .flatten()
            .filter_map(|id| self.indexes.get(id).cloned())
            .collect()
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            documents: self.documents.len(),
            seqs: self.seqs.len(),
            indexes: self.indexes.len(),
            generation: self.generation,
        }
    }
}

/// Inverse of one write, replayed on rollback
#[derive(Debug)]
enum Undo {
    AddedDocument(DocumentId),
    ReplacedDocument(Document),
    RemovedDocument(Document),
    AddedSeq(SeqId),
    RemovedSeq(SeqRecord),
    AddedIndex(IndexId),
    RemovedIndex(Index),
}

/// An open transaction: writes go straight to the tables and are journaled.
pub(crate) struct Tx<'t> {
    tables: &'t mut Tables,
    journal: Vec<Undo>,
    /// sequences whose count changed; checked at commit
    touched: BTreeSet<SeqId>,
    begun_at: NextIds,
    /// cleared by commit or rollback; an open transaction is undone on drop
    open: bool,
}

impl<'t> Tx<'t> {
    fn begin(tables: &'t mut Tables) -> Self {
        let begun_at = tables.next;
        Tx { tables, journal: Vec::new(), touched: BTreeSet::new(), begun_at, open: true }
    }

    fn commit(mut self) -> Result<usize, StoreError> {
        let orphan = self
            .touched
            .iter()
            .filter_map(|id| self.tables.seqs.get(id))
            .find(|record| record.count == 0)
            .map(|record| format!("{} {} would be left without index rows", record.id, record.seq));
        if let Some(reason) = orphan {
            self.rollback();
            return Err(StoreError::Integrity(reason));
        }
        let writes = self.journal.len();
        if writes > 0 {
            self.tables.generation += 1;
        }
        self.open = false;
        Ok(writes)
    }

    fn rollback(&mut self) -> usize {
        let undone = self.journal.len();
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::AddedDocument(id) => {
                    self.tables.take_document(id);
                }
                Undo::ReplacedDocument(doc) | Undo::RemovedDocument(doc) => {
                    self.tables.put_document(doc);
                }
                Undo::AddedSeq(id) => {
                    self.tables.take_seq(id);
                }
                Undo::RemovedSeq(record) => self.tables.put_seq(record),
                Undo::AddedIndex(id) => {
                    self.tables.take_index(id);
                }
                Undo::RemovedIndex(index) => self.tables.put_index(index),
            }
        }
        self.tables.next = self.begun_at;
        self.open = false;
        undone
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        // reached without commit or rollback only when the closure unwound
        if self.open {
            let undone = self.rollback();
            warn!(undone, "transaction unwound, rolled back");
        }
    }
}

impl Reader for Tx<'_> {
    fn document(&self, id: DocumentId) -> Option<Document> {
        self.tables.document(id)
    }

    fn document_ids(&self) -> Vec<DocumentId> {
        self.tables.document_ids()
    }

    fn seq(&self, id: SeqId) -> Option<SeqRecord> {
        self.tables.seq(id)
    }

    fn find(&self, seq: &Seq) -> Option<SeqRecord> {
        self.tables.find(seq)
    }

    fn matching(&self, kind: SeqKind, texts: &[&str]) -> Vec<SeqRecord> {
        self.tables.matching(kind, texts)
    }

    fn seqs(&self) -> Vec<SeqRecord> {
        self.tables.seqs()
    }

    fn indexes(&self, document: DocumentId) -> Vec<(Index, SeqRecord)> {
        self.tables.indexes(document)
    }

    fn occurrences(&self, seq: SeqId) -> Vec<Index> {
        self.tables.occurrences(seq)
    }

    fn stats(&self) -> StoreStats {
        self.tables.stats()
    }
}

impl Writer for Tx<'_> {
    fn add_document(&mut self, text: String, meta: DocumentMeta) -> Result<DocumentId, StoreError> {
        let id = DocumentId(self.tables.next.document);
        self.tables.next.document += 1;
        self.tables.put_document(Document { id, text, meta });
        self.journal.push(Undo::AddedDocument(id));
        Ok(id)
    }

    fn update_document(&mut self, document: Document) -> Result<(), StoreError> {
        if !self.tables.documents.contains_key(&document.id) {
            return Err(StoreError::missing_document(document.id));
        }
        if let Some(old) = self.tables.put_document(document) {
            self.journal.push(Undo::ReplacedDocument(old));
        }
        Ok(())
    }

    fn remove_document(&mut self, id: DocumentId) -> Result<(), StoreError> {
        if !self.tables.documents.contains_key(&id) {
            return Err(StoreError::missing_document(id));
        }
        let rows: Vec<IndexId> = self.tables.doc_indexes.get(&id).into_iter().flatten().copied().collect();
        let mut referenced = BTreeSet::new();
        for row in rows {
            referenced.insert(self.remove_index(row)?.seq);
        }
        for seq in referenced {
            if self.tables.seqs.get(&seq).is_some_and(|r| r.count == 0) {
                self.remove_seq(seq)?;
            }
        }
        if let Some(doc) = self.tables.take_document(id) {
            self.journal.push(Undo::RemovedDocument(doc));
        }
        Ok(())
    }

    fn add_seq(&mut self, seq: Seq) -> Result<SeqId, StoreError> {
        if seq.is_empty() {
            return Err(StoreError::Integrity("empty sequence".into()));
        }
        if let Some(existing) = self.tables.seq_keys.get(&seq) {
            return Err(StoreError::Integrity(format!("{seq} is already stored as {existing}")));
        }
        let id = SeqId(self.tables.next.seq);
        self.tables.next.seq += 1;
        self.tables.put_seq(SeqRecord { id, seq, count: 0 });
        self.journal.push(Undo::AddedSeq(id));
        self.touched.insert(id);
        Ok(id)
    }

    fn remove_seq(&mut self, id: SeqId) -> Result<(), StoreError> {
        let record = self.tables.seqs.get(&id).ok_or_else(|| StoreError::missing_seq(id))?;
        if record.count > 0 {
            return Err(StoreError::Integrity(format!(
                "{} {} is still referenced by {} index rows",
                id, record.seq, record.count
            )));
        }
        if let Some(record) = self.tables.take_seq(id) {
            self.journal.push(Undo::RemovedSeq(record));
        }
        self.touched.remove(&id);
        Ok(())
    }

    fn add_index(&mut self, index: NewIndex) -> Result<IndexId, StoreError> {
        if !self.tables.documents.contains_key(&index.document) {
            return Err(StoreError::missing_document(index.document));
        }
        if !self.tables.seqs.contains_key(&index.seq) {
            return Err(StoreError::missing_seq(index.seq));
        }
        let id = IndexId(self.tables.next.index);
        self.tables.next.index += 1;
        self.touched.insert(index.seq);
        self.tables.put_index(index.with_id(id));
        self.journal.push(Undo::AddedIndex(id));
        Ok(id)
    }

    fn remove_index(&mut self, id: IndexId) -> Result<Index, StoreError> {
        let index = self.tables.take_index(id).ok_or_else(|| StoreError::missing_index(id))?;
        self.touched.insert(index.seq);
        self.journal.push(Undo::RemovedIndex(index.clone()));
        Ok(index)
    }
}

/// MemoryStore
/// In-memory implementation of [`Store`].
///
/// One `RwLock` guards all tables: transactions hold the write guard for
/// their whole run, so writers are serialized and readers never observe a
/// half-applied merge. Every write is journaled and undone if the
/// transaction fails.
///
/// The store can be turned into a serializable [`StoreSnapshot`] and back.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self { tables: RwLock::new(self.tables.read().clone()) }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn from_tables(tables: Tables) -> Self {
        Self { tables: RwLock::new(tables) }
    }

    pub fn stats(&self) -> StoreStats {
        self.tables.read().stats()
    }

    /// Verify that every sequence count equals its number of index rows,
    /// that no sequence is left at zero, and that no row dangles.
    pub fn check_consistency(&self) -> Result<(), StoreError> {
        self.tables.read().check()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot::of(&self.tables.read())
    }

    /// CBOR encoding of a snapshot
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        Ok(serde_cbor::to_vec(&self.snapshot())?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let snapshot: StoreSnapshot = serde_cbor::from_slice(bytes)?;
        snapshot.into_store()
    }
}

impl Store for MemoryStore {
    fn read<T>(&self, f: impl FnOnce(&dyn Reader) -> T) -> T {
        let tables = self.tables.read();
        f(&*tables)
    }

    fn transaction<T, E>(&self, f: impl FnOnce(&mut dyn Writer) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut tables = self.tables.write();
        let mut tx = Tx::begin(&mut *tables);
        match f(&mut tx) {
            Ok(value) => match tx.commit() {
                Ok(writes) => {
                    debug!(writes, "transaction committed");
                    Ok(value)
                }
                Err(err) => {
                    warn!(error = %err, "commit check failed, transaction rolled back");
                    Err(err.into())
                }
            },
            Err(err) => {
                let undone = tx.rollback();
                debug!(undone, "transaction rolled back");
                Err(err)
            }
        }
    }
}

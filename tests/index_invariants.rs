use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use seqdex::{
    config::IndexerConfig,
    entity::{Document, DocumentId, DocumentMeta, Index, IndexId, NewIndex, Seq, SeqId, SeqKind, SeqRecord},
    error::{IndexError, StoreError},
    store::{MemoryStore, Reader, Store, StoreStats, Writer},
    text::{clean, Stemmer},
    Indexer,
};

const CORPUS: &[&str] = &[
    "It was the best of times, it was the worst of times.",
    "It was the age of wisdom, it was the age of foolishness.",
    "The best laid plans of mice and men often go awry.",
];

fn census(store: &MemoryStore) -> Vec<(SeqKind, String, u64)> {
    let mut out: Vec<_> = store
        .read(|r| r.seqs())
        .into_iter()
        .map(|r| (r.seq.kind(), r.seq.text().to_string(), r.count))
        .collect();
    out.sort();
    out
}

fn store_documents(store: &MemoryStore, texts: &[&str]) -> Vec<DocumentId> {
    store
        .transaction(|tx| {
            texts
                .iter()
                .map(|t| tx.add_document(t.to_string(), DocumentMeta::default()))
                .collect::<Result<Vec<_>, StoreError>>()
        })
        .unwrap()
}

#[test]
fn add_then_remove_restores_the_store() {
    let store = MemoryStore::new();
    let docs = store_documents(&store, CORPUS);
    let indexer = Indexer::new(&store, IndexerConfig::default()).unwrap();
    indexer.add(docs[0]).unwrap();
    indexer.add(docs[2]).unwrap();
    let before = (census(&store), store.stats().indexes);

    indexer.add(docs[1]).unwrap();
    store.check_consistency().unwrap();
    indexer.remove(docs[1]).unwrap();

    assert_eq!((census(&store), store.stats().indexes), before);
    store.check_consistency().unwrap();
}

#[test]
fn counts_match_rows_after_every_operation() {
    let store = MemoryStore::new();
    let docs = store_documents(&store, CORPUS);
    let indexer = Indexer::new(&store, IndexerConfig { max_gram_length: 4, ..Default::default() }).unwrap();
    indexer.add_many(&docs).unwrap();
    store.check_consistency().unwrap();
    for record in store.read(|r| r.seqs()) {
        assert_eq!(record.count as usize, store.read(|r| r.occurrences(record.id)).len());
    }
    indexer.update(docs[0]).unwrap();
    store.check_consistency().unwrap();
    indexer.remove(docs[2]).unwrap();
    store.check_consistency().unwrap();
    indexer.remove(docs[0]).unwrap();
    indexer.remove(docs[1]).unwrap();
    assert_eq!(store.stats(), StoreStats { documents: 3, seqs: 0, indexes: 0, ..store.stats() });
}

#[test]
fn shared_word_count_halves_and_unique_word_vanishes() {
    let store = MemoryStore::new();
    let docs = store_documents(&store, &["alpha common", "common omega"]);
    let indexer = Indexer::new(&store, IndexerConfig::default()).unwrap();
    indexer.add_many(&docs).unwrap();
    assert_eq!(store.read(|r| r.word("common")).unwrap().count, 2);

    indexer.remove(docs[0]).unwrap();
    assert!(store.read(|r| r.word("alpha")).is_none());
    assert!(store.read(|r| r.gram(&["alpha", "common"])).is_none());
    assert_eq!(store.read(|r| r.word("common")).unwrap().count, 1);
}

#[test]
fn update_twice_equals_add_once() {
    let once = MemoryStore::new();
    let docs = store_documents(&once, CORPUS);
    Indexer::new(&once, IndexerConfig::default()).unwrap().add_many(&docs).unwrap();

    let twice = MemoryStore::new();
    let docs = store_documents(&twice, CORPUS);
    let indexer = Indexer::new(&twice, IndexerConfig::default()).unwrap();
    indexer.add_many(&docs).unwrap();
    for doc in &docs {
        indexer.update(*doc).unwrap();
        indexer.update(*doc).unwrap();
    }
    assert_eq!(census(&twice), census(&once));
    assert_eq!(twice.stats().indexes, once.stats().indexes);
}

#[test]
fn duplicate_insert_outside_the_indexer_is_an_integrity_error() {
    let store = MemoryStore::new();
    let docs = store_documents(&store, CORPUS);
    Indexer::new(&store, IndexerConfig::default()).unwrap().add(docs[0]).unwrap();
    let err = store.transaction(|tx| tx.add_seq(Seq::word("times"))).unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));
    assert!(err.is_retryable());
}

/// Writer that fails once a number of index rows have been written
struct FailAfter<'a> {
    inner: &'a mut dyn Writer,
    budget: &'a AtomicUsize,
}

impl Reader for FailAfter<'_> {
    fn document(&self, id: DocumentId) -> Option<Document> {
        self.inner.document(id)
    }
    fn document_ids(&self) -> Vec<DocumentId> {
        self.inner.document_ids()
    }
    fn seq(&self, id: SeqId) -> Option<SeqRecord> {
        self.inner.seq(id)
    }
    fn find(&self, seq: &Seq) -> Option<SeqRecord> {
        self.inner.find(seq)
    }
    fn matching(&self, kind: SeqKind, texts: &[&str]) -> Vec<SeqRecord> {
        self.inner.matching(kind, texts)
    }
    fn seqs(&self) -> Vec<SeqRecord> {
        self.inner.seqs()
    }
    fn indexes(&self, document: DocumentId) -> Vec<(Index, SeqRecord)> {
        self.inner.indexes(document)
    }
    fn occurrences(&self, seq: SeqId) -> Vec<Index> {
        self.inner.occurrences(seq)
    }
    fn stats(&self) -> StoreStats {
        self.inner.stats()
    }
}

impl Writer for FailAfter<'_> {
    fn add_document(&mut self, text: String, meta: DocumentMeta) -> Result<DocumentId, StoreError> {
        self.inner.add_document(text, meta)
    }
    fn update_document(&mut self, document: Document) -> Result<(), StoreError> {
        self.inner.update_document(document)
    }
    fn remove_document(&mut self, id: DocumentId) -> Result<(), StoreError> {
        self.inner.remove_document(id)
    }
    fn add_seq(&mut self, seq: Seq) -> Result<SeqId, StoreError> {
        self.inner.add_seq(seq)
    }
    fn remove_seq(&mut self, id: SeqId) -> Result<(), StoreError> {
        self.inner.remove_seq(id)
    }
    fn add_index(&mut self, index: NewIndex) -> Result<IndexId, StoreError> {
        match self.budget.load(Ordering::SeqCst) {
            0 => Err(StoreError::Storage("disk full".into())),
            n => {
                self.budget.store(n - 1, Ordering::SeqCst);
                self.inner.add_index(index)
            }
        }
    }
    fn remove_index(&mut self, id: IndexId) -> Result<Index, StoreError> {
        self.inner.remove_index(id)
    }
}

struct FlakyStore {
    inner: MemoryStore,
    budget: AtomicUsize,
}

impl Store for FlakyStore {
    fn read<T>(&self, f: impl FnOnce(&dyn Reader) -> T) -> T {
        self.inner.read(f)
    }

    fn transaction<T, E>(&self, f: impl FnOnce(&mut dyn Writer) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.inner.transaction(|tx| f(&mut FailAfter { inner: tx, budget: &self.budget }))
    }
}

#[test]
fn failure_mid_merge_leaves_the_store_unchanged() {
    let store = FlakyStore { inner: MemoryStore::new(), budget: AtomicUsize::new(usize::MAX) };
    let docs = store_documents(&store.inner, CORPUS);
    let indexer = Indexer::new(&store, IndexerConfig::default()).unwrap();
    indexer.add(docs[0]).unwrap();
    let before = store.inner.snapshot();

    store.budget.store(7, Ordering::SeqCst);
    let err = indexer.add(docs[1]).unwrap_err();
    assert!(matches!(err, IndexError::Store(StoreError::Storage(_))));
    assert_eq!(store.inner.snapshot(), before);
    store.inner.check_consistency().unwrap();

    store.budget.store(usize::MAX, Ordering::SeqCst);
    indexer.add(docs[1]).unwrap();
    store.inner.check_consistency().unwrap();
}

/// Stemmer that panics once armed
#[derive(Debug, Default)]
struct Tripwire {
    armed: AtomicBool,
}

impl Stemmer for Tripwire {
    fn clean(&self, text: &str) -> String {
        if self.armed.load(Ordering::SeqCst) {
            panic!("stemmer failed on {text:?}");
        }
        clean(text)
    }
}

#[test]
fn panic_mid_update_leaves_the_store_unchanged() {
    let store = MemoryStore::new();
    let docs = store_documents(&store, CORPUS);
    let tripwire = Arc::new(Tripwire::default());
    let indexer = Indexer::new(&store, IndexerConfig::default())
        .unwrap()
        .with_stemmer(tripwire.clone());
    indexer.add_many(&docs).unwrap();
    let before = store.snapshot();

    tripwire.armed.store(true, Ordering::SeqCst);
    assert!(panic::catch_unwind(AssertUnwindSafe(|| indexer.update(docs[1]))).is_err());
    assert_eq!(store.snapshot(), before);
    store.check_consistency().unwrap();

    tripwire.armed.store(false, Ordering::SeqCst);
    indexer.update(docs[1]).unwrap();
    store.check_consistency().unwrap();
    assert_eq!(store.stats().seqs, before.seqs.len());
    assert_eq!(store.stats().indexes, before.indexes.len());
}

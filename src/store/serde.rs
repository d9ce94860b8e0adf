use serde::{Deserialize, Serialize};

use crate::{
    entity::{Document, Index, SeqId, SeqRecord},
    error::StoreError,
    store::memory::{MemoryStore, NextIds, Tables},
};

/// Serializable image of a [`MemoryStore`].
/// Only the primary rows are kept; key tables and counts are rebuilt
/// and checked by `into_store`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub documents: Vec<Document>,
    pub seqs: Vec<SeqRecord>,
    pub indexes: Vec<Index>,
    pub next: NextIds,
    pub generation: u64,
}

impl StoreSnapshot {
    pub(super) fn of(tables: &Tables) -> Self {
        Self {
            documents: tables.documents.values().cloned().collect(),
            seqs: tables.seqs.values().cloned().collect(),
            indexes: tables.indexes.values().cloned().collect(),
            next: tables.next,
            generation: tables.generation,
        }
    }

    /// Rebuild a store. Recorded counts must match the index rows.
    pub fn into_store(self) -> Result<MemoryStore, StoreError> {
        let mut tables = Tables {
            next: self.next,
            generation: self.generation,
            ..Tables::default()
        };
        for doc in self.documents {
            tables.documents.insert(doc.id, doc);
        }
        let recorded: Vec<(SeqId, u64)> = self.seqs.iter().map(|r| (r.id, r.count)).collect();
        for mut record in self.seqs {
            if tables.seq_keys.contains_key(&record.seq) {
                return Err(StoreError::Integrity(format!("{} appears twice in snapshot", record.seq)));
            }
            record.count = 0;
            tables.put_seq(record);
        }
        for index in self.indexes {
            tables.put_index(index);
        }
        for (id, count) in recorded {
            let rebuilt = tables.seqs.get(&id).map_or(0, |r| r.count);
            if rebuilt != count {
                return Err(StoreError::Integrity(format!(
                    "{id} recorded count {count} but snapshot has {rebuilt} index rows"
                )));
            }
        }
        tables.check()?;
        Ok(MemoryStore::from_tables(tables))
    }
}

//! Atomic, single-writer transactions over every tree of the storage.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::MutexGuard;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::Transactional;
use tracing::debug;

use super::history::HistoryRecord;
use super::physical::{SequenceState, TableState};
use super::storage::Storage;
use crate::error::Error;
use crate::meta::{MetaDescription, MetaLookup};

/// Key prefix of tables in the physical tree.
const TABLE_KEY_PREFIX: &str = "table:";

/// Key prefix of sequences in the physical tree.
const SEQUENCE_KEY_PREFIX: &str = "seq:";

type Writes = Vec<(Vec<u8>, Option<Vec<u8>>)>;

/// A transaction over descriptions, history and the physical catalog.
///
/// Writes are buffered in a write cache that reads consult first, and are
/// committed atomically across all trees. Dropping a transaction without
/// committing discards it.
pub struct Transaction<'a> {
    storage: &'a Storage,
    _writer: MutexGuard<'a, ()>,
    /// Uncommitted descriptions by type name, `None` for removals.
    metas: BTreeMap<String, Option<MetaDescription>>,
    /// Uncommitted tables by name.
    tables: BTreeMap<String, Option<TableState>>,
    /// Uncommitted sequences by name.
    sequences: BTreeMap<String, Option<SequenceState>>,
    /// Uncommitted history records by migration id.
    history: BTreeMap<String, Option<HistoryRecord>>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(storage: &'a Storage, writer: MutexGuard<'a, ()>) -> Self {
        Self {
            storage,
            _writer: writer,
            metas: BTreeMap::new(),
            tables: BTreeMap::new(),
            sequences: BTreeMap::new(),
            history: BTreeMap::new(),
        }
    }

    /// Number of buffered writes.
    pub fn pending(&self) -> usize {
        self.metas.len() + self.tables.len() + self.sequences.len() + self.history.len()
    }

    // ========== Descriptions ==========

    /// Every stored description, ordered by name.
    pub fn list_metas(&self) -> Result<Vec<MetaDescription>, Error> {
        let mut metas = BTreeMap::new();
        for item in self.storage.metas_tree().iter() {
            let (key, value) = item?;
            let name = String::from_utf8_lossy(&key).into_owned();
            if self.metas.contains_key(&name) {
                continue;
            }
            metas.insert(name, serde_json::from_slice::<MetaDescription>(&value)?);
        }
        for (name, meta) in &self.metas {
            if let Some(meta) = meta {
                metas.insert(name.clone(), meta.clone());
            }
        }
        Ok(metas.into_values().collect())
    }

    /// A description by type name.
    pub fn get_meta(&self, name: &str) -> Result<Option<MetaDescription>, Error> {
        if let Some(cached) = self.metas.get(name) {
            return Ok(cached.clone());
        }
        match self.storage.metas_tree().get(name.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store a new description.
    pub fn create_meta(&mut self, meta: MetaDescription) -> Result<(), Error> {
        if self.get_meta(&meta.name)?.is_some() {
            return Err(Error::AlreadyExists(meta.name));
        }
        self.metas.insert(meta.name.clone(), Some(meta));
        Ok(())
    }

    /// Replace the description stored as `name`. A different name in
    /// `meta` renames the type.
    pub fn update_meta(&mut self, name: &str, meta: MetaDescription) -> Result<(), Error> {
        if self.get_meta(name)?.is_none() {
            return Err(Error::NotFound(name.to_string()));
        }
        if meta.name != name {
            if self.get_meta(&meta.name)?.is_some() {
                return Err(Error::AlreadyExists(meta.name));
            }
            self.metas.insert(name.to_string(), None);
        }
        self.metas.insert(meta.name.clone(), Some(meta));
        Ok(())
    }

    /// Remove a description.
    pub fn remove_meta(&mut self, name: &str) -> Result<(), Error> {
        if self.get_meta(name)?.is_none() {
            return Err(Error::NotFound(name.to_string()));
        }
        self.metas.insert(name.to_string(), None);
        Ok(())
    }

    // ========== History ==========

    /// Write a history record, assigning its order.
    pub fn insert_history(&mut self, mut record: HistoryRecord) -> Result<u64, Error> {
        if self.get_history(&record.id)?.is_some() {
            return Err(Error::AlreadyExists(record.id));
        }
        record.order = self.storage.next_order()?;
        let order = record.order;
        self.history.insert(record.id.clone(), Some(record));
        Ok(order)
    }

    /// Delete a history record.
    pub fn remove_history(&mut self, id: &str) -> Result<(), Error> {
        if self.get_history(id)?.is_none() {
            return Err(Error::NotFound(id.to_string()));
        }
        self.history.insert(id.to_string(), None);
        Ok(())
    }

    /// A history record by migration id.
    pub fn get_history(&self, id: &str) -> Result<Option<HistoryRecord>, Error> {
        if let Some(cached) = self.history.get(id) {
            return Ok(cached.clone());
        }
        self.committed_history(id)
    }

    /// Every history record, in application order.
    pub fn list_history(&self) -> Result<Vec<HistoryRecord>, Error> {
        let mut records = Vec::new();
        for item in self.storage.history_order_tree().iter() {
            let (_, id) = item?;
            let id = String::from_utf8_lossy(&id).into_owned();
            if self.history.contains_key(&id) {
                continue;
            }
            if let Some(record) = self.committed_history(&id)? {
                records.push(record);
            }
        }
        records.extend(self.history.values().flatten().cloned());
        records.sort_by_key(|r| r.order);
        Ok(records)
    }

    /// Delete every history record.
    pub fn drop_history(&mut self) -> Result<usize, Error> {
        let records = self.list_history()?;
        for record in &records {
            self.history.insert(record.id.clone(), None);
        }
        Ok(records.len())
    }

    fn committed_history(&self, id: &str) -> Result<Option<HistoryRecord>, Error> {
        match self.storage.history_tree().get(id.as_bytes())? {
            Some(bytes) => Ok(Some(HistoryRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    // ========== Physical catalog ==========

    pub(super) fn load_table(&self, name: &str) -> Result<Option<TableState>, Error> {
        if let Some(cached) = self.tables.get(name) {
            return Ok(cached.clone());
        }
        match self.storage.physical_tree().get(table_key(name))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(super) fn put_table(&mut self, name: &str, state: Option<TableState>) {
        self.tables.insert(name.to_string(), state);
    }

    /// Names of every table in the catalog.
    pub fn tables(&self) -> Result<Vec<String>, Error> {
        let mut names = BTreeSet::new();
        for item in self.storage.physical_tree().scan_prefix(TABLE_KEY_PREFIX) {
            let (key, _) = item?;
            names.insert(String::from_utf8_lossy(&key[TABLE_KEY_PREFIX.len()..]).into_owned());
        }
        for (name, state) in &self.tables {
            if state.is_some() {
                names.insert(name.clone());
            } else {
                names.remove(name);
            }
        }
        Ok(names.into_iter().collect())
    }

    pub(super) fn load_sequence(&self, name: &str) -> Result<Option<SequenceState>, Error> {
        if let Some(cached) = self.sequences.get(name) {
            return Ok(cached.clone());
        }
        match self.storage.physical_tree().get(sequence_key(name))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub(super) fn put_sequence(&mut self, name: &str, state: Option<SequenceState>) {
        self.sequences.insert(name.to_string(), state);
    }

    // ========== Commit ==========

    /// Commit every buffered write atomically.
    pub fn commit(self) -> Result<(), Error> {
        if self.pending() == 0 {
            return Ok(());
        }

        let mut meta_writes: Writes = Vec::with_capacity(self.metas.len());
        for (name, meta) in &self.metas {
            let value = match meta {
                Some(meta) => Some(serde_json::to_vec(meta)?),
                None => None,
            };
            meta_writes.push((name.as_bytes().to_vec(), value));
        }

        let mut physical_writes: Writes = Vec::with_capacity(self.tables.len() + self.sequences.len());
        for (name, state) in &self.tables {
            let value = match state {
                Some(state) => Some(serde_json::to_vec(state)?),
                None => None,
            };
            physical_writes.push((table_key(name), value));
        }
        for (name, state) in &self.sequences {
            let value = match state {
                Some(state) => Some(serde_json::to_vec(state)?),
                None => None,
            };
            physical_writes.push((sequence_key(name), value));
        }

        let mut history_writes: Writes = Vec::with_capacity(self.history.len());
        let mut order_writes: Writes = Vec::new();
        for (id, record) in &self.history {
            let committed = self.committed_history(id)?;
            match record {
                Some(record) => {
                    if let Some(old) = committed.filter(|old| old.order != record.order) {
                        order_writes.push((old.order.to_be_bytes().to_vec(), None));
                    }
                    history_writes.push((id.as_bytes().to_vec(), Some(record.to_bytes()?)));
                    order_writes.push((record.order.to_be_bytes().to_vec(), Some(id.as_bytes().to_vec())));
                }
                None => {
                    if let Some(old) = committed {
                        order_writes.push((old.order.to_be_bytes().to_vec(), None));
                    }
                    history_writes.push((id.as_bytes().to_vec(), None));
                }
            }
        }

        let result: Result<(), TransactionError<Error>> = (
            self.storage.metas_tree(),
            self.storage.history_tree(),
            self.storage.history_order_tree(),
            self.storage.physical_tree(),
        )
            .transaction(|(metas, history, order, physical)| {
                apply_writes(metas, &meta_writes)?;
                apply_writes(history, &history_writes)?;
                apply_writes(order, &order_writes)?;
                apply_writes(physical, &physical_writes)?;
                Ok(())
            });

        match result {
            Ok(()) => {
                debug!(
                    metas = meta_writes.len(),
                    history = history_writes.len(),
                    physical = physical_writes.len(),
                    "transaction committed"
                );
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(Error::Storage(e)),
        }
    }
}

impl MetaLookup for Transaction<'_> {
    fn lookup(&self, name: &str) -> Result<Option<MetaDescription>, Error> {
        self.get_meta(name)
    }
}

fn apply_writes(
    tree: &TransactionalTree,
    writes: &[(Vec<u8>, Option<Vec<u8>>)],
) -> Result<(), ConflictableTransactionError<Error>> {
    for (key, value) in writes {
        match value {
            Some(value) => {
                tree.insert(key.as_slice(), value.as_slice())?;
            }
            None => {
                tree.remove(key.as_slice())?;
            }
        }
    }
    Ok(())
}

fn table_key(name: &str) -> Vec<u8> {
    format!("{}{}", TABLE_KEY_PREFIX, name).into_bytes()
}

fn sequence_key(name: &str) -> Vec<u8> {
    format!("{}{}", SEQUENCE_KEY_PREFIX, name).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{DefaultValue, Field, FieldType};

    fn storage() -> Storage {
        Storage::with_db(sled::Config::new().temporary(true).open().unwrap()).unwrap()
    }

    fn meta(name: &str) -> MetaDescription {
        MetaDescription::new(name, "id")
            .with_field(Field::optional("id", FieldType::Number).with_default(DefaultValue::nextval()))
    }

    #[test]
    fn test_reads_see_own_writes() {
        let storage = storage();
        let mut tx = storage.begin();
        tx.create_meta(meta("a")).unwrap();
        assert!(tx.get_meta("a").unwrap().is_some());
        assert!(matches!(tx.create_meta(meta("a")), Err(Error::AlreadyExists(_))));
        tx.commit().unwrap();

        let tx = storage.begin();
        assert_eq!(tx.list_metas().unwrap().len(), 1);
    }

    #[test]
    fn test_drop_discards_writes() {
        let storage = storage();
        {
            let mut tx = storage.begin();
            tx.create_meta(meta("a")).unwrap();
        }
        let tx = storage.begin();
        assert!(tx.get_meta("a").unwrap().is_none());
    }

    #[test]
    fn test_update_renames() {
        let storage = storage();
        let mut tx = storage.begin();
        tx.create_meta(meta("a")).unwrap();
        tx.create_meta(meta("c")).unwrap();
        tx.commit().unwrap();

        let mut tx = storage.begin();
        assert!(matches!(tx.update_meta("a", meta("c")), Err(Error::AlreadyExists(_))));
        tx.update_meta("a", meta("b")).unwrap();
        let names: Vec<_> = tx.list_metas().unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert!(matches!(tx.remove_meta("a"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_history_order() {
        let storage = storage();
        let mut tx = storage.begin();
        for id in ["m1", "m2"] {
            let record = HistoryRecord::new(id, "a", "a", Vec::new(), "[]".to_string(), "{}".to_string(), "");
            tx.insert_history(record).unwrap();
        }
        tx.commit().unwrap();

        let mut tx = storage.begin();
        let record = HistoryRecord::new("m3", "a", "a", Vec::new(), "[]".to_string(), "{}".to_string(), "");
        tx.insert_history(record).unwrap();
        tx.remove_history("m1").unwrap();
        let ids: Vec<_> = tx.list_history().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["m2", "m3"]);
        tx.commit().unwrap();

        let mut tx = storage.begin();
        let ids: Vec<_> = tx.list_history().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["m2", "m3"]);
        assert_eq!(tx.drop_history().unwrap(), 2);
        tx.commit().unwrap();
        assert!(storage.begin().list_history().unwrap().is_empty());
    }
}

//! Object store: primary records plus their indexes.

use crate::error::{StorageError, StorageResult};
use crate::index::IndexStore;
use crate::pending::{PendingStore, PendingWrite};
use crate::range::KeyRange;
use crate::types::{Direction, IndexParams, ObjectStoreParams};
use lexidb_codec::{Key, Value};
use std::collections::BTreeMap;

/// One entry produced by a scan: the effective key (index key or primary
/// key), the primary key, and the record.
pub(crate) type ScanItem<'a> = (&'a Key, &'a Key, &'a Value);

/// Largest key the key generator hands out.
pub(crate) const MAX_GENERATED_KEY: i64 = 1 << 53;

/// A named object store.
///
/// Transactions never write to a committed store directly: their writes
/// are kept as [`PendingStore`]s and applied in one step on commit.
#[derive(Debug, Clone)]
pub(crate) struct ObjectStore {
    name: String,
    params: ObjectStoreParams,
    records: BTreeMap<Key, Value>,
    indexes: BTreeMap<String, IndexStore>,
    next_key: i64,
}

impl ObjectStore {
    pub(crate) fn new(name: impl Into<String>, params: ObjectStoreParams) -> Self {
        Self {
            name: name.into(),
            params,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
            next_key: 1,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn params(&self) -> &ObjectStoreParams {
        &self.params
    }

    pub(crate) fn next_key(&self) -> i64 {
        self.next_key
    }

    pub(crate) fn index_names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    pub(crate) fn index_params(&self, name: &str) -> Option<&IndexParams> {
        self.indexes.get(name).map(IndexStore::params)
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = &IndexStore> {
        self.indexes.values()
    }

    pub(crate) fn index(&self, name: &str) -> StorageResult<&IndexStore> {
        self.indexes
            .get(name)
            .ok_or_else(|| StorageError::index_not_found(&self.name, name))
    }

    /// Creates an index and fills it from the existing records.
    pub(crate) fn create_index(&mut self, name: &str, params: IndexParams) -> StorageResult<()> {
        if self.indexes.contains_key(name) {
            return Err(StorageError::IndexExists {
                store: self.name.clone(),
                index: name.to_string(),
            });
        }
        let mut index = IndexStore::new(name, params);
        for (primary_key, record) in &self.records {
            if let Some(key) = index.key_for(record) {
                index.check_unique(&self.name, &key, primary_key)?;
                index.insert(key, primary_key.clone());
            }
        }
        self.indexes.insert(name.to_string(), index);
        Ok(())
    }

    /// Resolves the primary key a record will be stored under.
    ///
    /// A missing or null primary key is taken from `next_key` when the store
    /// has a key generator, and written back into the record.
    ///
    /// # Errors
    ///
    /// - `Data` for non-map records, invalid keys and missing keys
    /// - `Constraint` once the generator has passed [`MAX_GENERATED_KEY`]
    pub(crate) fn assign_key(&self, record: &mut Value, next_key: i64) -> StorageResult<Key> {
        if record.as_map().is_none() {
            return Err(StorageError::data(format!(
                "records in {} must be maps, got {}",
                self.name,
                record.type_name()
            )));
        }

        let key_path = &self.params.key_path;
        match record.get_path(key_path) {
            Some(value) if !value.is_null() => Key::from_value(value).ok_or_else(|| {
                StorageError::data(format!(
                    "{} is not a valid key for {}.{key_path}",
                    value.type_name(),
                    self.name
                ))
            }),
            _ if self.params.auto_increment => {
                if next_key > MAX_GENERATED_KEY {
                    return Err(StorageError::constraint(
                        &self.name,
                        "key generator is exhausted",
                    ));
                }
                let key = Key::from(next_key);
                if !record.set_path(key_path, key.to_value()) {
                    return Err(StorageError::data(format!(
                        "cannot inject generated key at {}.{key_path}",
                        self.name
                    )));
                }
                Ok(key)
            }
            _ => Err(StorageError::data(format!(
                "record in {} has no key at {key_path}",
                self.name
            ))),
        }
    }

    /// Returns the generator value after a record was stored under
    /// `primary_key`. Numeric keys at or above the current value push it
    /// past them, up to one beyond [`MAX_GENERATED_KEY`].
    pub(crate) fn advance_generator(&self, next_key: i64, primary_key: &Key) -> i64 {
        if !self.params.auto_increment {
            return next_key;
        }
        match primary_key {
            Key::Number(n) if n.floor() >= next_key as f64 => {
                if n.floor() >= MAX_GENERATED_KEY as f64 {
                    MAX_GENERATED_KEY + 1
                } else {
                    n.floor() as i64 + 1
                }
            }
            _ => next_key,
        }
    }

    /// Installs the writes of a committed transaction.
    ///
    /// Every touched key is removed before any record is written back, so
    /// records that swapped unique keys within the transaction never collide.
    pub(crate) fn apply(&mut self, pending: PendingStore) {
        let (cleared, writes, next_key) = pending.into_parts();
        if cleared {
            self.clear();
        }
        for primary_key in writes.keys() {
            self.delete(primary_key);
        }
        for (primary_key, write) in writes {
            if let PendingWrite::Put(record) = write {
                self.install(primary_key, record);
            }
        }
        self.next_key = self.next_key.max(next_key);
    }

    /// Writes a record whose key and constraints were already checked.
    fn install(&mut self, primary_key: Key, record: Value) {
        self.unindex(&primary_key);
        for index in self.indexes.values_mut() {
            if let Some(key) = index.key_for(&record) {
                index.insert(key, primary_key.clone());
            }
        }
        self.next_key = self.advance_generator(self.next_key, &primary_key);
        self.records.insert(primary_key, record);
    }

    /// Removes a record. Returns whether it existed.
    pub(crate) fn delete(&mut self, primary_key: &Key) -> bool {
        self.unindex(primary_key);
        self.records.remove(primary_key).is_some()
    }

    pub(crate) fn get(&self, primary_key: &Key) -> Option<&Value> {
        self.records.get(primary_key)
    }

    /// Removes every record. The key generator is not reset.
    pub(crate) fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }

    /// Counts records, or index entries when `index` is given.
    pub(crate) fn count(&self, index: Option<&str>, range: Option<&KeyRange>) -> StorageResult<usize> {
        match index {
            Some(name) => Ok(self.index(name)?.count(range)),
            None => Ok(match range {
                None => self.records.len(),
                Some(r) if r.is_empty() => 0,
                Some(r) => self.records.range::<Key, _>(r.as_bounds()).count(),
            }),
        }
    }

    /// Lazily iterates records in key order, through an index when given.
    pub(crate) fn scan<'a>(
        &'a self,
        index: Option<&str>,
        range: Option<&'a KeyRange>,
        direction: Direction,
    ) -> StorageResult<Box<dyn Iterator<Item = ScanItem<'a>> + 'a>> {
        if let Some(name) = index {
            let index = self.index(name)?;
            let records = &self.records;
            return Ok(Box::new(index.scan(range, direction).filter_map(
                move |(key, primary_key)| records.get(primary_key).map(|v| (key, primary_key, v)),
            )));
        }

        let entries: Box<dyn Iterator<Item = (&'a Key, &'a Value)> + 'a> = match range {
            Some(r) if r.is_empty() => Box::new(std::iter::empty()),
            Some(r) => match direction {
                Direction::Next => Box::new(self.records.range::<Key, _>(r.as_bounds())),
                Direction::Prev => Box::new(self.records.range::<Key, _>(r.as_bounds()).rev()),
            },
            None => match direction {
                Direction::Next => Box::new(self.records.iter()),
                Direction::Prev => Box::new(self.records.iter().rev()),
            },
        };
        Ok(Box::new(entries.map(|(k, v)| (k, k, v))))
    }

    fn unindex(&mut self, primary_key: &Key) {
        let Some(old) = self.records.get(primary_key) else {
            return;
        };
        for index in self.indexes.values_mut() {
            if let Some(key) = index.key_for(old) {
                index.remove(&key, primary_key);
            }
        }
    }
}

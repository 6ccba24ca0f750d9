//! BTree index over record fields.

use crate::error::{StorageError, StorageResult};
use crate::range::KeyRange;
use crate::types::{Direction, IndexParams};
use lexidb_codec::{Key, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Ordered mapping from an indexed field's key to the primary keys of the
/// records carrying it.
///
/// Records whose indexed field is missing or is not a valid key are not
/// present in the index.
#[derive(Debug, Clone)]
pub(crate) struct IndexStore {
    name: String,
    params: IndexParams,
    entries: BTreeMap<Key, BTreeSet<Key>>,
    count: usize,
}

impl IndexStore {
    pub(crate) fn new(name: impl Into<String>, params: IndexParams) -> Self {
        Self {
            name: name.into(),
            params,
            entries: BTreeMap::new(),
            count: 0,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn params(&self) -> &IndexParams {
        &self.params
    }

    /// Extracts this index's key from a record.
    pub(crate) fn key_for(&self, record: &Value) -> Option<Key> {
        record.get_path(&self.params.key_path).and_then(Key::from_value)
    }

    /// Fails if inserting `key` for `primary_key` would break uniqueness.
    pub(crate) fn check_unique(&self, store: &str, key: &Key, primary_key: &Key) -> StorageResult<()> {
        if !self.params.unique {
            return Ok(());
        }
        match self.entries.get(key) {
            Some(existing) if !existing.contains(primary_key) && !existing.is_empty() => {
                Err(StorageError::constraint(
                    store,
                    format!("unique index {} already contains key {key}", self.name),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Primary keys of the records carrying `key`.
    pub(crate) fn primary_keys<'a>(&'a self, key: &Key) -> impl Iterator<Item = &'a Key> + 'a {
        self.entries.get(key).into_iter().flatten()
    }

    pub(crate) fn insert(&mut self, key: Key, primary_key: Key) {
        if self.entries.entry(key).or_default().insert(primary_key) {
            self.count += 1;
        }
    }

    pub(crate) fn remove(&mut self, key: &Key, primary_key: &Key) -> bool {
        if let Some(set) = self.entries.get_mut(key) {
            if set.remove(primary_key) {
                self.count -= 1;
                if set.is_empty() {
                    self.entries.remove(key);
                }
                return true;
            }
        }
        false
    }

    /// Iterates `(index key, primary key)` pairs inside `range`.
    ///
    /// Descending iteration reverses both the index keys and the primary
    /// keys that share an index key.
    pub(crate) fn scan<'a>(
        &'a self,
        range: Option<&'a KeyRange>,
        direction: Direction,
    ) -> Box<dyn Iterator<Item = (&'a Key, &'a Key)> + 'a> {
        let groups: Box<dyn Iterator<Item = (&'a Key, &'a BTreeSet<Key>)> + 'a> = match range {
            Some(r) if r.is_empty() => return Box::new(std::iter::empty()),
            Some(r) => match direction {
                Direction::Next => Box::new(self.entries.range::<Key, _>(r.as_bounds())),
                Direction::Prev => Box::new(self.entries.range::<Key, _>(r.as_bounds()).rev()),
            },
            None => match direction {
                Direction::Next => Box::new(self.entries.iter()),
                Direction::Prev => Box::new(self.entries.iter().rev()),
            },
        };
        Box::new(groups.flat_map(move |(key, primary_keys)| {
            let inner: Box<dyn Iterator<Item = &'a Key> + 'a> = match direction {
                Direction::Next => Box::new(primary_keys.iter()),
                Direction::Prev => Box::new(primary_keys.iter().rev()),
            };
            inner.map(move |pk| (key, pk))
        }))
    }

    /// Counts entries inside `range`.
    pub(crate) fn count(&self, range: Option<&KeyRange>) -> usize {
        match range {
            None => self.len(),
            Some(r) if r.is_empty() => 0,
            Some(r) => self
                .entries
                .range::<Key, _>(r.as_bounds())
                .map(|(_, set)| set.len())
                .sum(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.count = 0;
    }
}

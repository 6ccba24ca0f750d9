//! Pending writes of read-write transactions.

use crate::error::{StorageError, StorageResult};
use crate::index::IndexStore;
use crate::object_store::ObjectStore;
use crate::range::KeyRange;
use crate::transaction::CursorEntry;
use crate::types::Direction;
use lexidb_codec::{Key, Value};
use std::collections::BTreeMap;
use std::iter::Peekable;

/// A write waiting for commit.
#[derive(Debug, Clone)]
pub(crate) enum PendingWrite {
    /// Insert or replace the record.
    Put(Value),
    /// Remove the record.
    Delete,
}

/// The writes one transaction made to one object store.
///
/// Costs grow with the number of writes, never with the size of the store.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingStore {
    cleared: bool,
    writes: BTreeMap<Key, PendingWrite>,
    /// Unique index name -> index key -> primary key, for pending puts.
    unique: BTreeMap<String, BTreeMap<Key, Key>>,
    next_key: i64,
}

impl PendingStore {
    pub(crate) fn new(base: &ObjectStore) -> Self {
        Self {
            next_key: base.next_key(),
            ..Self::default()
        }
    }

    /// Returns true if nothing was written.
    pub(crate) fn is_empty(&self) -> bool {
        !self.cleared && self.writes.is_empty()
    }

    /// Number of records written or deleted.
    pub(crate) fn write_count(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn into_parts(self) -> (bool, BTreeMap<Key, PendingWrite>, i64) {
        (self.cleared, self.writes, self.next_key)
    }

    /// Records an insert or replace, returning the record's primary key.
    ///
    /// # Errors
    ///
    /// Fails like a committed write would: `Data` for malformed records and
    /// `Constraint` for unique index violations or an exhausted generator.
    pub(crate) fn put(&mut self, base: &ObjectStore, mut record: Value) -> StorageResult<Key> {
        let primary_key = base.assign_key(&mut record, self.next_key)?;

        let mut unique_keys = Vec::new();
        for index in base.indexes().filter(|index| index.params().unique) {
            if let Some(key) = index.key_for(&record) {
                if self.holds_other(index, &key, &primary_key) {
                    return Err(StorageError::constraint(
                        base.name(),
                        format!("unique index {} already contains key {key}", index.name()),
                    ));
                }
                unique_keys.push((index.name().to_string(), key));
            }
        }

        self.forget(base, &primary_key);
        for (index, key) in unique_keys {
            self.unique
                .entry(index)
                .or_default()
                .insert(key, primary_key.clone());
        }
        self.next_key = base.advance_generator(self.next_key, &primary_key);
        self.writes
            .insert(primary_key.clone(), PendingWrite::Put(record));
        Ok(primary_key)
    }

    /// Records a delete. Returns whether the record existed.
    pub(crate) fn delete(&mut self, base: &ObjectStore, primary_key: &Key) -> bool {
        let existed = StoreView::new(base, Some(&*self)).get(primary_key).is_some();
        if existed {
            self.forget(base, primary_key);
            self.writes.insert(primary_key.clone(), PendingWrite::Delete);
        }
        existed
    }

    /// Records the removal of every record.
    pub(crate) fn clear(&mut self) {
        self.cleared = true;
        self.writes.clear();
        self.unique.clear();
    }

    /// Whether a record other than `primary_key` carries `key` in `index`,
    /// either committed and untouched or written by this transaction.
    fn holds_other(&self, index: &IndexStore, key: &Key, primary_key: &Key) -> bool {
        let pending = self
            .unique
            .get(index.name())
            .and_then(|keys| keys.get(key))
            .is_some_and(|owner| owner != primary_key);
        let committed = !self.cleared
            && index
                .primary_keys(key)
                .any(|owner| owner != primary_key && !self.writes.contains_key(owner));
        pending || committed
    }

    /// Drops the unique entries of an earlier pending put.
    fn forget(&mut self, base: &ObjectStore, primary_key: &Key) {
        let Some(PendingWrite::Put(old)) = self.writes.get(primary_key) else {
            return;
        };
        for index in base.indexes().filter(|index| index.params().unique) {
            if let (Some(key), Some(keys)) = (index.key_for(old), self.unique.get_mut(index.name())) {
                keys.remove(&key);
            }
        }
    }
}

/// An object store as one transaction sees it: its snapshot with its own
/// pending writes laid over.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StoreView<'a> {
    base: &'a ObjectStore,
    pending: Option<&'a PendingStore>,
}

impl<'a> StoreView<'a> {
    pub(crate) fn new(base: &'a ObjectStore, pending: Option<&'a PendingStore>) -> Self {
        Self {
            base,
            pending: pending.filter(|pending| !pending.is_empty()),
        }
    }

    pub(crate) fn get(&self, primary_key: &Key) -> Option<&'a Value> {
        let Some(pending) = self.pending else {
            return self.base.get(primary_key);
        };
        match pending.writes.get(primary_key) {
            Some(PendingWrite::Put(record)) => Some(record),
            Some(PendingWrite::Delete) => None,
            None if pending.cleared => None,
            None => self.base.get(primary_key),
        }
    }

    /// Counts records, or index entries when `index` is given.
    pub(crate) fn count(&self, index: Option<&str>, range: Option<&KeyRange>) -> StorageResult<usize> {
        let committed = self.base.count(index, range)?;
        let Some(pending) = self.pending else {
            return Ok(committed);
        };
        let index = index.map(|name| self.base.index(name)).transpose()?;

        let mut count = if pending.cleared { 0 } else { committed };
        for (primary_key, write) in &pending.writes {
            if !pending.cleared {
                if let Some(old) = self.base.get(primary_key) {
                    if entry_key(index, primary_key, old).is_some_and(|key| in_range(range, &key)) {
                        count = count.saturating_sub(1);
                    }
                }
            }
            if let PendingWrite::Put(record) = write {
                if entry_key(index, primary_key, record).is_some_and(|key| in_range(range, &key)) {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Iterates records in key order, through an index when given.
    ///
    /// Committed records are read lazily; only the pending writes inside the
    /// range are collected up front.
    pub(crate) fn scan(
        &self,
        index: Option<&str>,
        range: Option<&'a KeyRange>,
        direction: Direction,
    ) -> StorageResult<Box<dyn Iterator<Item = CursorEntry> + 'a>> {
        let committed = self.base.scan(index, range, direction)?;
        let Some(pending) = self.pending else {
            return Ok(Box::new(committed.map(CursorEntry::from_scan)));
        };
        let index = index.map(|name| self.base.index(name)).transpose()?;

        let committed: Box<dyn Iterator<Item = CursorEntry> + 'a> = if pending.cleared {
            Box::new(std::iter::empty())
        } else {
            Box::new(
                committed
                    .filter(move |(_, primary_key, _)| !pending.writes.contains_key(*primary_key))
                    .map(CursorEntry::from_scan),
            )
        };

        let mut written: Vec<CursorEntry> = pending
            .writes
            .iter()
            .filter_map(|(primary_key, write)| match write {
                PendingWrite::Put(record) => entry_key(index, primary_key, record)
                    .filter(|key| in_range(range, key))
                    .map(|key| CursorEntry {
                        key,
                        primary_key: primary_key.clone(),
                        value: record.clone(),
                    }),
                PendingWrite::Delete => None,
            })
            .collect();
        written.sort_by(|a, b| (&a.key, &a.primary_key).cmp(&(&b.key, &b.primary_key)));
        if direction == Direction::Prev {
            written.reverse();
        }

        Ok(Box::new(Merge {
            committed: committed.peekable(),
            written: written.into_iter().peekable(),
            direction,
        }))
    }
}

fn entry_key(index: Option<&IndexStore>, primary_key: &Key, record: &Value) -> Option<Key> {
    match index {
        Some(index) => index.key_for(record),
        None => Some(primary_key.clone()),
    }
}

fn in_range(range: Option<&KeyRange>, key: &Key) -> bool {
    range.map_or(true, |range| range.contains(key))
}

/// Merges committed and pending entries, both already in scan order.
struct Merge<'a> {
    committed: Peekable<Box<dyn Iterator<Item = CursorEntry> + 'a>>,
    written: Peekable<std::vec::IntoIter<CursorEntry>>,
    direction: Direction,
}

impl Iterator for Merge<'_> {
    type Item = CursorEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let take_written = match (self.committed.peek(), self.written.peek()) {
            (Some(committed), Some(written)) => {
                let order = (&written.key, &written.primary_key)
                    .cmp(&(&committed.key, &committed.primary_key));
                match self.direction {
                    Direction::Next => order.is_lt(),
                    Direction::Prev => order.is_gt(),
                }
            }
            (None, Some(_)) => true,
            _ => false,
        };
        if take_written {
            self.written.next()
        } else {
            self.committed.next()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IndexParams, ObjectStoreParams};

    fn words() -> ObjectStore {
        let mut store = ObjectStore::new("words", ObjectStoreParams::new("id").auto_increment(true));
        store
            .create_index("by_text", IndexParams::new("text").unique(true))
            .unwrap();
        store.create_index("by_level", IndexParams::new("level")).unwrap();
        store
    }

    fn word(text: &str, level: i64) -> Value {
        Value::from_pairs([("text", Value::from(text)), ("level", Value::from(level))])
    }

    fn keyed(id: i64, text: &str, level: i64) -> Value {
        let mut record = word(text, level);
        record.set_path("id", Value::from(id));
        record
    }

    fn committed(records: &[Value]) -> ObjectStore {
        let mut store = words();
        let mut pending = PendingStore::new(&store);
        for record in records {
            pending.put(&store, record.clone()).unwrap();
        }
        store.apply(pending);
        store
    }

    fn texts(entries: impl Iterator<Item = CursorEntry>) -> Vec<String> {
        entries
            .map(|entry| entry.value.get("text").and_then(Value::as_text).unwrap().to_string())
            .collect()
    }

    #[test]
    fn reads_see_pending_writes_over_the_snapshot() {
        let base = committed(&[word("apple", 1), word("banana", 2), word("cherry", 3)]);
        let mut pending = PendingStore::new(&base);
        pending.put(&base, keyed(2, "blueberry", 5)).unwrap();
        assert!(pending.delete(&base, &Key::from(3i64)));
        pending.put(&base, word("damson", 2)).unwrap();

        let view = StoreView::new(&base, Some(&pending));
        assert!(view.get(&Key::from(3i64)).is_none());
        assert_eq!(view.get(&Key::from(4i64)).and_then(|r| r.get("text")), Some(&Value::from("damson")));
        assert_eq!(view.count(None, None).unwrap(), 3);
        assert_eq!(view.count(Some("by_level"), Some(&KeyRange::only(Key::from(2i64)))).unwrap(), 1);

        let by_level = view.scan(Some("by_level"), None, Direction::Next).unwrap();
        assert_eq!(texts(by_level), vec!["apple", "damson", "blueberry"]);
        let backwards = view.scan(None, None, Direction::Prev).unwrap();
        assert_eq!(texts(backwards), vec!["damson", "blueberry", "apple"]);

        assert_eq!(base.count(None, None).unwrap(), 3);
        assert_eq!(base.get(&Key::from(2i64)).and_then(|r| r.get("text")), Some(&Value::from("banana")));
    }

    #[test]
    fn clear_hides_the_snapshot() {
        let base = committed(&[word("apple", 1), word("banana", 2)]);
        let mut pending = PendingStore::new(&base);
        pending.clear();
        pending.put(&base, word("cherry", 1)).unwrap();

        let view = StoreView::new(&base, Some(&pending));
        assert!(view.get(&Key::from(1i64)).is_none());
        assert_eq!(view.count(Some("by_level"), None).unwrap(), 1);
        assert_eq!(texts(view.scan(None, None, Direction::Next).unwrap()), vec!["cherry"]);
        assert!(!pending.delete(&base, &Key::from(2i64)));
    }

    #[test]
    fn unique_keys_see_committed_and_pending_records() {
        let base = committed(&[word("apple", 1)]);
        let mut pending = PendingStore::new(&base);

        let err = pending.put(&base, word("apple", 2)).unwrap_err();
        assert!(matches!(err, StorageError::Constraint { .. }));

        pending.put(&base, word("banana", 2)).unwrap();
        assert!(pending.put(&base, word("banana", 3)).is_err());

        // the committed owner gives up the key, so another record may take it
        pending.put(&base, keyed(1, "avocado", 1)).unwrap();
        assert_eq!(pending.put(&base, word("apple", 4)).unwrap(), Key::from(3i64));
    }

    #[test]
    fn swapped_unique_keys_apply_cleanly() {
        let mut base = committed(&[word("apple", 1), word("banana", 2)]);
        let mut pending = PendingStore::new(&base);
        pending.put(&base, keyed(1, "swap", 1)).unwrap();
        pending.put(&base, keyed(2, "apple", 2)).unwrap();
        pending.put(&base, keyed(1, "banana", 1)).unwrap();
        base.apply(pending);

        let apple = KeyRange::only(Key::from("apple"));
        let owner: Vec<_> = base
            .scan(Some("by_text"), Some(&apple), Direction::Next)
            .unwrap()
            .map(|(_, primary_key, _)| primary_key.clone())
            .collect();
        assert_eq!(owner, vec![Key::from(2i64)]);
        assert_eq!(base.count(Some("by_text"), None).unwrap(), 2);
    }

    #[test]
    fn generated_keys_continue_across_transactions() {
        let mut base = committed(&[word("apple", 1)]);
        let mut pending = PendingStore::new(&base);
        assert_eq!(pending.put(&base, word("banana", 1)).unwrap(), Key::from(2i64));
        assert_eq!(pending.put(&base, keyed(10, "cherry", 1)).unwrap(), Key::from(10i64));
        assert_eq!(pending.put(&base, word("damson", 1)).unwrap(), Key::from(11i64));
        assert_eq!(pending.write_count(), 3);
        base.apply(pending);
        assert_eq!(base.next_key(), 12);
    }
}

//! Host transactions and cursors.

use crate::error::{StorageError, StorageResult};
use crate::factory::{Catalog, SharedDatabase};
use crate::object_store::{ObjectStore, ScanItem};
use crate::pending::{PendingStore, StoreView};
use crate::range::KeyRange;
use crate::types::{Direction, TransactionId, TransactionMode};
use lexidb_codec::{Key, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// State of a host transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting operations.
    Active,
    /// Changes were installed.
    Committed,
    /// Changes were discarded.
    Aborted,
}

/// A transaction over a fixed set of object stores.
///
/// Reads see the snapshot taken when the transaction began plus the
/// transaction's own writes. Writes are kept aside per store and become
/// visible to others only on [`commit`](Self::commit), which applies them to
/// the committed stores in place unless a reader still holds a snapshot.
/// Dropping an active transaction aborts it.
#[derive(Debug)]
pub struct HostTransaction {
    id: TransactionId,
    mode: TransactionMode,
    state: TransactionState,
    db: Arc<SharedDatabase>,
    version: u32,
    stores: Catalog,
    pending: BTreeMap<String, PendingStore>,
    writer: Option<OwnedMutexGuard<()>>,
}

impl HostTransaction {
    pub(crate) fn new(
        db: Arc<SharedDatabase>,
        version: u32,
        mode: TransactionMode,
        stores: Catalog,
        writer: Option<OwnedMutexGuard<()>>,
    ) -> Self {
        let id = db.next_transaction_id();
        tracing::debug!(txid = %id, %mode, scope = ?stores.keys().collect::<Vec<_>>(), "begin");
        Self {
            id,
            mode,
            state: TransactionState::Active,
            db,
            version,
            stores,
            pending: BTreeMap::new(),
            writer,
        }
    }

    /// Transaction ID.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Access mode.
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Current state.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true while the transaction accepts operations.
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Names of the object stores in scope, sorted.
    pub fn scope(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    /// Reads a record by primary key.
    pub fn get(&self, store: &str, key: &Key) -> StorageResult<Option<Value>> {
        Ok(self.view(store)?.get(key).cloned())
    }

    /// Reads records in key order, optionally through an index and bounded
    /// by a range and a limit.
    pub fn get_all(
        &self,
        store: &str,
        index: Option<&str>,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Value>> {
        let scan = self.view(store)?.scan(index, range, Direction::Next)?;
        let values = scan.map(|entry| entry.value);
        Ok(match limit {
            Some(n) => values.take(n).collect(),
            None => values.collect(),
        })
    }

    /// Counts records, or index entries when `index` is given.
    pub fn count(&self, store: &str, index: Option<&str>, range: Option<&KeyRange>) -> StorageResult<usize> {
        self.view(store)?.count(index, range)
    }

    /// Opens a lazy cursor.
    pub fn open_cursor<'a>(
        &'a self,
        store: &str,
        index: Option<&str>,
        range: Option<&'a KeyRange>,
        direction: Direction,
    ) -> StorageResult<Cursor<'a>> {
        let inner = self.view(store)?.scan(index, range, direction)?;
        Ok(Cursor { inner })
    }

    /// Inserts or replaces a record, returning its primary key.
    pub fn put(&mut self, store: &str, value: Value) -> StorageResult<Key> {
        let (base, pending) = self.writable(store)?;
        pending.put(base, value)
    }

    /// Deletes a record. Returns whether it existed.
    pub fn delete(&mut self, store: &str, key: &Key) -> StorageResult<bool> {
        let (base, pending) = self.writable(store)?;
        Ok(pending.delete(base, key))
    }

    /// Deletes every record in a store.
    pub fn clear(&mut self, store: &str) -> StorageResult<()> {
        let (_, pending) = self.writable(store)?;
        pending.clear();
        Ok(())
    }

    /// Installs the transaction's writes atomically.
    ///
    /// # Errors
    ///
    /// Returns `TransactionInactive` if the transaction already finished, or
    /// if the database was upgraded since it began.
    pub fn commit(&mut self) -> StorageResult<()> {
        self.ensure_active()?;
        if *self.db.version.read() != self.version {
            self.finish(TransactionState::Aborted);
            return Err(StorageError::TransactionInactive);
        }
        let pending = std::mem::take(&mut self.pending);
        let writes: usize = pending.values().map(PendingStore::write_count).sum();
        if pending.values().any(|store| !store.is_empty()) {
            // without our own snapshot, an unshared store is updated in place
            self.stores.clear();
            let mut committed = self.db.stores.write();
            for (name, store) in pending {
                if let Some(target) = committed.get_mut(&name) {
                    Arc::make_mut(target).apply(store);
                }
            }
        }
        self.finish(TransactionState::Committed);
        tracing::debug!(txid = %self.id, writes, "committed");
        Ok(())
    }

    /// Discards the transaction's writes.
    pub fn abort(&mut self) -> StorageResult<()> {
        self.ensure_active()?;
        self.finish(TransactionState::Aborted);
        tracing::debug!(txid = %self.id, "aborted");
        Ok(())
    }

    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        self.pending.clear();
        self.writer = None;
    }

    fn ensure_active(&self) -> StorageResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(StorageError::TransactionInactive)
        }
    }

    fn view(&self, name: &str) -> StorageResult<StoreView<'_>> {
        self.ensure_active()?;
        match self.stores.get(name) {
            Some(store) => Ok(StoreView::new(store, self.pending.get(name))),
            None => Err(self.missing(name)),
        }
    }

    fn writable(&mut self, name: &str) -> StorageResult<(&ObjectStore, &mut PendingStore)> {
        self.ensure_active()?;
        if self.mode == TransactionMode::ReadOnly {
            return Err(StorageError::ReadOnly);
        }
        let Some(base) = self.stores.get(name) else {
            return Err(self.missing(name));
        };
        let pending = self
            .pending
            .entry(name.to_string())
            .or_insert_with(|| PendingStore::new(base));
        Ok((&**base, pending))
    }

    fn missing(&self, name: &str) -> StorageError {
        if self.db.stores.read().contains_key(name) {
            StorageError::NotInScope {
                name: name.to_string(),
            }
        } else {
            StorageError::store_not_found(name)
        }
    }
}

impl Drop for HostTransaction {
    fn drop(&mut self) {
        if self.is_active() {
            self.finish(TransactionState::Aborted);
            tracing::debug!(txid = %self.id, "dropped while active, aborted");
        }
    }
}

/// One record yielded by a [`Cursor`].
#[derive(Debug, Clone, PartialEq)]
pub struct CursorEntry {
    /// Index key for index cursors, otherwise the primary key.
    pub key: Key,
    /// Primary key of the record.
    pub primary_key: Key,
    /// The record.
    pub value: Value,
}

impl CursorEntry {
    pub(crate) fn from_scan((key, primary_key, value): ScanItem<'_>) -> Self {
        Self {
            key: key.clone(),
            primary_key: primary_key.clone(),
            value: value.clone(),
        }
    }
}

/// Lazy iterator over records in key order.
///
/// Committed records are read from the transaction's snapshot one at a
/// time, so stopping early never touches the rest of the store.
pub struct Cursor<'a> {
    inner: Box<dyn Iterator<Item = CursorEntry> + 'a>,
}

impl Iterator for Cursor<'_> {
    type Item = CursorEntry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::HostConnection;
    use crate::factory::StoreFactory;
    use crate::types::{IndexParams, ObjectStoreParams};

    fn open(factory: &StoreFactory) -> HostConnection {
        factory
            .open("db", 1, |upgrade| {
                upgrade.create_object_store("words", ObjectStoreParams::new("id").auto_increment(true))?;
                upgrade.create_index("words", "by_level", IndexParams::new("level"))?;
                upgrade.create_object_store("packs", ObjectStoreParams::new("id"))
            })
            .unwrap()
    }

    fn word(text: &str, level: i64) -> Value {
        Value::from_pairs([("text", Value::from(text)), ("level", Value::from(level))])
    }

    #[tokio::test]
    async fn commit_makes_writes_visible() {
        let conn = open(&StoreFactory::new());
        let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
        let key = tx.put("words", word("apple", 1)).unwrap();
        assert!(tx.get("words", &key).unwrap().is_some());
        tx.commit().unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);

        let tx = conn.transaction(&["words"], TransactionMode::ReadOnly).await.unwrap();
        assert_eq!(tx.count("words", None, None).unwrap(), 1);
    }

    #[tokio::test]
    async fn abort_discards_writes() {
        let conn = open(&StoreFactory::new());
        let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
        tx.put("words", word("apple", 1)).unwrap();
        tx.abort().unwrap();
        assert_eq!(tx.put("words", word("pear", 1)), Err(StorageError::TransactionInactive));
        drop(tx);

        let tx = conn.transaction(&["words"], TransactionMode::ReadOnly).await.unwrap();
        assert_eq!(tx.count("words", None, None).unwrap(), 0);
    }

    #[tokio::test]
    async fn dropping_active_transaction_discards_writes() {
        let conn = open(&StoreFactory::new());
        {
            let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
            tx.put("words", word("apple", 1)).unwrap();
        }
        let tx = conn.transaction(&["words"], TransactionMode::ReadOnly).await.unwrap();
        assert_eq!(tx.count("words", None, None).unwrap(), 0);
    }

    #[tokio::test]
    async fn readers_keep_their_snapshot() {
        let conn = open(&StoreFactory::new());
        let reader = conn.transaction(&["words"], TransactionMode::ReadOnly).await.unwrap();

        let mut writer = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
        writer.put("words", word("apple", 1)).unwrap();
        writer.commit().unwrap();

        assert_eq!(reader.count("words", None, None).unwrap(), 0);
    }

    fn committed_words(tx: &HostTransaction) -> *const ObjectStore {
        Arc::as_ptr(&tx.db.stores.read()["words"])
    }

    #[tokio::test]
    async fn commit_updates_unshared_store_in_place() {
        let conn = open(&StoreFactory::new());
        let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
        for level in 0..1_000 {
            tx.put("words", word("w", level)).unwrap();
        }
        tx.commit().unwrap();

        for level in 0..50 {
            let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
            let before = committed_words(&tx);
            tx.put("words", word("more", level)).unwrap();
            tx.commit().unwrap();
            assert_eq!(committed_words(&tx), before);
        }

        let tx = conn.transaction(&["words"], TransactionMode::ReadOnly).await.unwrap();
        assert_eq!(tx.count("words", None, None).unwrap(), 1_050);
        assert_eq!(tx.count("words", Some("by_level"), None).unwrap(), 1_050);
    }

    #[tokio::test]
    async fn commit_copies_store_held_by_a_reader() {
        let conn = open(&StoreFactory::new());
        let reader = conn.transaction(&["words"], TransactionMode::ReadOnly).await.unwrap();

        let mut writer = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
        let before = committed_words(&writer);
        writer.put("words", word("apple", 1)).unwrap();
        writer.commit().unwrap();

        assert_ne!(committed_words(&writer), before);
        assert_eq!(reader.count("words", None, None).unwrap(), 0);
    }

    #[tokio::test]
    async fn writes_inside_a_transaction_show_in_scans() {
        let conn = open(&StoreFactory::new());
        let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
        for (text, level) in [("a", 1), ("b", 2), ("c", 3)] {
            tx.put("words", word(text, level)).unwrap();
        }
        tx.commit().unwrap();

        let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
        assert!(tx.delete("words", &Key::from(2i64)).unwrap());
        tx.put("words", word("d", 2)).unwrap();
        let levels: Vec<_> = tx
            .open_cursor("words", Some("by_level"), None, Direction::Prev)
            .unwrap()
            .map(|entry| entry.primary_key)
            .collect();
        assert_eq!(levels, vec![Key::from(3i64), Key::from(4i64), Key::from(1i64)]);
        assert_eq!(tx.count("words", None, None).unwrap(), 3);
        assert!(!tx.delete("words", &Key::from(2i64)).unwrap());
    }

    #[tokio::test]
    async fn read_only_rejects_writes() {
        let conn = open(&StoreFactory::new());
        let mut tx = conn.transaction(&["words"], TransactionMode::ReadOnly).await.unwrap();
        assert_eq!(tx.put("words", word("apple", 1)), Err(StorageError::ReadOnly));
        assert_eq!(tx.clear("words"), Err(StorageError::ReadOnly));
    }

    #[tokio::test]
    async fn out_of_scope_store_is_reported() {
        let conn = open(&StoreFactory::new());
        let tx = conn.transaction(&["words"], TransactionMode::ReadOnly).await.unwrap();
        assert!(matches!(tx.get("packs", &Key::from(1i64)), Err(StorageError::NotInScope { .. })));
        assert!(matches!(
            tx.get("nothing", &Key::from(1i64)),
            Err(StorageError::ObjectStoreNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn writers_are_serialized() {
        let conn = Arc::new(open(&StoreFactory::new()));
        let first = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();

        let waiting = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move {
                let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
                let count = tx.count("words", None, None).unwrap();
                tx.put("words", word("second", 2)).unwrap();
                tx.commit().unwrap();
                count
            })
        };

        let mut first = first;
        first.put("words", word("first", 1)).unwrap();
        tokio::task::yield_now().await;
        first.commit().unwrap();

        assert_eq!(waiting.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cursor_walks_index_in_both_directions() {
        let conn = open(&StoreFactory::new());
        let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
        for (text, level) in [("c", 3), ("a", 1), ("b", 2)] {
            tx.put("words", word(text, level)).unwrap();
        }

        let forward: Vec<_> = tx
            .open_cursor("words", Some("by_level"), None, Direction::Next)
            .unwrap()
            .map(|entry| entry.key)
            .collect();
        assert_eq!(forward, vec![Key::from(1i64), Key::from(2i64), Key::from(3i64)]);

        let range = KeyRange::lower_bound(Key::from(2i64), false);
        let mut backward = tx
            .open_cursor("words", Some("by_level"), Some(&range), Direction::Prev)
            .unwrap();
        let first = backward.next().unwrap();
        assert_eq!(first.key, Key::from(3i64));
        assert_eq!(first.primary_key, Key::from(1i64));
    }

    #[tokio::test]
    async fn get_all_respects_limit() {
        let conn = open(&StoreFactory::new());
        let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
        for level in 0..5 {
            tx.put("words", word("w", level)).unwrap();
        }
        assert_eq!(tx.get_all("words", None, None, Some(2)).unwrap().len(), 2);
        assert_eq!(tx.get_all("words", Some("by_level"), None, None).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn upgrade_between_begin_and_commit_fails_commit() {
        let factory = StoreFactory::new();
        let conn = open(&factory);
        let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
        tx.put("words", word("apple", 1)).unwrap();
        drop(conn);

        factory.open("db", 2, |_| Ok(())).unwrap();
        assert_eq!(tx.commit(), Err(StorageError::TransactionInactive));
    }
}

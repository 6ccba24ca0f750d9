//! Connections to an open database.

use crate::error::{StorageError, StorageResult};
use crate::factory::SharedDatabase;
use crate::transaction::HostTransaction;
use crate::types::{IndexParams, ObjectStoreParams, TransactionMode};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An open connection to a database at a fixed version.
///
/// Dropping the connection closes it.
#[derive(Debug)]
pub struct HostConnection {
    db: Arc<SharedDatabase>,
    version: u32,
    closed: AtomicBool,
}

impl HostConnection {
    pub(crate) fn new(db: Arc<SharedDatabase>, version: u32) -> Self {
        db.open_connections.fetch_add(1, Ordering::SeqCst);
        Self {
            db,
            version,
            closed: AtomicBool::new(false),
        }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.db.name
    }

    /// Version this connection was opened at.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Names of the object stores, sorted.
    pub fn object_store_names(&self) -> Vec<String> {
        self.db.stores.read().keys().cloned().collect()
    }

    /// Names of the indexes on an object store, sorted.
    pub fn index_names(&self, store: &str) -> StorageResult<Vec<String>> {
        self.db
            .stores
            .read()
            .get(store)
            .map(|s| s.index_names())
            .ok_or_else(|| StorageError::store_not_found(store))
    }

    /// Creation parameters of an object store.
    pub fn object_store_params(&self, store: &str) -> StorageResult<ObjectStoreParams> {
        self.db
            .stores
            .read()
            .get(store)
            .map(|s| s.params().clone())
            .ok_or_else(|| StorageError::store_not_found(store))
    }

    /// Creation parameters of an index.
    pub fn index_params(&self, store: &str, index: &str) -> StorageResult<IndexParams> {
        let stores = self.db.stores.read();
        let object_store = stores
            .get(store)
            .ok_or_else(|| StorageError::store_not_found(store))?;
        object_store
            .index_params(index)
            .cloned()
            .ok_or_else(|| StorageError::index_not_found(store, index))
    }

    /// Begins a transaction over `scope`.
    ///
    /// Read-write transactions wait for any other read-write transaction on
    /// this database to finish. The snapshot is taken once the transaction
    /// can start.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` if the connection was closed
    /// - `Data` for an empty scope
    /// - `ObjectStoreNotFound` if a scoped store does not exist
    pub async fn transaction(&self, scope: &[&str], mode: TransactionMode) -> StorageResult<HostTransaction> {
        self.ensure_open()?;
        if scope.is_empty() {
            return Err(StorageError::data("transaction scope is empty"));
        }

        let writer = match mode {
            TransactionMode::ReadWrite => Some(self.db.writer.clone().lock_owned().await),
            TransactionMode::ReadOnly => None,
        };

        let snapshot = {
            let stores = self.db.stores.read();
            let mut snapshot = BTreeMap::new();
            for name in scope {
                let store = stores
                    .get(*name)
                    .ok_or_else(|| StorageError::store_not_found(*name))?;
                snapshot.insert((*name).to_string(), Arc::clone(store));
            }
            snapshot
        };

        Ok(HostTransaction::new(
            Arc::clone(&self.db),
            self.version,
            mode,
            snapshot,
            writer,
        ))
    }

    /// Closes the connection. Closing twice has no effect.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.db.open_connections.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(database = %self.db.name, "connection closed");
        }
    }

    /// Returns true once the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            Err(StorageError::ConnectionClosed {
                name: self.db.name.clone(),
            })
        } else {
            Ok(())
        }
    }
}

impl Drop for HostConnection {
    fn drop(&mut self) {
        self.close();
    }
}

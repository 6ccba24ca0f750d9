//! Database factory and version upgrades.

use crate::connection::HostConnection;
use crate::error::{StorageError, StorageResult};
use crate::object_store::ObjectStore;
use crate::types::{IndexParams, ObjectStoreParams, TransactionId};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) type Catalog = BTreeMap<String, Arc<ObjectStore>>;

/// State shared by every connection to one named database.
#[derive(Debug)]
pub(crate) struct SharedDatabase {
    pub(crate) name: String,
    pub(crate) version: RwLock<u32>,
    /// Committed object stores.
    pub(crate) stores: RwLock<Catalog>,
    /// Held by read-write transactions for their whole lifetime.
    pub(crate) writer: Arc<tokio::sync::Mutex<()>>,
    pub(crate) open_connections: AtomicUsize,
    next_txid: AtomicU64,
}

impl SharedDatabase {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: RwLock::new(0),
            stores: RwLock::new(BTreeMap::new()),
            writer: Arc::new(tokio::sync::Mutex::new(())),
            open_connections: AtomicUsize::new(0),
            next_txid: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst))
    }
}

/// Opens named databases and runs their version upgrades.
///
/// The factory is the in-process stand-in for a browser's database factory:
/// databases live as long as the factory (and any clone of it) does.
///
/// # Example
///
/// ```rust
/// use lexidb_storage::{ObjectStoreParams, StoreFactory};
///
/// let factory = StoreFactory::new();
/// let conn = factory
///     .open("vocab", 1, |upgrade| {
///         upgrade.create_object_store("words", ObjectStoreParams::new("id").auto_increment(true))
///     })
///     .unwrap();
/// assert_eq!(conn.version(), 1);
/// assert_eq!(conn.object_store_names(), vec!["words".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StoreFactory {
    databases: Arc<Mutex<HashMap<String, Arc<SharedDatabase>>>>,
}

impl StoreFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a connection to `name` at `version`.
    ///
    /// If the stored version is lower, `upgrade` runs against a copy of the
    /// catalog; the copy is installed only if `upgrade` succeeds.
    ///
    /// # Errors
    ///
    /// - `InvalidVersion` for version 0
    /// - `VersionTooLow` if the stored version is higher
    /// - `Blocked` if an upgrade is needed while other connections are open
    /// - whatever `upgrade` returns
    pub fn open<F>(&self, name: &str, version: u32, upgrade: F) -> StorageResult<HostConnection>
    where
        F: FnOnce(&mut VersionChange) -> StorageResult<()>,
    {
        if version == 0 {
            return Err(StorageError::InvalidVersion(version));
        }

        let mut databases = self.databases.lock();
        let db = databases
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SharedDatabase::new(name)))
            .clone();

        let current = *db.version.read();
        if version < current {
            return Err(StorageError::VersionTooLow {
                name: name.to_string(),
                requested: version,
                current,
            });
        }

        if version > current {
            let open = db.open_connections.load(Ordering::SeqCst);
            if open > 0 {
                return Err(StorageError::Blocked {
                    name: name.to_string(),
                    requested: version,
                    open,
                });
            }

            let mut change = VersionChange {
                name: name.to_string(),
                old_version: current,
                new_version: version,
                stores: db.stores.read().clone(),
            };
            match upgrade(&mut change) {
                Ok(()) => {
                    *db.stores.write() = change.stores;
                    *db.version.write() = version;
                    tracing::info!(database = name, from = current, to = version, "upgraded");
                }
                Err(err) => {
                    if current == 0 {
                        databases.remove(name);
                    }
                    tracing::warn!(database = name, error = %err, "upgrade failed");
                    return Err(err);
                }
            }
        }

        Ok(HostConnection::new(db, version))
    }

    /// Returns the stored version of a database, if it exists.
    pub fn version(&self, name: &str) -> Option<u32> {
        self.databases.lock().get(name).map(|db| *db.version.read())
    }

    /// Returns the number of open connections to a database.
    pub fn open_connections(&self, name: &str) -> usize {
        self.databases
            .lock()
            .get(name)
            .map_or(0, |db| db.open_connections.load(Ordering::SeqCst))
    }

    /// Returns the names of all databases, sorted.
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Deletes a database. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `Blocked` while connections are open.
    pub fn delete_database(&self, name: &str) -> StorageResult<bool> {
        let mut databases = self.databases.lock();
        if let Some(db) = databases.get(name) {
            let open = db.open_connections.load(Ordering::SeqCst);
            if open > 0 {
                return Err(StorageError::Blocked {
                    name: name.to_string(),
                    requested: 0,
                    open,
                });
            }
        }
        Ok(databases.remove(name).is_some())
    }
}

/// Handle passed to an upgrade callback.
///
/// Changes are made to a private copy of the catalog.
#[derive(Debug)]
pub struct VersionChange {
    name: String,
    old_version: u32,
    new_version: u32,
    stores: Catalog,
}

impl VersionChange {
    /// Name of the database being upgraded.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version before the upgrade; 0 for a new database.
    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    /// Version being upgraded to.
    pub fn new_version(&self) -> u32 {
        self.new_version
    }

    /// Returns true if the object store exists.
    pub fn has_object_store(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// Names of the existing object stores, sorted.
    pub fn object_store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    /// Names of the indexes on an object store, sorted.
    pub fn index_names(&self, store: &str) -> StorageResult<Vec<String>> {
        self.stores
            .get(store)
            .map(|s| s.index_names())
            .ok_or_else(|| StorageError::store_not_found(store))
    }

    /// Creates an object store.
    pub fn create_object_store(&mut self, name: &str, params: ObjectStoreParams) -> StorageResult<()> {
        if self.stores.contains_key(name) {
            return Err(StorageError::ObjectStoreExists {
                name: name.to_string(),
            });
        }
        self.stores
            .insert(name.to_string(), Arc::new(ObjectStore::new(name, params)));
        Ok(())
    }

    /// Creates an index on an existing object store, indexing its records.
    pub fn create_index(&mut self, store: &str, name: &str, params: IndexParams) -> StorageResult<()> {
        let object_store = self
            .stores
            .get_mut(store)
            .ok_or_else(|| StorageError::store_not_found(store))?;
        Arc::make_mut(object_store).create_index(name, params)
    }
}

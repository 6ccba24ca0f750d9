//! Atomic units of work spanning several collections.
//!
//! [`Store::transaction`] opens one host transaction over the named
//! collections and hands the body a [`TransactionHandles`]. The unit commits
//! only if the body returns `Ok`; any error aborts every write it made.
//!
//! [`Store::batch_transaction`] applies a list of save, update and delete
//! operations, possibly against different collections, in one unit.

use crate::error::{CoreError, CoreResult};
use crate::repository::{primary_key_of, to_key, write_record};
use crate::schema::SchemaDescriptor;
use crate::stats::StoreStats;
use crate::store::Store;
use futures::future::BoxFuture;
use lexidb_codec::{Key, Value};
use lexidb_storage::{
    Cursor, Direction, HostTransaction, KeyRange, StorageError, TransactionId, TransactionMode,
};
use std::fmt;
use std::str::FromStr;

/// The per-collection handles of an open transaction.
pub struct TransactionHandles {
    tx: HostTransaction,
    store: Store,
}

impl TransactionHandles {
    /// Host transaction id.
    pub fn id(&self) -> TransactionId {
        self.tx.id()
    }

    /// Transaction mode.
    pub fn mode(&self) -> TransactionMode {
        self.tx.mode()
    }

    /// Names of the collections in scope.
    pub fn collections(&self) -> Vec<String> {
        self.tx.scope()
    }

    /// Raw handle to one collection in scope.
    ///
    /// # Errors
    ///
    /// `NotInScope` if `name` was not named when the transaction was opened.
    pub fn collection(&mut self, name: &str) -> CoreResult<CollectionHandle<'_>> {
        if !self.tx.scope().iter().any(|n| n == name) {
            return Err(StorageError::NotInScope {
                name: name.to_string(),
            }
            .into());
        }
        Ok(CollectionHandle {
            tx: &mut self.tx,
            name: name.to_string(),
            stats: self.store.counters(),
        })
    }

    pub(crate) fn host(&self) -> &HostTransaction {
        &self.tx
    }

    pub(crate) fn host_mut(&mut self) -> &mut HostTransaction {
        &mut self.tx
    }
}

impl fmt::Debug for TransactionHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandles")
            .field("id", &self.tx.id())
            .field("mode", &self.tx.mode())
            .field("collections", &self.tx.scope())
            .finish()
    }
}

/// Untyped access to one collection inside a transaction.
///
/// Records are raw [`Value`]s; no timestamps are applied.
pub struct CollectionHandle<'t> {
    tx: &'t mut HostTransaction,
    name: String,
    stats: &'t StoreStats,
}

impl<'t> CollectionHandle<'t> {
    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads a record by primary key.
    pub fn get(&self, key: &Key) -> CoreResult<Option<Value>> {
        let record = self.tx.get(&self.name, key)?;
        self.stats.record_index_lookup();
        Ok(record)
    }

    /// Reads records in key order, optionally through an index.
    pub fn get_all(
        &self,
        index: Option<&str>,
        range: Option<&KeyRange>,
        limit: Option<usize>,
    ) -> CoreResult<Vec<Value>> {
        let records = self.tx.get_all(&self.name, index, range, limit)?;
        self.stats.record_reads(records.len());
        Ok(records)
    }

    /// Counts records, or index entries when `index` is given.
    pub fn count(&self, index: Option<&str>, range: Option<&KeyRange>) -> CoreResult<usize> {
        Ok(self.tx.count(&self.name, index, range)?)
    }

    /// Opens a cursor.
    pub fn cursor<'a>(
        &'a self,
        index: Option<&str>,
        range: Option<&'a KeyRange>,
        direction: Direction,
    ) -> CoreResult<Cursor<'a>> {
        let cursor = self.tx.open_cursor(&self.name, index, range, direction)?;
        self.stats.record_cursor_scan();
        Ok(cursor)
    }

    /// Inserts or replaces a record, returning its primary key.
    pub fn put(&mut self, record: Value) -> CoreResult<Key> {
        let key = self.tx.put(&self.name, record)?;
        self.stats.record_write();
        Ok(key)
    }

    /// Deletes a record. Returns whether it existed.
    pub fn delete(&mut self, key: &Key) -> CoreResult<bool> {
        let existed = self.tx.delete(&self.name, key)?;
        if existed {
            self.stats.record_delete();
        }
        Ok(existed)
    }

    /// Removes every record.
    pub fn clear(&mut self) -> CoreResult<()> {
        Ok(self.tx.clear(&self.name)?)
    }
}

impl fmt::Debug for CollectionHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("name", &self.name)
            .field("txid", &self.tx.id())
            .finish()
    }
}

/// What a batch operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    /// Insert or replace, as [`Repository::save`](crate::Repository::save).
    Save,
    /// Merge over the stored record with the same primary key.
    Update,
    /// Delete by primary key.
    Delete,
}

impl BatchAction {
    /// The action's tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            BatchAction::Save => "save",
            BatchAction::Update => "update",
            BatchAction::Delete => "delete",
        }
    }
}

impl FromStr for BatchAction {
    type Err = CoreError;

    fn from_str(tag: &str) -> CoreResult<Self> {
        match tag {
            "save" => Ok(BatchAction::Save),
            "update" => Ok(BatchAction::Update),
            "delete" => Ok(BatchAction::Delete),
            other => Err(CoreError::invalid_operation(format!(
                "unsupported batch action '{other}'"
            ))),
        }
    }
}

impl fmt::Display for BatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a [`Store::batch_transaction`].
///
/// `data` is the record for saves and updates (updates need its primary
/// key), and either the record or the bare primary key for deletes.
#[derive(Debug, Clone)]
pub struct BatchOperation {
    /// Target collection.
    pub schema: &'static SchemaDescriptor,
    /// What to do.
    pub action: BatchAction,
    /// Payload.
    pub data: Value,
}

impl BatchOperation {
    /// Creates an operation.
    pub fn new(schema: &'static SchemaDescriptor, action: BatchAction, data: Value) -> Self {
        Self {
            schema,
            action,
            data,
        }
    }

    /// Creates an operation from an action tag.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if `tag` is not `save`, `update` or `delete`.
    pub fn from_tag(schema: &'static SchemaDescriptor, tag: &str, data: Value) -> CoreResult<Self> {
        Ok(Self::new(schema, tag.parse()?, data))
    }

    /// A save of `record`.
    pub fn save(schema: &'static SchemaDescriptor, record: Value) -> Self {
        Self::new(schema, BatchAction::Save, record)
    }

    /// An update with `record`, which must carry its primary key.
    pub fn update(schema: &'static SchemaDescriptor, record: Value) -> Self {
        Self::new(schema, BatchAction::Update, record)
    }

    /// A delete of the record with primary key `id`.
    pub fn delete(schema: &'static SchemaDescriptor, id: impl Into<Key>) -> Self {
        Self::new(schema, BatchAction::Delete, id.into().to_value())
    }
}

impl Store {
    /// Runs `body` in one transaction over `collections`.
    ///
    /// Commits if the body returns `Ok`; otherwise every write made through
    /// the handles is discarded. Inside a read-write body, use the
    /// repositories' `*_in_txn` methods: their async write counterparts
    /// would wait for this body's writer lock, so they fail with
    /// `InvalidOperation` instead.
    ///
    /// Bodies borrow the handles, so they are written as boxed futures:
    ///
    /// ```rust
    /// use futures::FutureExt;
    /// use lexidb_core::{SchemaDescriptor, SchemaRegistry, Store, StoreConfig, TransactionMode, Value};
    ///
    /// static PACKS: SchemaDescriptor = SchemaDescriptor::new("packs", "id").auto_increment(true);
    ///
    /// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
    /// let store = Store::in_memory();
    /// store.open(StoreConfig::new("app", 1), SchemaRegistry::new([&PACKS]).unwrap()).await.unwrap();
    ///
    /// let key = store
    ///     .transaction(&["packs"], TransactionMode::ReadWrite, |handles| {
    ///         async move {
    ///             let mut packs = handles.collection("packs")?;
    ///             packs.put(Value::from_pairs([("name", Value::from("basics"))]))
    ///         }
    ///         .boxed()
    ///     })
    ///     .await
    ///     .unwrap();
    /// assert_eq!(key.as_integer(), Some(1));
    /// # });
    /// ```
    ///
    /// # Errors
    ///
    /// The body's error if it is already structured, otherwise the failure
    /// wrapped in `TransactionFailed`.
    pub async fn transaction<R, F>(&self, collections: &[&str], mode: TransactionMode, body: F) -> CoreResult<R>
    where
        F: for<'t> FnOnce(&'t mut TransactionHandles) -> BoxFuture<'t, CoreResult<R>>,
    {
        let result = async {
            let tx = self.begin(collections, mode).await?;
            let mut handles = TransactionHandles {
                tx,
                store: self.clone(),
            };
            tracing::debug!(txid = %handles.id(), ?collections, %mode, "transaction started");
            let outcome = match mode {
                TransactionMode::ReadWrite => self.holding_writer(body(&mut handles)).await,
                TransactionMode::ReadOnly => body(&mut handles).await,
            };
            match outcome {
                Ok(value) => {
                    self.commit(&mut handles.tx)?;
                    tracing::debug!(txid = %handles.id(), "transaction committed");
                    Ok(value)
                }
                Err(err) => {
                    self.abort(&mut handles.tx);
                    tracing::debug!(txid = %handles.id(), error = %err, "transaction aborted");
                    Err(err)
                }
            }
        }
        .await
        .map_err(|err| err.wrap(|source| transaction_failed(collections.iter().copied(), source)));
        self.observe(result)
    }

    /// Applies `operations` in order inside one read-write transaction.
    ///
    /// Each record is stamped with its own collection's timestamp policy.
    /// Returns one value per operation: the stored record for saves and
    /// updates, the removed record (or null if there was none) for deletes.
    ///
    /// # Errors
    ///
    /// `InvalidParams` for an update or delete without a primary key;
    /// host failures wrapped in `TransactionFailed`. Nothing is written
    /// unless every operation succeeds.
    pub async fn batch_transaction(&self, operations: Vec<BatchOperation>) -> CoreResult<Vec<Value>> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }
        let mut scope: Vec<&str> = operations.iter().map(|op| op.schema.name).collect();
        scope.sort_unstable();
        scope.dedup();

        let actions: Vec<BatchAction> = operations.iter().map(|op| op.action).collect();
        let result = self
            .run(&scope, TransactionMode::ReadWrite, |tx| {
                operations
                    .into_iter()
                    .map(|op| self.apply(tx, op))
                    .collect::<CoreResult<Vec<_>>>()
            })
            .await
            .map_err(|err| err.wrap(|source| transaction_failed(scope.iter().copied(), source)));

        if let Ok(results) = &result {
            for (action, value) in actions.iter().zip(results) {
                match action {
                    BatchAction::Delete if !value.is_null() => self.counters().record_delete(),
                    BatchAction::Delete => {}
                    _ => self.counters().record_write(),
                }
            }
            tracing::debug!(operations = results.len(), collections = ?scope, "batch committed");
        }
        self.observe(result)
    }

    fn apply(&self, tx: &mut HostTransaction, op: BatchOperation) -> CoreResult<Value> {
        let BatchOperation {
            schema,
            action,
            data,
        } = op;
        match action {
            BatchAction::Save => write_record(tx, schema, self.stamper(), data),
            BatchAction::Update => {
                let Some(key) = primary_key_of(schema, &data)? else {
                    return Err(CoreError::invalid_params(format!(
                        "batch update on {} needs a primary key '{}'",
                        schema.name, schema.primary_key
                    )));
                };
                let record = match tx.get(schema.name, &key)? {
                    Some(mut existing) => {
                        existing.merge(data);
                        existing
                    }
                    None => data,
                };
                write_record(tx, schema, self.stamper(), record)
            }
            BatchAction::Delete => {
                let key = match &data {
                    Value::Map(_) => primary_key_of(schema, &data)?.ok_or_else(|| {
                        CoreError::invalid_params(format!(
                            "batch delete on {} needs a primary key '{}'",
                            schema.name, schema.primary_key
                        ))
                    })?,
                    other => to_key(other)?,
                };
                let existing = tx.get(schema.name, &key)?;
                tx.delete(schema.name, &key)?;
                Ok(existing.unwrap_or(Value::Null))
            }
        }
    }
}

fn transaction_failed<'a>(collections: impl Iterator<Item = &'a str>, source: Box<CoreError>) -> CoreError {
    CoreError::TransactionFailed {
        collections: collections.map(str::to_string).collect(),
        source,
    }
}

//! Typed repositories over one collection.
//!
//! A [`Repository<T>`] converts entities to records through serde, checks
//! every queried field against the collection's schema before touching the
//! store, and picks the cheapest access path for each query.
//!
//! # Example
//!
//! ```rust,ignore
//! let words: Repository<Word> = store.repository(&WORDS);
//!
//! let saved = words.save(&Word::new("apple", 1)).await?;
//! let same = words.find_by_id(saved.id.unwrap()).await?;
//!
//! let recent = words
//!     .find_all(&QueryOptions::new().order_by("createdAt", SortDirection::Desc).limit(10))
//!     .await?;
//! ```

mod planner;
mod query;

pub use planner::QueryPlan;
pub use query::{Condition, OrderBy, QueryCondition, QueryOptions, RangeOptions, SortDirection};

use crate::clock::Timestamper;
use crate::error::{CoreError, CoreResult};
use crate::schema::SchemaDescriptor;
use crate::store::Store;
use crate::transaction::TransactionHandles;
use lexidb_codec::{from_value, to_value, Key, Value};
use lexidb_storage::{Direction, HostTransaction, KeyRange, TransactionMode};
use planner::{paginate, Plan, Resolved, Strategy};
pub(crate) use query::to_key;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Query engine bound to one collection.
///
/// Cheap to clone; clones share the store.
pub struct Repository<T> {
    store: Store,
    schema: &'static SchemaDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            schema: self.schema,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &self.schema.name)
            .finish()
    }
}

impl<T> Repository<T> {
    pub(crate) fn new(store: Store, schema: &'static SchemaDescriptor) -> Self {
        Self {
            store,
            schema,
            _marker: PhantomData,
        }
    }

    /// The bound schema.
    pub fn schema(&self) -> &'static SchemaDescriptor {
        self.schema
    }

    /// The bound collection's name.
    pub fn name(&self) -> &'static str {
        self.schema.name
    }

    /// Stamps `data` according to the schema's timestamp policy.
    ///
    /// Does nothing when timestamps are disabled. Otherwise sets the
    /// creation field unless `is_update`, and always sets the modification
    /// field.
    pub fn add_timestamps(&self, mut data: Value, is_update: bool) -> Value {
        stamp(self.schema, self.store.stamper(), &mut data, is_update);
        data
    }

    /// Returns the plan [`find_all`](Self::find_all) would run, without
    /// touching the store.
    ///
    /// # Errors
    ///
    /// The same validation errors `find_all` raises.
    pub fn explain(&self, options: &QueryOptions) -> CoreResult<QueryPlan> {
        Ok(planner::plan(self.schema, options)?.describe())
    }

    fn scope(&self) -> [&'static str; 1] {
        [self.schema.name]
    }
}

impl<T: Serialize + DeserializeOwned> Repository<T> {
    /// Inserts or updates an entity and returns it as stored.
    ///
    /// An entity without a primary key is inserted and gets both
    /// timestamps; the store assigns the key when the collection
    /// auto-increments. An entity carrying a key is written as an update and
    /// only the modification stamp is refreshed. A creation stamp it carries
    /// is kept as is; a missing one is carried over from the stored record,
    /// or set to the modification stamp when nothing is stored under the key.
    pub async fn save(&self, entity: &T) -> CoreResult<T> {
        let result: CoreResult<T> = async {
            let record = to_value(entity)?;
            let saved = self
                .store
                .run(&self.scope(), TransactionMode::ReadWrite, |tx| {
                    write_record(tx, self.schema, self.store.stamper(), record)
                })
                .await?;
            self.store.counters().record_write();
            from_value(&saved).map_err(CoreError::from)
        }
        .await;
        self.store.observe(result)
    }

    /// Saves every entity in one transaction.
    ///
    /// # Errors
    ///
    /// If any entity fails, nothing is written and the failure is returned
    /// as `SaveManyFailed`.
    pub async fn save_many(&self, entities: &[T]) -> CoreResult<Vec<T>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let result: CoreResult<Vec<T>> = async {
            let records = entities
                .iter()
                .map(to_value)
                .collect::<Result<Vec<_>, _>>()?;
            let saved = self
                .store
                .run(&self.scope(), TransactionMode::ReadWrite, |tx| {
                    records
                        .into_iter()
                        .map(|record| write_record(tx, self.schema, self.store.stamper(), record))
                        .collect::<CoreResult<Vec<_>>>()
                })
                .await?;
            for _ in &saved {
                self.store.counters().record_write();
            }
            decode(&saved)
        }
        .await
        .map_err(|err| {
            err.wrap(|source| CoreError::SaveManyFailed {
                collection: self.schema.name.to_string(),
                source,
            })
        });
        self.store.observe(result)
    }

    /// Looks up an entity by primary key.
    pub async fn find_by_id(&self, id: impl Into<Key>) -> CoreResult<Option<T>> {
        let key = id.into();
        let result: CoreResult<Option<T>> = async {
            let record = self
                .store
                .run(&self.scope(), TransactionMode::ReadOnly, |tx| {
                    Ok(tx.get(self.schema.name, &key)?)
                })
                .await?;
            self.store.counters().record_index_lookup();
            self.store.counters().record_reads(usize::from(record.is_some()));
            record.as_ref().map(from_value).transpose().map_err(CoreError::from)
        }
        .await;
        self.store.observe(result)
    }

    /// Returns the first entity whose `field` equals `value`.
    ///
    /// # Errors
    ///
    /// `FieldNotIndexed` if `field` is neither the primary key nor indexed,
    /// raised before any store access.
    pub async fn find_one_by(&self, field: &str, value: impl Into<Value>) -> CoreResult<Option<T>> {
        let value = value.into();
        let result: CoreResult<Option<T>> = async {
            let field = Resolved::new(self.schema, field)?;
            let range = KeyRange::only(to_key(&value)?);
            let records = self.lookup(field, &range, Some(1)).await?;
            records.first().map(from_value).transpose().map_err(CoreError::from)
        }
        .await;
        self.store.observe(result)
    }

    /// Returns every entity whose `field` equals `value`, in primary key
    /// order.
    pub async fn find_by(&self, field: &str, value: impl Into<Value>) -> CoreResult<Vec<T>> {
        let value = value.into();
        let result: CoreResult<Vec<T>> = async {
            let field = Resolved::new(self.schema, field)?;
            let range = KeyRange::only(to_key(&value)?);
            decode(&self.lookup(field, &range, None).await?)
        }
        .await;
        self.store.observe(result)
    }

    /// Returns true if some entity's `field` equals `value`.
    pub async fn exists_by(&self, field: &str, value: impl Into<Value>) -> CoreResult<bool> {
        let value = value.into();
        let result: CoreResult<bool> = async {
            let field = Resolved::new(self.schema, field)?;
            let range = KeyRange::only(to_key(&value)?);
            let count = self
                .store
                .run(&self.scope(), TransactionMode::ReadOnly, |tx| {
                    Ok(tx.count(self.schema.name, field.index(), Some(&range))?)
                })
                .await?;
            self.store.counters().record_index_lookup();
            Ok::<_, CoreError>(count > 0)
        }
        .await;
        self.store.observe(result)
    }

    /// Scans an index between two bounds with a cursor.
    ///
    /// A missing bound leaves that side open-ended. Bounds are inclusive
    /// unless `options` marks them open. Results come in ascending key order
    /// unless `options.direction` is `Desc`, and the cursor stops once
    /// `options.limit` records were read.
    ///
    /// # Errors
    ///
    /// `FieldNotIndexed` before any store access; `RangeQueryFailed` if the
    /// scan itself fails, including inverted bounds.
    pub async fn find_by_range(
        &self,
        field: &str,
        lower: Option<Value>,
        upper: Option<Value>,
        options: RangeOptions,
    ) -> CoreResult<Vec<T>> {
        let result: CoreResult<Vec<T>> = async {
            let field = Resolved::new(self.schema, field)?;
            let lower = lower.as_ref().map(to_key).transpose()?;
            let upper = upper.as_ref().map(to_key).transpose()?;

            let records = async {
                let range = match (lower, upper) {
                    (Some(l), Some(u)) => Some(KeyRange::bound(l, u, options.lower_open, options.upper_open)?),
                    (Some(l), None) => Some(KeyRange::lower_bound(l, options.lower_open)),
                    (None, Some(u)) => Some(KeyRange::upper_bound(u, options.upper_open)),
                    (None, None) => None,
                };
                let records = self
                    .store
                    .run(&self.scope(), TransactionMode::ReadOnly, |tx| {
                        let cursor = tx.open_cursor(
                            self.schema.name,
                            field.index(),
                            range.as_ref(),
                            options.direction.cursor_direction(),
                        )?;
                        let values = cursor.map(|entry| entry.value);
                        Ok(match options.limit {
                            Some(n) => values.take(n).collect::<Vec<_>>(),
                            None => values.collect(),
                        })
                    })
                    .await?;
                self.store.counters().record_cursor_scan();
                self.store.counters().record_reads(records.len());
                Ok::<_, CoreError>(records)
            }
            .await
            .map_err(|err| {
                err.wrap(|source| CoreError::RangeQueryFailed {
                    collection: self.schema.name.to_string(),
                    field: field.key_path.to_string(),
                    source,
                })
            })?;
            decode(&records)
        }
        .await;
        self.store.observe(result)
    }

    /// Runs a query, choosing the access path with the planner.
    ///
    /// # Errors
    ///
    /// `FieldNotIndexed` for the first unindexed field in the conditions or
    /// ordering, before any store access. `CursorQueryFailed` or
    /// `ComplexQueryFailed` if an ordered or filtered scan fails.
    pub async fn find_all(&self, options: &QueryOptions) -> CoreResult<Vec<T>> {
        let result: CoreResult<Vec<T>> = async {
            let plan = planner::plan(self.schema, options)?;
            tracing::debug!(collection = self.schema.name, plan = %plan.describe(), "query plan");
            let records = match plan.strategy {
                Strategy::FullScan => self.full_scan(&plan).await?,
                Strategy::OrderedScan => self.ordered_scan(&plan).await?,
                Strategy::IndexLookup => {
                    let filter = &plan.filters[0];
                    let records = self.lookup(filter.field, &filter.range, None).await?;
                    plan.finish(records)
                }
                Strategy::DrivingIndex(driving) => self.driving_scan(&plan, driving).await?,
            };
            decode(&records)
        }
        .await;
        self.store.observe(result)
    }

    /// Merges `patch` over the stored entity with primary key `id`.
    ///
    /// Returns `None` without writing if no such entity exists. Fields of
    /// `patch` replace stored fields one level deep; the primary key is kept
    /// and the modification stamp refreshed. Patch types should skip
    /// `None` fields when serializing, or they overwrite with null.
    pub async fn update<P: Serialize + ?Sized>(&self, id: impl Into<Key>, patch: &P) -> CoreResult<Option<T>> {
        let key = id.into();
        let result: CoreResult<Option<T>> = async {
            let patch = to_value(patch)?;
            if patch.as_map().is_none() {
                return Err(CoreError::invalid_params(format!(
                    "update patch for {} must be a map, got {}",
                    self.schema.name,
                    patch.type_name()
                )));
            }
            let updated = self
                .store
                .run(&self.scope(), TransactionMode::ReadWrite, |tx| {
                    let Some(mut record) = tx.get(self.schema.name, &key)? else {
                        return Ok(None);
                    };
                    record.merge(patch);
                    record.set_path(self.schema.primary_key, key.to_value());
                    stamp(self.schema, self.store.stamper(), &mut record, true);
                    tx.put(self.schema.name, record.clone())?;
                    Ok(Some(record))
                })
                .await?;
            if updated.is_some() {
                self.store.counters().record_write();
            }
            updated.as_ref().map(from_value).transpose().map_err(CoreError::from)
        }
        .await;
        self.store.observe(result)
    }

    /// Deletes the entity with primary key `id`.
    ///
    /// Returns true if a record was removed. Never fails: store errors are
    /// logged and reported as `false`.
    pub async fn delete(&self, id: impl Into<Key>) -> bool {
        let key = id.into();
        let result = self
            .store
            .run(&self.scope(), TransactionMode::ReadWrite, |tx| {
                Ok(tx.delete(self.schema.name, &key)?)
            })
            .await;
        match result {
            Ok(existed) => {
                if existed {
                    self.store.counters().record_delete();
                }
                existed
            }
            Err(err) => {
                tracing::warn!(collection = self.schema.name, %key, error = %err, "delete failed");
                self.store.counters().record_error();
                false
            }
        }
    }

    /// Deletes every listed entity in one transaction, best effort.
    ///
    /// Ids that are missing or fail individually are skipped (and logged);
    /// the rest are still deleted. Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// `DeleteManyFailed` if the transaction itself cannot run or commit.
    pub async fn delete_many<I>(&self, ids: I) -> CoreResult<usize>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let keys: Vec<Key> = ids.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Ok(0);
        }
        let result = self
            .store
            .run(&self.scope(), TransactionMode::ReadWrite, |tx| {
                let mut deleted = 0;
                for key in &keys {
                    match tx.delete(self.schema.name, key) {
                        Ok(true) => deleted += 1,
                        Ok(false) => {
                            tracing::warn!(collection = self.schema.name, %key, "delete_many skipped missing record");
                        }
                        Err(err) => {
                            tracing::warn!(collection = self.schema.name, %key, error = %err, "delete_many skipped record");
                        }
                    }
                }
                Ok(deleted)
            })
            .await
            .map_err(|err| {
                err.wrap(|source| CoreError::DeleteManyFailed {
                    collection: self.schema.name.to_string(),
                    source,
                })
            });
        if let Ok(deleted) = &result {
            for _ in 0..*deleted {
                self.store.counters().record_delete();
            }
        }
        self.store.observe(result)
    }

    /// Counts entities.
    ///
    /// - no arguments: every record in the collection
    /// - `field` only: records present in that field's index
    /// - `field` and `value`: records whose `field` equals `value`
    ///
    /// # Errors
    ///
    /// `InvalidParams` if `value` is given without `field`.
    pub async fn count(&self, field: Option<&str>, value: Option<Value>) -> CoreResult<usize> {
        let result: CoreResult<usize> = async {
            let (index, range) = match (field, value) {
                (None, Some(_)) => {
                    return Err(CoreError::invalid_params("count was given a value without a field"))
                }
                (None, None) => (None, None),
                (Some(field), value) => {
                    let field = Resolved::new(self.schema, field)?;
                    let range = value
                        .as_ref()
                        .map(|v| to_key(v).map(KeyRange::only))
                        .transpose()?;
                    (field.index(), range)
                }
            };
            let count = self
                .store
                .run(&self.scope(), TransactionMode::ReadOnly, |tx| {
                    Ok(tx.count(self.schema.name, index, range.as_ref())?)
                })
                .await?;
            if range.is_some() {
                self.store.counters().record_index_lookup();
            }
            Ok(count)
        }
        .await;
        self.store.observe(result)
    }

    /// Removes every record in the collection.
    pub async fn clear(&self) -> CoreResult<()> {
        let result = self
            .store
            .run(&self.scope(), TransactionMode::ReadWrite, |tx| {
                Ok(tx.clear(self.schema.name)?)
            })
            .await;
        if result.is_ok() {
            tracing::debug!(collection = self.schema.name, "cleared");
        }
        self.store.observe(result)
    }

    /// [`save`](Self::save) inside a transaction opened with
    /// [`Store::transaction`].
    pub fn save_in_txn(&self, handles: &mut TransactionHandles, entity: &T) -> CoreResult<T> {
        let record = to_value(entity)?;
        let saved = write_record(handles.host_mut(), self.schema, self.store.stamper(), record)?;
        self.store.counters().record_write();
        Ok(from_value(&saved)?)
    }

    /// [`find_by_id`](Self::find_by_id) inside a transaction; sees the
    /// transaction's own writes.
    pub fn find_by_id_in_txn(&self, handles: &TransactionHandles, id: impl Into<Key>) -> CoreResult<Option<T>> {
        let record = handles.host().get(self.schema.name, &id.into())?;
        self.store.counters().record_index_lookup();
        record.as_ref().map(from_value).transpose().map_err(CoreError::from)
    }

    /// Deletes inside a transaction. Unlike [`delete`](Self::delete), errors
    /// propagate so the transaction can abort.
    pub fn delete_in_txn(&self, handles: &mut TransactionHandles, id: impl Into<Key>) -> CoreResult<bool> {
        let existed = handles.host_mut().delete(self.schema.name, &id.into())?;
        if existed {
            self.store.counters().record_delete();
        }
        Ok(existed)
    }

    async fn lookup(&self, field: Resolved, range: &KeyRange, limit: Option<usize>) -> CoreResult<Vec<Value>> {
        let records = self
            .store
            .run(&self.scope(), TransactionMode::ReadOnly, |tx| {
                Ok(tx.get_all(self.schema.name, field.index(), Some(range), limit)?)
            })
            .await?;
        self.store.counters().record_index_lookup();
        self.store.counters().record_reads(records.len());
        Ok(records)
    }

    async fn full_scan(&self, plan: &Plan) -> CoreResult<Vec<Value>> {
        let fetch = plan.limit.map(|n| n.saturating_add(plan.offset));
        let records = self
            .store
            .run(&self.scope(), TransactionMode::ReadOnly, |tx| {
                Ok(tx.get_all(self.schema.name, None, None, fetch)?)
            })
            .await?;
        self.store.counters().record_full_scan();
        self.store.counters().record_reads(records.len());
        let threshold = self.store.scan_warning_threshold();
        if records.len() > threshold {
            tracing::warn!(
                collection = self.schema.name,
                records = records.len(),
                threshold,
                "full collection scan"
            );
        }
        Ok(paginate(records, plan.offset, plan.limit))
    }

    async fn ordered_scan(&self, plan: &Plan) -> CoreResult<Vec<Value>> {
        let Some(order) = plan.order else {
            return self.full_scan(plan).await;
        };
        let records = self
            .store
            .run(&self.scope(), TransactionMode::ReadOnly, |tx| {
                let cursor = tx.open_cursor(
                    self.schema.name,
                    order.field.index(),
                    None,
                    order.direction.cursor_direction(),
                )?;
                let values = cursor.skip(plan.offset).map(|entry| entry.value);
                Ok(match plan.limit {
                    Some(n) => values.take(n).collect::<Vec<_>>(),
                    None => values.collect(),
                })
            })
            .await
            .map_err(|err| {
                err.wrap(|source| CoreError::CursorQueryFailed {
                    collection: self.schema.name.to_string(),
                    field: order.field.key_path.to_string(),
                    source,
                })
            })?;
        self.store.counters().record_cursor_scan();
        self.store.counters().record_reads(records.len());
        Ok(records)
    }

    async fn driving_scan(&self, plan: &Plan, driving: usize) -> CoreResult<Vec<Value>> {
        let driver = &plan.filters[driving];
        let candidates = self
            .store
            .run(&self.scope(), TransactionMode::ReadOnly, |tx| {
                let cursor = tx.open_cursor(
                    self.schema.name,
                    driver.field.index(),
                    Some(&driver.range),
                    Direction::Next,
                )?;
                Ok(cursor
                    .map(|entry| entry.value)
                    .filter(|record| plan.residual(driving).all(|f| f.matches(record)))
                    .collect::<Vec<_>>())
            })
            .await
            .map_err(|err| {
                err.wrap(|source| CoreError::ComplexQueryFailed {
                    collection: self.schema.name.to_string(),
                    source,
                })
            })?;
        self.store.counters().record_cursor_scan();
        self.store.counters().record_reads(candidates.len());
        Ok(plan.finish(candidates))
    }
}

fn decode<T: DeserializeOwned>(records: &[Value]) -> CoreResult<Vec<T>> {
    records
        .iter()
        .map(|record| from_value(record).map_err(CoreError::from))
        .collect()
}

/// Applies the schema's timestamp policy to a record.
pub(crate) fn stamp(schema: &SchemaDescriptor, stamper: &Timestamper, record: &mut Value, is_update: bool) {
    let Some(policy) = schema.active_timestamps() else {
        return;
    };
    let now = Value::Text(stamper.now());
    if !is_update {
        record.set_path(policy.created_at_field, now.clone());
    }
    record.set_path(policy.updated_at_field, now);
}

/// Reads the primary key a record carries, if any.
pub(crate) fn primary_key_of(schema: &SchemaDescriptor, record: &Value) -> CoreResult<Option<Key>> {
    match record.get_path(schema.primary_key) {
        Some(value) if !value.is_null() => to_key(value).map(Some),
        _ => Ok(None),
    }
}

/// Stamps and writes one record, returning it with its primary key set.
///
/// The record counts as an update when it carries a primary key.
pub(crate) fn write_record(
    tx: &mut HostTransaction,
    schema: &SchemaDescriptor,
    stamper: &Timestamper,
    mut record: Value,
) -> CoreResult<Value> {
    if record.as_map().is_none() {
        return Err(CoreError::invalid_params(format!(
            "records in {} must be maps, got {}",
            schema.name,
            record.type_name()
        )));
    }
    let primary_key = primary_key_of(schema, &record)?;
    stamp(schema, stamper, &mut record, primary_key.is_some());

    if let (Some(policy), Some(key)) = (schema.active_timestamps(), &primary_key) {
        let missing = record
            .get_path(policy.created_at_field)
            .map_or(true, Value::is_null);
        if missing {
            let stored = tx.get(schema.name, key)?;
            let created = stored
                .as_ref()
                .and_then(|old| old.get_path(policy.created_at_field))
                .filter(|value| !value.is_null())
                .or_else(|| record.get_path(policy.updated_at_field))
                .cloned();
            if let Some(created) = created {
                record.set_path(policy.created_at_field, created);
            }
        }
    }

    let key = tx.put(schema.name, record.clone())?;
    record.set_path(schema.primary_key, key.to_value());
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::error::ErrorCode;
    use crate::schema::{IndexDescriptor, SchemaRegistry, TimestampPolicy};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Card {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        pack_id: i64,
        front: String,
        level: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        created_at: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        updated_at: Option<String>,
    }

    fn card(pack_id: i64, front: &str, level: i64) -> Card {
        Card {
            id: None,
            pack_id,
            front: front.to_string(),
            level,
            created_at: None,
            updated_at: None,
        }
    }

    const CARD_INDEXES: &[IndexDescriptor] = &[
        IndexDescriptor::new("by_pack", "packId"),
        IndexDescriptor::new("by_level", "level"),
        IndexDescriptor::new("by_front", "front").unique(),
    ];
    static CARDS: SchemaDescriptor = SchemaDescriptor::new("cards", "id")
        .auto_increment(true)
        .indexes(CARD_INDEXES)
        .timestamps(TimestampPolicy::DEFAULT);

    async fn cards() -> Repository<Card> {
        let store = Store::in_memory();
        let registry = SchemaRegistry::new([&CARDS]).unwrap();
        store.open(StoreConfig::new("app", 1), registry).await.unwrap();
        store.repository(&CARDS)
    }

    #[tokio::test]
    async fn insert_assigns_key_and_both_stamps() {
        let repo = cards().await;
        let saved = repo.save(&card(1, "hola", 1)).await.unwrap();
        assert_eq!(saved.id, Some(1));
        assert!(saved.created_at.is_some());
        assert_eq!(saved.created_at, saved.updated_at);

        let found = repo.find_by_id(1i64).await.unwrap().unwrap();
        assert_eq!(found, saved);
    }

    #[tokio::test]
    async fn save_with_stored_key_only_refreshes_updated_at() {
        let repo = cards().await;
        let saved = repo.save(&card(1, "hola", 1)).await.unwrap();

        let mut changed = saved.clone();
        changed.level = 4;
        changed.created_at = None;
        let resaved = repo.save(&changed).await.unwrap();

        assert_eq!(resaved.created_at, saved.created_at);
        assert!(resaved.updated_at > saved.updated_at);
        assert_eq!(repo.count(None, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn save_many_is_all_or_nothing() {
        let repo = cards().await;
        let err = repo
            .save_many(&[card(1, "uno", 1), card(1, "uno", 2)])
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SaveManyFailed);
        assert!(matches!(
            err.storage_error(),
            Some(lexidb_storage::StorageError::Constraint { .. })
        ));
        assert_eq!(repo.count(None, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_merges_patch() {
        #[derive(Serialize)]
        struct LevelPatch {
            level: i64,
        }

        let repo = cards().await;
        let saved = repo.save(&card(1, "hola", 1)).await.unwrap();
        let updated = repo
            .update(1i64, &LevelPatch { level: 3 })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.level, 3);
        assert_eq!(updated.front, "hola");
        assert_eq!(updated.created_at, saved.created_at);
        assert!(updated.updated_at > saved.updated_at);

        assert!(repo.update(42i64, &LevelPatch { level: 1 }).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_rejects_non_map_patch() {
        let repo = cards().await;
        repo.save(&card(1, "hola", 1)).await.unwrap();
        let err = repo.update(1i64, &5).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn equality_lookups_use_indexes() {
        let repo = cards().await;
        repo.save_many(&[card(1, "a", 1), card(2, "b", 1), card(1, "c", 2)])
            .await
            .unwrap();

        let pack_one = repo.find_by("packId", 1).await.unwrap();
        assert_eq!(pack_one.iter().map(|c| c.front.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(repo.find_one_by("front", "b").await.unwrap().unwrap().pack_id, 2);
        assert!(repo.exists_by("level", 2).await.unwrap());
        assert!(!repo.exists_by("level", 9).await.unwrap());
    }

    #[tokio::test]
    async fn unindexed_field_fails_before_io() {
        let repo = cards().await;
        let before = repo.store.stats();
        let err = repo.find_by("back", "x").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::FieldNotIndexed);
        let after = repo.store.stats();
        assert_eq!(after.io_operations(), before.io_operations());
        assert_eq!(after.errors, before.errors + 1);
    }

    #[tokio::test]
    async fn count_variants() {
        let repo = cards().await;
        repo.save_many(&[card(1, "a", 1), card(1, "b", 2), card(2, "c", 2)])
            .await
            .unwrap();

        assert_eq!(repo.count(None, None).await.unwrap(), 3);
        assert_eq!(repo.count(Some("level"), None).await.unwrap(), 3);
        assert_eq!(repo.count(Some("level"), Some(Value::from(2))).await.unwrap(), 2);
        let err = repo.count(None, Some(Value::from(2))).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn delete_reports_existence_and_never_fails() {
        let repo = cards().await;
        repo.save(&card(1, "a", 1)).await.unwrap();
        assert!(repo.delete(1i64).await);
        assert!(!repo.delete(1i64).await);

        let unopened: Repository<Card> = Store::in_memory().repository(&CARDS);
        assert!(!unopened.delete(1i64).await);
    }

    #[tokio::test]
    async fn delete_many_skips_missing_ids() {
        let repo = cards().await;
        repo.save_many(&[card(1, "a", 1), card(1, "b", 1)]).await.unwrap();
        assert_eq!(repo.delete_many([1i64, 7, 2]).await.unwrap(), 2);
        assert_eq!(repo.count(None, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_keeps_key_generator() {
        let repo = cards().await;
        repo.save(&card(1, "a", 1)).await.unwrap();
        repo.clear().await.unwrap();
        assert_eq!(repo.count(None, None).await.unwrap(), 0);
        let next = repo.save(&card(1, "b", 1)).await.unwrap();
        assert_eq!(next.id, Some(2));
    }

    #[tokio::test]
    async fn explain_reports_plan_without_io() {
        let repo = cards().await;
        let plan = repo
            .explain(&QueryOptions::new().filter(QueryCondition::eq("packId", 1)))
            .unwrap();
        assert_eq!(plan, QueryPlan::IndexLookup { field: "packId".into() });
        assert_eq!(repo.store.stats().io_operations(), 0);
    }

    #[tokio::test]
    async fn add_timestamps_honours_update_flag() {
        let repo = cards().await;
        let inserted = repo.add_timestamps(Value::map(), false);
        assert!(inserted.get("createdAt").is_some());
        let updated = repo.add_timestamps(Value::map(), true);
        assert!(updated.get("createdAt").is_none());
        assert!(updated.get("updatedAt").is_some());
    }
}

//! Store manager: connection lifecycle and version upgrades.

use crate::clock::{Clock, SystemClock, Timestamper};
use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::migration::{apply_schemas, missing_from_host, UpgradeReport};
use crate::repository::Repository;
use crate::schema::{SchemaDescriptor, SchemaRegistry};
use crate::stats::{StatsSnapshot, StoreStats};
use lexidb_storage::{HostConnection, HostTransaction, StoreFactory, TransactionMode};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Lifecycle of a store's connection.
///
/// `Ready` is terminal: a store is never closed once opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// `open` has not been called, or the last attempt failed.
    Uninitialized,
    /// An `open` is in flight; other callers wait for it.
    Opening,
    /// Connected and upgraded.
    Ready,
}

const UNINITIALIZED: u8 = 0;
const OPENING: u8 = 1;

tokio::task_local! {
    /// Identity of the store whose read-write transaction body runs on this task.
    static WRITER_HELD: usize;
}

/// An open connection plus what it was opened with.
#[derive(Debug)]
pub(crate) struct Connection {
    pub(crate) host: HostConnection,
    pub(crate) registry: SchemaRegistry,
    pub(crate) config: StoreConfig,
    pub(crate) upgrade: UpgradeReport,
}

struct StoreInner {
    factory: StoreFactory,
    connection: OnceCell<Connection>,
    state: AtomicU8,
    stamper: Timestamper,
    stats: StoreStats,
}

/// Handle to the data-access core.
///
/// A `Store` is the context object every repository and transaction runs
/// against. Clones share one connection.
///
/// # Example
///
/// ```rust
/// use lexidb_core::{SchemaDescriptor, SchemaRegistry, Store, StoreConfig, StoreState};
///
/// static NOTES: SchemaDescriptor = SchemaDescriptor::new("notes", "id").auto_increment(true);
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = Store::in_memory();
/// assert_eq!(store.state(), StoreState::Uninitialized);
///
/// store
///     .open(StoreConfig::new("app", 1), SchemaRegistry::new([&NOTES]).unwrap())
///     .await
///     .unwrap();
/// assert_eq!(store.state(), StoreState::Ready);
/// # });
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Creates an unopened store over `factory`.
    pub fn new(factory: StoreFactory) -> Self {
        Self::with_clock(factory, Arc::new(SystemClock))
    }

    /// Creates an unopened store that stamps records using `clock`.
    pub fn with_clock(factory: StoreFactory, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                factory,
                connection: OnceCell::new(),
                state: AtomicU8::new(UNINITIALIZED),
                stamper: Timestamper::new(clock),
                stats: StoreStats::new(),
            }),
        }
    }

    /// Creates an unopened store over a private factory.
    pub fn in_memory() -> Self {
        Self::new(StoreFactory::new())
    }

    /// Opens the host database and brings its schema up to `registry`.
    ///
    /// Concurrent callers share one in-flight open; once the store is ready
    /// further calls return immediately.
    ///
    /// # Errors
    ///
    /// Returns `StoreOpenFailed` if the host store refuses the open, for
    /// example because an older connection blocks the upgrade.
    pub async fn open(&self, config: StoreConfig, registry: SchemaRegistry) -> CoreResult<()> {
        let connection = self
            .inner
            .connection
            .get_or_try_init(|| async move {
                self.inner.state.store(OPENING, Ordering::SeqCst);
                let result = self.connect(config, registry);
                if result.is_err() {
                    self.inner.state.store(UNINITIALIZED, Ordering::SeqCst);
                    self.inner.stats.record_error();
                }
                result
            })
            .await?;
        tracing::debug!(store = %connection.config.name, version = connection.host.version(), "store ready");
        Ok(())
    }

    fn connect(&self, config: StoreConfig, registry: SchemaRegistry) -> CoreResult<Connection> {
        let mut report = UpgradeReport {
            from_version: self.inner.factory.version(&config.name).unwrap_or(0),
            to_version: config.version,
            operations: Vec::new(),
        };

        let host = self
            .inner
            .factory
            .open(&config.name, config.version, |change| {
                report.from_version = change.old_version();
                report.operations = apply_schemas(change, &registry)?;
                Ok(())
            })
            .map_err(|err| CoreError::StoreOpenFailed {
                name: config.name.clone(),
                version: config.version,
                source: Box::new(err.into()),
            })?;

        for operation in &report.operations {
            tracing::info!(store = %config.name, %operation, "schema upgrade");
        }
        let missing = missing_from_host(&host, &registry);
        if !missing.is_empty() {
            tracing::warn!(
                store = %config.name,
                version = config.version,
                ?missing,
                "declared collections or indexes are missing; bump the store version to create them"
            );
        }
        tracing::info!(
            store = %config.name,
            from = report.from_version,
            to = report.to_version,
            collections = registry.len(),
            "store opened"
        );

        Ok(Connection {
            host,
            registry,
            config,
            upgrade: report,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StoreState {
        if self.inner.connection.initialized() {
            return StoreState::Ready;
        }
        match self.inner.state.load(Ordering::SeqCst) {
            OPENING => StoreState::Opening,
            _ => StoreState::Uninitialized,
        }
    }

    /// Returns true once the store is ready.
    pub fn is_ready(&self) -> bool {
        self.state() == StoreState::Ready
    }

    /// Returns a repository over the collection described by `schema`.
    ///
    /// The store does not need to be open yet; operations fail with
    /// `NotInitialized` until it is.
    pub fn repository<T>(&self, schema: &'static SchemaDescriptor) -> Repository<T> {
        Repository::new(self.clone(), schema)
    }

    /// The registry the store was opened with.
    pub fn registry(&self) -> CoreResult<&SchemaRegistry> {
        Ok(&self.connection()?.registry)
    }

    /// The configuration the store was opened with.
    pub fn config(&self) -> CoreResult<&StoreConfig> {
        Ok(&self.connection()?.config)
    }

    /// What the open did to the host schema.
    pub fn upgrade_report(&self) -> CoreResult<&UpgradeReport> {
        Ok(&self.connection()?.upgrade)
    }

    /// Snapshot of the access counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// The factory this store opens databases from.
    pub fn factory(&self) -> &StoreFactory {
        &self.inner.factory
    }

    pub(crate) fn connection(&self) -> CoreResult<&Connection> {
        self.inner.connection.get().ok_or(CoreError::NotInitialized)
    }

    pub(crate) fn stamper(&self) -> &Timestamper {
        &self.inner.stamper
    }

    pub(crate) fn counters(&self) -> &StoreStats {
        &self.inner.stats
    }

    pub(crate) fn scan_warning_threshold(&self) -> usize {
        self.connection()
            .map_or(usize::MAX, |c| c.config.scan_warning_threshold)
    }

    /// Counts a failed call before handing it back.
    pub(crate) fn observe<R>(&self, result: CoreResult<R>) -> CoreResult<R> {
        if result.is_err() {
            self.inner.stats.record_error();
        }
        result
    }

    /// Runs `body` in a host transaction over `scope`, committing on success.
    ///
    /// Errors come back raw; callers add their own context.
    pub(crate) async fn run<R>(
        &self,
        scope: &[&str],
        mode: TransactionMode,
        body: impl FnOnce(&mut HostTransaction) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let mut tx = self.begin(scope, mode).await?;
        match body(&mut tx) {
            Ok(value) => {
                self.commit(&mut tx)?;
                Ok(value)
            }
            Err(err) => {
                self.abort(&mut tx);
                Err(err)
            }
        }
    }

    pub(crate) async fn begin(&self, scope: &[&str], mode: TransactionMode) -> CoreResult<HostTransaction> {
        let connection = self.connection()?;
        if mode == TransactionMode::ReadWrite && self.holds_writer() {
            return Err(CoreError::invalid_operation(
                "a read-write transaction body cannot start another read-write transaction; \
                 use the repositories' *_in_txn methods",
            ));
        }
        let tx = connection.host.transaction(scope, mode).await?;
        self.inner.stats.record_transaction_start();
        Ok(tx)
    }

    pub(crate) fn commit(&self, tx: &mut HostTransaction) -> CoreResult<()> {
        match tx.commit() {
            Ok(()) => {
                self.inner.stats.record_transaction_commit();
                Ok(())
            }
            Err(err) => {
                self.inner.stats.record_transaction_abort();
                Err(err.into())
            }
        }
    }

    pub(crate) fn abort(&self, tx: &mut HostTransaction) {
        if let Err(err) = tx.abort() {
            tracing::debug!(txid = %tx.id(), error = %err, "abort of finished transaction ignored");
        }
        self.inner.stats.record_transaction_abort();
    }

    /// Runs `body` with this store marked as holding the writer on the
    /// current task.
    pub(crate) async fn holding_writer<F: std::future::Future>(&self, body: F) -> F::Output {
        WRITER_HELD.scope(self.identity(), body).await
    }

    fn holds_writer(&self) -> bool {
        WRITER_HELD
            .try_with(|held| *held == self.identity())
            .unwrap_or(false)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

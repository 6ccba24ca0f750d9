//! Store statistics.
//!
//! Counters for monitoring how the query engine touches the host store.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = store.stats();
//! println!("full scans: {}", stats.full_scans);
//! println!("index lookups: {}", stats.index_lookups);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Store statistics.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct StoreStats {
    // Record counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,

    // Access path counters
    full_scans: AtomicU64,
    index_lookups: AtomicU64,
    cursor_scans: AtomicU64,

    // Transaction counters
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,

    errors: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_reads(&self, records: usize) {
        self.reads.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_full_scan(&self) {
        self.full_scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cursor_scan(&self) {
        self.cursor_scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            reads: load(&self.reads),
            writes: load(&self.writes),
            deletes: load(&self.deletes),
            full_scans: load(&self.full_scans),
            index_lookups: load(&self.index_lookups),
            cursor_scans: load(&self.cursor_scans),
            transactions_started: load(&self.transactions_started),
            transactions_committed: load(&self.transactions_committed),
            transactions_aborted: load(&self.transactions_aborted),
            errors: load(&self.errors),
        }
    }
}

/// A point-in-time snapshot of store statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Records returned from the host store.
    pub reads: u64,
    /// Records written.
    pub writes: u64,
    /// Records deleted.
    pub deletes: u64,
    /// Unordered scans of a whole collection.
    ///
    /// High counts may indicate missing indexes.
    pub full_scans: u64,
    /// Point lookups by primary key or index.
    pub index_lookups: u64,
    /// Cursor scans over an index or key range.
    pub cursor_scans: u64,
    /// Transactions started.
    pub transactions_started: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions aborted.
    pub transactions_aborted: u64,
    /// Errors returned to callers.
    pub errors: u64,
}

impl StatsSnapshot {
    /// Sum of the counters that reflect host store access.
    pub fn io_operations(&self) -> u64 {
        self.reads
            + self.writes
            + self.deletes
            + self.full_scans
            + self.index_lookups
            + self.cursor_scans
            + self.transactions_started
    }
}

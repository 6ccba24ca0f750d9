//! # LexiDB Core
//!
//! Schema-driven data access over the LexiDB host store.
//!
//! This crate provides:
//! - Schema registry: the collections, primary keys, indexes and timestamp
//!   policies an application declares once at startup
//! - Store manager: one shared connection per [`Store`], opened once and
//!   upgraded additively when the declared version increases
//! - [`Repository<T>`]: typed CRUD, index lookups, range scans and a query
//!   planner that only ever touches indexed fields
//! - Transaction coordinator: [`Store::transaction`] and
//!   [`Store::batch_transaction`] for all-or-nothing work across collections
//! - One error taxonomy, [`CoreError`], with stable [`ErrorCode`]s
//!
//! ## Usage
//!
//! ```
//! use lexidb_core::{
//!     IndexDescriptor, QueryCondition, QueryOptions, SchemaDescriptor, SchemaRegistry,
//!     SortDirection, Store, StoreConfig, TimestampPolicy,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Word {
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     id: Option<i64>,
//!     word: String,
//!     level: i64,
//! }
//!
//! const WORD_INDEXES: &[IndexDescriptor] = &[
//!     IndexDescriptor::new("by_word", "word").unique(),
//!     IndexDescriptor::new("by_level", "level"),
//! ];
//! static WORDS: SchemaDescriptor = SchemaDescriptor::new("words", "id")
//!     .auto_increment(true)
//!     .indexes(WORD_INDEXES)
//!     .timestamps(TimestampPolicy::DEFAULT);
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let store = Store::in_memory();
//! store
//!     .open(StoreConfig::new("vocab", 1), SchemaRegistry::new([&WORDS]).unwrap())
//!     .await
//!     .unwrap();
//!
//! let words = store.repository::<Word>(&WORDS);
//! words.save(&Word { id: None, word: "apple".into(), level: 1 }).await.unwrap();
//! words.save(&Word { id: None, word: "brave".into(), level: 2 }).await.unwrap();
//!
//! let hard = words
//!     .find_all(
//!         &QueryOptions::new()
//!             .filter(QueryCondition::gte("level", 2))
//!             .order_by("word", SortDirection::Asc),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(hard.len(), 1);
//! assert_eq!(hard[0].word, "brave");
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod migration;
mod repository;
mod schema;
mod stats;
mod store;
mod transaction;

pub use clock::{Clock, SystemClock, Timestamper};
pub use config::{StoreConfig, DEFAULT_SCAN_WARNING_THRESHOLD};
pub use error::{CoreError, CoreResult, ErrorCode};
pub use migration::{MigrationOperation, UpgradeReport};
pub use repository::{
    Condition, OrderBy, QueryCondition, QueryOptions, QueryPlan, RangeOptions, Repository,
    SortDirection,
};
pub use schema::{FieldAccess, IndexDescriptor, SchemaDescriptor, SchemaRegistry, TimestampPolicy};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{Store, StoreState};
pub use transaction::{BatchAction, BatchOperation, CollectionHandle, TransactionHandles};

pub use lexidb_codec::{from_value, to_value, Key, Value};
pub use lexidb_storage::{Direction, KeyRange, StorageError, StoreFactory, TransactionMode};

//! # LexiDB Storage
//!
//! In-process host store for LexiDB, modelled on a browser's indexed
//! database: named, versioned databases made of object stores with
//! secondary indexes, accessed through scoped transactions.
//!
//! ## Design Principles
//!
//! - Records are [`Value`](lexidb_codec::Value) maps keyed by an in-line primary key
//! - Schema changes happen only inside a version upgrade
//! - Transactions read a snapshot and install their writes atomically
//! - One read-write transaction at a time per database; readers never wait
//! - Cursors are lazy and stop reading as soon as the caller stops
//!
//! ## Example
//!
//! ```rust
//! use lexidb_codec::Value;
//! use lexidb_storage::{IndexParams, ObjectStoreParams, StoreFactory, TransactionMode};
//!
//! # tokio_test_block(async {
//! let factory = StoreFactory::new();
//! let conn = factory
//!     .open("vocab", 1, |upgrade| {
//!         upgrade.create_object_store("words", ObjectStoreParams::new("id").auto_increment(true))?;
//!         upgrade.create_index("words", "by_level", IndexParams::new("level"))
//!     })
//!     .unwrap();
//!
//! let mut tx = conn.transaction(&["words"], TransactionMode::ReadWrite).await.unwrap();
//! let key = tx.put("words", Value::from_pairs([("level", 2)])).unwrap();
//! tx.commit().unwrap();
//! assert_eq!(key.as_integer(), Some(1));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod error;
mod factory;
mod index;
mod object_store;
mod pending;
mod range;
mod transaction;
mod types;

pub use connection::HostConnection;
pub use error::{StorageError, StorageResult};
pub use factory::{StoreFactory, VersionChange};
pub use range::KeyRange;
pub use transaction::{Cursor, CursorEntry, HostTransaction, TransactionState};
pub use types::{Direction, IndexParams, ObjectStoreParams, TransactionId, TransactionMode};

//! # LexiDB Testkit
//!
//! Test utilities for LexiDB.
//!
//! This crate provides:
//! - Vocabulary-domain fixtures: schemas, entities and an opened [`TestStore`]
//! - A controllable [`ManualClock`] for deterministic timestamps
//! - Property-based test generators using proptest
//! - [`init_tracing`] for log output in tests (`RUST_LOG=lexidb_core=debug`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lexidb_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn saves_a_word() {
//!     let store = TestStore::open().await;
//!     let words = store.vocabularies();
//!     let saved = words.save(&Vocabulary::new(1, "apple", "manzana", 1)).await.unwrap();
//!     assert!(saved.id.is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

//! # LexiDB Codec
//!
//! Record and key model for LexiDB.
//!
//! This crate provides:
//! - [`Value`], the structured record type every collection stores
//! - [`Key`], the totally ordered key type used by primary keys and indexes
//! - [`to_value`] / [`from_value`], a serde bridge so typed entities can be
//!   stored as records and read back
//!
//! ## Usage
//!
//! ```
//! use lexidb_codec::{from_value, to_value, Key, Value};
//!
//! let record = to_value(&("apple", 3)).unwrap();
//! assert_eq!(record, Value::Array(vec![Value::from("apple"), Value::from(3)]));
//!
//! let back: (String, i64) = from_value(&record).unwrap();
//! assert_eq!(back.1, 3);
//!
//! assert!(Key::from(1i64) < Key::from("a"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod convert;
mod error;
mod key;
mod value;

pub use convert::{from_value, to_value};
pub use error::{CodecError, CodecResult};
pub use key::Key;
pub use value::Value;

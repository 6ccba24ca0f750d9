//! Schema registry: static descriptors of every collection.
//!
//! Descriptors are plain `const` data, declared once per collection:
//!
//! ```rust
//! use lexidb_core::{IndexDescriptor, SchemaDescriptor, SchemaRegistry, TimestampPolicy};
//!
//! const WORD_INDEXES: &[IndexDescriptor] = &[
//!     IndexDescriptor::new("word", "word").unique(),
//!     IndexDescriptor::new("level", "level"),
//! ];
//!
//! static WORDS: SchemaDescriptor = SchemaDescriptor::new("words", "id")
//!     .auto_increment(true)
//!     .indexes(WORD_INDEXES)
//!     .timestamps(TimestampPolicy::DEFAULT);
//!
//! let registry = SchemaRegistry::new([&WORDS]).unwrap();
//! assert_eq!(WORDS.queryable_fields(), vec!["id", "word", "level"]);
//! assert!(registry.get("words").is_some());
//! ```

use crate::error::{CoreError, CoreResult};
use std::collections::HashSet;

/// A declared secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Index name in the host store.
    pub name: &'static str,
    /// Dotted path of the indexed field.
    pub key_path: &'static str,
    /// Whether two records may share a key.
    pub unique: bool,
}

impl IndexDescriptor {
    /// Declares a non-unique index.
    pub const fn new(name: &'static str, key_path: &'static str) -> Self {
        Self {
            name,
            key_path,
            unique: false,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Which fields carry creation and modification stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampPolicy {
    /// Field stamped once, on insert.
    pub created_at_field: &'static str,
    /// Field stamped on every write.
    pub updated_at_field: &'static str,
    /// Whether stamping happens at all.
    pub enabled: bool,
}

impl TimestampPolicy {
    /// `createdAt` / `updatedAt`, enabled.
    pub const DEFAULT: Self = Self {
        created_at_field: "createdAt",
        updated_at_field: "updatedAt",
        enabled: true,
    };

    /// Custom field names, enabled.
    pub const fn fields(created_at_field: &'static str, updated_at_field: &'static str) -> Self {
        Self {
            created_at_field,
            updated_at_field,
            enabled: true,
        }
    }

    /// Turns stamping off while keeping the field names.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// How a queryable field is reached in the host store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccess {
    /// The field is the primary key.
    PrimaryKey,
    /// The field is covered by a secondary index.
    Index(&'static IndexDescriptor),
}

impl FieldAccess {
    /// Host index name, or `None` for the primary key.
    pub fn index_name(&self) -> Option<&'static str> {
        match self {
            FieldAccess::PrimaryKey => None,
            FieldAccess::Index(index) => Some(index.name),
        }
    }
}

/// Immutable description of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaDescriptor {
    /// Collection (object store) name.
    pub name: &'static str,
    /// Dotted path of the primary key.
    pub primary_key: &'static str,
    /// Whether the store assigns missing primary keys.
    pub auto_increment: bool,
    /// Declared secondary indexes.
    pub indexes: &'static [IndexDescriptor],
    /// Timestamp policy, if any.
    pub timestamps: Option<TimestampPolicy>,
}

impl SchemaDescriptor {
    /// Declares a collection with no indexes and no timestamps.
    pub const fn new(name: &'static str, primary_key: &'static str) -> Self {
        Self {
            name,
            primary_key,
            auto_increment: false,
            indexes: &[],
            timestamps: None,
        }
    }

    /// Sets whether primary keys are generated.
    #[must_use]
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Sets the secondary indexes.
    #[must_use]
    pub const fn indexes(mut self, indexes: &'static [IndexDescriptor]) -> Self {
        self.indexes = indexes;
        self
    }

    /// Sets the timestamp policy.
    #[must_use]
    pub const fn timestamps(mut self, policy: TimestampPolicy) -> Self {
        self.timestamps = Some(policy);
        self
    }

    /// The timestamp policy, if one is set and enabled.
    pub fn active_timestamps(&self) -> Option<&TimestampPolicy> {
        self.timestamps.as_ref().filter(|p| p.enabled)
    }

    /// The closed set of queryable fields: the primary key, then every
    /// index key path in declaration order.
    pub fn queryable_fields(&self) -> Vec<&'static str> {
        std::iter::once(self.primary_key)
            .chain(self.indexes.iter().map(|i| i.key_path))
            .collect()
    }

    /// Resolves a field by key path, or an index by name.
    pub fn resolve(&self, field: &str) -> Option<FieldAccess> {
        if field == self.primary_key {
            return Some(FieldAccess::PrimaryKey);
        }
        let indexes: &'static [IndexDescriptor] = self.indexes;
        indexes
            .iter()
            .find(|i| i.key_path == field)
            .or_else(|| indexes.iter().find(|i| i.name == field))
            .map(FieldAccess::Index)
    }

    /// Resolves a field or fails with `FieldNotIndexed`.
    pub fn require(&self, field: &str) -> CoreResult<FieldAccess> {
        self.resolve(field).ok_or_else(|| CoreError::FieldNotIndexed {
            collection: self.name.to_string(),
            field: field.to_string(),
            indexed: self
                .queryable_fields()
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::invalid_params("collection name is empty"));
        }
        if self.primary_key.is_empty() {
            return Err(CoreError::invalid_params(format!(
                "collection {} has an empty primary key",
                self.name
            )));
        }
        let mut names = HashSet::new();
        let mut paths = HashSet::new();
        for index in self.indexes {
            if index.name.is_empty() || index.key_path.is_empty() {
                return Err(CoreError::invalid_params(format!(
                    "collection {} declares an index with an empty name or key path",
                    self.name
                )));
            }
            if !names.insert(index.name) {
                return Err(CoreError::invalid_params(format!(
                    "collection {} declares index {} twice",
                    self.name, index.name
                )));
            }
            if !paths.insert(index.key_path) {
                return Err(CoreError::invalid_params(format!(
                    "collection {} indexes {} twice",
                    self.name, index.key_path
                )));
            }
        }
        Ok(())
    }
}

/// The ordered set of collections a store is opened with.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<&'static SchemaDescriptor>,
}

impl SchemaRegistry {
    /// Builds and validates a registry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` for an empty registry, duplicate collection
    /// names, empty primary keys, or duplicate index names or key paths
    /// within a collection.
    pub fn new(schemas: impl IntoIterator<Item = &'static SchemaDescriptor>) -> CoreResult<Self> {
        let schemas: Vec<_> = schemas.into_iter().collect();
        if schemas.is_empty() {
            return Err(CoreError::invalid_params("schema registry is empty"));
        }
        let mut names = HashSet::new();
        for schema in &schemas {
            schema.validate()?;
            if !names.insert(schema.name) {
                return Err(CoreError::invalid_params(format!(
                    "collection {} is declared twice",
                    schema.name
                )));
            }
        }
        Ok(Self { schemas })
    }

    /// All descriptors, in declaration order.
    pub fn schemas(&self) -> &[&'static SchemaDescriptor] {
        &self.schemas
    }

    /// Looks up a descriptor by collection name.
    pub fn get(&self, name: &str) -> Option<&'static SchemaDescriptor> {
        self.schemas.iter().copied().find(|s| s.name == name)
    }

    /// Collection names, in declaration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.schemas.iter().map(|s| s.name).collect()
    }

    /// Number of collections.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Always false for a validated registry.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

//! Additive schema upgrades.
//!
//! When a store is opened at a higher version, every collection in the
//! registry that the host store lacks is created, and every declared index
//! missing from an existing collection is added and back-filled. Nothing is
//! ever dropped or renamed.

use crate::schema::SchemaRegistry;
use lexidb_storage::{HostConnection, IndexParams, ObjectStoreParams, StorageResult, VersionChange};
use std::fmt;

/// An operation performed during an upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOperation {
    /// Created a new collection.
    CreateCollection {
        /// Name of the collection.
        name: String,
        /// Primary key path.
        key_path: String,
        /// Whether keys are generated.
        auto_increment: bool,
    },
    /// Created an index.
    CreateIndex {
        /// Collection the index is on.
        collection: String,
        /// Name of the index.
        index_name: String,
        /// Indexed field path.
        key_path: String,
        /// Whether the index is unique.
        unique: bool,
    },
}

impl fmt::Display for MigrationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationOperation::CreateCollection { name, key_path, .. } => {
                write!(f, "create collection {name} (key {key_path})")
            }
            MigrationOperation::CreateIndex {
                collection,
                index_name,
                key_path,
                ..
            } => write!(f, "create index {collection}.{index_name} on {key_path}"),
        }
    }
}

/// What an open did to the host schema.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpgradeReport {
    /// Version before opening; 0 for a new store.
    pub from_version: u32,
    /// Version after opening.
    pub to_version: u32,
    /// Operations applied, in order. Empty when no upgrade ran.
    pub operations: Vec<MigrationOperation>,
}

impl UpgradeReport {
    /// Returns true if an upgrade ran.
    pub fn upgraded(&self) -> bool {
        self.from_version != self.to_version
    }
}

/// Creates whatever the registry declares and the host store lacks.
pub(crate) fn apply_schemas(
    change: &mut VersionChange,
    registry: &SchemaRegistry,
) -> StorageResult<Vec<MigrationOperation>> {
    let mut operations = Vec::new();
    for schema in registry.schemas() {
        if !change.has_object_store(schema.name) {
            change.create_object_store(
                schema.name,
                ObjectStoreParams::new(schema.primary_key).auto_increment(schema.auto_increment),
            )?;
            operations.push(MigrationOperation::CreateCollection {
                name: schema.name.to_string(),
                key_path: schema.primary_key.to_string(),
                auto_increment: schema.auto_increment,
            });
        }

        let existing = change.index_names(schema.name)?;
        for index in schema.indexes {
            if existing.iter().any(|name| name == index.name) {
                continue;
            }
            change.create_index(
                schema.name,
                index.name,
                IndexParams::new(index.key_path).unique(index.unique),
            )?;
            operations.push(MigrationOperation::CreateIndex {
                collection: schema.name.to_string(),
                index_name: index.name.to_string(),
                key_path: index.key_path.to_string(),
                unique: index.unique,
            });
        }
    }
    Ok(operations)
}

/// Lists registry entries the host store lacks, which happens when schemas
/// change without a version bump.
pub(crate) fn missing_from_host(connection: &HostConnection, registry: &SchemaRegistry) -> Vec<String> {
    let mut missing = Vec::new();
    for schema in registry.schemas() {
        match connection.index_names(schema.name) {
            Err(_) => missing.push(schema.name.to_string()),
            Ok(existing) => missing.extend(
                schema
                    .indexes
                    .iter()
                    .filter(|index| !existing.iter().any(|name| name == index.name))
                    .map(|index| format!("{}.{}", schema.name, index.name)),
            ),
        }
    }
    missing
}

//! Store configuration.

/// Default number of records above which a full scan logs a warning.
pub const DEFAULT_SCAN_WARNING_THRESHOLD: usize = 1000;

/// Configuration for opening a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Name of the host database.
    pub name: String,

    /// Schema version. Raising it triggers an additive upgrade on open.
    pub version: u32,

    /// Full scans returning more records than this log a warning.
    pub scan_warning_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "lexidb".to_string(),
            version: 1,
            scan_warning_threshold: DEFAULT_SCAN_WARNING_THRESHOLD,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for `name` at `version`.
    #[must_use]
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            ..Self::default()
        }
    }

    /// Sets the database name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets the full-scan warning threshold.
    #[must_use]
    pub const fn scan_warning_threshold(mut self, records: usize) -> Self {
        self.scan_warning_threshold = records;
        self
    }
}

//! Test fixtures and store helpers.
//!
//! Provides the vocabulary-domain schemas and entities the integration tests
//! run against, plus an opened in-memory store with a controllable clock.

use chrono::{DateTime, Duration, TimeZone, Utc};
use lexidb_core::{
    Clock, IndexDescriptor, Repository, SchemaDescriptor, SchemaRegistry, Store, StoreConfig,
    StoreFactory, TimestampPolicy,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Name of the database [`TestStore`] opens.
pub const TEST_STORE_NAME: &str = "lexidb-test";

const WORD_PACK_INDEXES: &[IndexDescriptor] = &[
    IndexDescriptor::new("by_name", "name").unique(),
    IndexDescriptor::new("by_created", "createdAt"),
];

const CARD_PACK_INDEXES: &[IndexDescriptor] = &[
    IndexDescriptor::new("by_word_pack", "wordPackId"),
    IndexDescriptor::new("by_created", "createdAt"),
];

const VOCABULARY_INDEXES: &[IndexDescriptor] = &[
    IndexDescriptor::new("by_word", "word"),
    IndexDescriptor::new("by_word_pack", "wordPackId"),
    IndexDescriptor::new("by_level", "level"),
    IndexDescriptor::new("by_created", "createdAt"),
];

const PRACTICE_RECORD_INDEXES: &[IndexDescriptor] = &[
    IndexDescriptor::new("by_vocabulary", "vocabularyId"),
    IndexDescriptor::new("by_score", "score"),
    IndexDescriptor::new("by_practiced", "practicedAt"),
];

/// Word packs: named groups of vocabulary.
pub static WORD_PACKS: SchemaDescriptor = SchemaDescriptor::new("wordPacks", "id")
    .auto_increment(true)
    .indexes(WORD_PACK_INDEXES)
    .timestamps(TimestampPolicy::DEFAULT);

/// Card packs built from a word pack.
pub static CARD_PACKS: SchemaDescriptor = SchemaDescriptor::new("cardPacks", "id")
    .auto_increment(true)
    .indexes(CARD_PACK_INDEXES)
    .timestamps(TimestampPolicy::DEFAULT);

/// Individual words.
pub static VOCABULARIES: SchemaDescriptor = SchemaDescriptor::new("vocabularies", "id")
    .auto_increment(true)
    .indexes(VOCABULARY_INDEXES)
    .timestamps(TimestampPolicy::DEFAULT);

/// Practice results. Carries its own `practicedAt` instead of stamps.
pub static PRACTICE_RECORDS: SchemaDescriptor = SchemaDescriptor::new("practiceRecords", "id")
    .auto_increment(true)
    .indexes(PRACTICE_RECORD_INDEXES);

/// Registry of every fixture schema.
pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new([&WORD_PACKS, &CARD_PACKS, &VOCABULARIES, &PRACTICE_RECORDS])
        .expect("fixture schemas are valid")
}

/// A named group of vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordPack {
    /// Primary key, assigned on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Unique display name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation stamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Modification stamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl WordPack {
    /// An unsaved pack.
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            description: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// A flashcard deck drawn from a word pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPack {
    /// Primary key, assigned on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Owning word pack.
    pub word_pack_id: i64,
    /// Display name.
    pub name: String,
    /// Creation stamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Modification stamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CardPack {
    /// An unsaved card pack.
    pub fn new(word_pack_id: i64, name: &str) -> Self {
        Self {
            id: None,
            word_pack_id,
            name: name.to_string(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// One word and its meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vocabulary {
    /// Primary key, assigned on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Owning word pack.
    pub word_pack_id: i64,
    /// The word.
    pub word: String,
    /// Its meaning.
    pub meaning: String,
    /// Difficulty level.
    pub level: i64,
    /// Creation stamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Modification stamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Vocabulary {
    /// An unsaved word.
    pub fn new(word_pack_id: i64, word: &str, meaning: &str, level: i64) -> Self {
        Self {
            id: None,
            word_pack_id,
            word: word.to_string(),
            meaning: meaning.to_string(),
            level,
            created_at: None,
            updated_at: None,
        }
    }
}

/// The outcome of practicing one word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeRecord {
    /// Primary key, assigned on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Practiced word.
    pub vocabulary_id: i64,
    /// Score out of 100.
    pub score: i64,
    /// Whether the answer was right.
    pub correct: bool,
    /// When the practice happened.
    pub practiced_at: String,
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// A clock stopped at `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    /// A clock stopped at 2024-01-01T00:00:00Z.
    pub fn epoch() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("valid date"))
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    /// Sets the clock.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// An opened in-memory store over the fixture schemas.
#[derive(Debug, Clone)]
pub struct TestStore {
    /// The store.
    pub store: Store,
    /// The clock the store stamps records with.
    pub clock: Arc<ManualClock>,
}

impl TestStore {
    /// Opens the fixture schemas at version 1 on a private factory.
    pub async fn open() -> Self {
        Self::open_with(StoreFactory::new(), StoreConfig::new(TEST_STORE_NAME, 1)).await
    }

    /// Opens the fixture schemas with `config` on `factory`.
    pub async fn open_with(factory: StoreFactory, config: StoreConfig) -> Self {
        let clock = Arc::new(ManualClock::epoch());
        let store = Store::with_clock(factory, clock.clone());
        store
            .open(config, registry())
            .await
            .expect("Failed to open test store");
        Self { store, clock }
    }

    /// Word pack repository.
    pub fn word_packs(&self) -> Repository<WordPack> {
        self.store.repository(&WORD_PACKS)
    }

    /// Card pack repository.
    pub fn card_packs(&self) -> Repository<CardPack> {
        self.store.repository(&CARD_PACKS)
    }

    /// Vocabulary repository.
    pub fn vocabularies(&self) -> Repository<Vocabulary> {
        self.store.repository(&VOCABULARIES)
    }

    /// Practice record repository.
    pub fn practice_records(&self) -> Repository<PracticeRecord> {
        self.store.repository(&PRACTICE_RECORDS)
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Installs a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_registry_is_valid() {
        let registry = registry();
        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.names(),
            vec!["wordPacks", "cardPacks", "vocabularies", "practiceRecords"]
        );
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::epoch();
        let start = clock.now();
        assert_eq!(clock.now(), start);
        clock.advance(Duration::seconds(5));
        assert_eq!(clock.now() - start, Duration::seconds(5));
    }

    #[tokio::test]
    async fn test_store_is_ready() {
        let store = TestStore::open().await;
        assert!(store.is_ready());
        assert_eq!(store.upgrade_report().unwrap().operations.len(), 4 + 11);
    }
}

//! Repository behaviour against the vocabulary fixtures.

use chrono::Duration;
use lexidb_core::{
    Clock, CoreError, ErrorCode, QueryCondition, QueryOptions, RangeOptions, SortDirection, StoreConfig,
    StoreFactory, Value,
};
use lexidb_testkit::prelude::*;

async fn seed_levels(store: &TestStore) {
    let words = store.vocabularies();
    for (level, word) in (1..=5).zip(["one", "two", "three", "four", "five"]) {
        words
            .save(&Vocabulary::new(1, word, word, level))
            .await
            .unwrap();
        store.clock.advance(Duration::seconds(1));
    }
}

fn words_of(records: &[Vocabulary]) -> Vec<&str> {
    records.iter().map(|v| v.word.as_str()).collect()
}

#[tokio::test]
async fn save_then_find_round_trips() {
    init_tracing();
    let store = TestStore::open().await;
    let words = store.vocabularies();

    let original = Vocabulary::new(2, "apple", "manzana", 3);
    let saved = words.save(&original).await.unwrap();
    let found = words.find_by_id(saved.id.unwrap()).await.unwrap().unwrap();

    assert!(found.id.is_some());
    assert!(found.created_at.is_some());
    assert!(found.updated_at.is_some());
    assert_eq!(
        Vocabulary {
            id: None,
            created_at: None,
            updated_at: None,
            ..found
        },
        original
    );
}

#[tokio::test]
async fn each_save_advances_updated_at() {
    let store = TestStore::open().await;
    let words = store.vocabularies();

    // the clock never moves here; stamps must still increase
    let first = words.save(&Vocabulary::new(1, "apple", "manzana", 1)).await.unwrap();
    let second = words.save(&first).await.unwrap();
    let third = words.save(&second).await.unwrap();

    assert_eq!(first.created_at, third.created_at);
    assert!(second.updated_at > first.updated_at);
    assert!(third.updated_at > second.updated_at);
    assert_eq!(words.count(None, None).await.unwrap(), 1);
}

#[tokio::test]
async fn restored_records_keep_their_creation_stamp() {
    let store = TestStore::open().await;
    let words = store.vocabularies();
    let restored_at = "2020-01-01T00:00:00.000000Z".to_string();

    let mut backup = Vocabulary::new(1, "apple", "manzana", 1);
    backup.id = Some(7);
    backup.created_at = Some(restored_at.clone());
    let saved = words.save(&backup).await.unwrap();

    assert_eq!(saved.created_at, Some(restored_at.clone()));
    assert!(saved.updated_at.as_deref() > Some(restored_at.as_str()));
    let found = words.find_by_id(7i64).await.unwrap().unwrap();
    assert_eq!(found.created_at, Some(restored_at));

    let mut unstamped = Vocabulary::new(1, "pear", "pera", 1);
    unstamped.id = Some(8);
    let saved = words.save(&unstamped).await.unwrap();
    assert!(saved.created_at.is_some());
    assert_eq!(saved.created_at, saved.updated_at);

    let next = words.save(&Vocabulary::new(1, "plum", "ciruela", 1)).await.unwrap();
    assert_eq!(next.id, Some(9));
}

#[tokio::test]
async fn ordered_pagination_skips_then_takes() {
    let store = TestStore::open().await;
    seed_levels(&store).await;

    let page = store
        .vocabularies()
        .find_all(
            &QueryOptions::new()
                .order_by("createdAt", SortDirection::Asc)
                .limit(2)
                .offset(1),
        )
        .await
        .unwrap();
    assert_eq!(words_of(&page), vec!["two", "three"]);
}

#[tokio::test]
async fn newest_first_by_created_at() {
    let store = TestStore::open().await;
    let words = store.vocabularies();
    words.save(&Vocabulary::new(1, "a", "a", 1)).await.unwrap();
    store.clock.advance(Duration::milliseconds(10));
    words.save(&Vocabulary::new(1, "b", "b", 1)).await.unwrap();

    let newest = words
        .find_all(&QueryOptions::new().order_by("createdAt", SortDirection::Desc))
        .await
        .unwrap();
    assert_eq!(words_of(&newest), vec!["b", "a"]);
}

#[tokio::test]
async fn range_bounds_honour_openness() {
    let store = TestStore::open().await;
    seed_levels(&store).await;
    let words = store.vocabularies();

    let open_lower = words
        .find_by_range(
            "level",
            Some(Value::from(2)),
            Some(Value::from(4)),
            RangeOptions::new().lower_open(true),
        )
        .await
        .unwrap();
    assert_eq!(words_of(&open_lower), vec!["three", "four"]);

    let closed = words
        .find_by_range("level", Some(Value::from(2)), Some(Value::from(4)), RangeOptions::new())
        .await
        .unwrap();
    assert_eq!(words_of(&closed), vec!["two", "three", "four"]);

    let open_upper = words
        .find_by_range(
            "level",
            Some(Value::from(2)),
            Some(Value::from(4)),
            RangeOptions::new().upper_open(true),
        )
        .await
        .unwrap();
    assert_eq!(words_of(&open_upper), vec!["two", "three"]);
}

#[tokio::test]
async fn range_direction_and_limit() {
    let store = TestStore::open().await;
    seed_levels(&store).await;

    let top_two = store
        .vocabularies()
        .find_by_range(
            "level",
            None,
            None,
            RangeOptions::new().direction(SortDirection::Desc).limit(2),
        )
        .await
        .unwrap();
    assert_eq!(words_of(&top_two), vec!["five", "four"]);
}

#[tokio::test]
async fn time_window_from_lower_bound() {
    let store = TestStore::open().await;
    let words = store.vocabularies();
    words.save(&Vocabulary::new(1, "old", "old", 1)).await.unwrap();
    store.clock.advance(Duration::hours(12));
    let midnight = store.clock.now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
    words.save(&Vocabulary::new(1, "new", "new", 1)).await.unwrap();

    let today = words
        .find_by_range("createdAt", Some(Value::from(midnight)), None, RangeOptions::new())
        .await
        .unwrap();
    assert_eq!(words_of(&today), vec!["new"]);
}

#[tokio::test]
async fn inverted_range_is_a_range_query_failure() {
    let store = TestStore::open().await;
    let err = store
        .vocabularies()
        .find_by_range("level", Some(Value::from(4)), Some(Value::from(2)), RangeOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RangeQueryFailed);
}

#[tokio::test]
async fn unindexed_field_fails_on_any_contents() {
    let store = TestStore::open().await;
    let words = store.vocabularies();
    let options = QueryOptions::new().filter(QueryCondition::eq("unindexed", 1));

    let empty = words.find_all(&options).await.unwrap_err();
    assert_eq!(empty.code(), ErrorCode::FieldNotIndexed);

    seed_levels(&store).await;
    let seeded = words.find_all(&options).await.unwrap_err();
    match seeded {
        CoreError::FieldNotIndexed {
            collection,
            field,
            indexed,
        } => {
            assert_eq!(collection, "vocabularies");
            assert_eq!(field, "unindexed");
            assert_eq!(indexed, vec!["id", "word", "wordPackId", "level", "createdAt"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn point_lookups_by_index() {
    let store = TestStore::open().await;
    let words = store.vocabularies();
    words
        .save_many(&[
            Vocabulary::new(1, "apple", "manzana", 1),
            Vocabulary::new(2, "pear", "pera", 1),
            Vocabulary::new(1, "plum", "ciruela", 2),
        ])
        .await
        .unwrap();

    assert_eq!(words_of(&words.find_by("wordPackId", 1).await.unwrap()), vec!["apple", "plum"]);
    assert_eq!(words.find_one_by("word", "pear").await.unwrap().unwrap().meaning, "pera");
    assert!(words.find_one_by("word", "grape").await.unwrap().is_none());
    assert!(words.exists_by("level", 2).await.unwrap());
    // index names address the same field
    assert!(words.exists_by("by_level", 2).await.unwrap());
}

#[tokio::test]
async fn update_returns_none_for_missing_record() {
    let store = TestStore::open().await;
    let words = store.vocabularies();
    let patch = Value::from_pairs([("level", Value::from(5))]);
    assert!(words.update(99i64, &patch).await.unwrap().is_none());
    assert_eq!(words.count(None, None).await.unwrap(), 0);
}

#[tokio::test]
async fn update_keeps_unpatched_fields() {
    let store = TestStore::open().await;
    let words = store.vocabularies();
    let saved = words.save(&Vocabulary::new(1, "apple", "manzana", 1)).await.unwrap();
    store.clock.advance(Duration::seconds(1));

    let patch = Value::from_pairs([("meaning", Value::from("poma"))]);
    let updated = words.update(saved.id.unwrap(), &patch).await.unwrap().unwrap();
    assert_eq!(updated.meaning, "poma");
    assert_eq!(updated.word, "apple");
    assert_eq!(updated.id, saved.id);
    assert_eq!(updated.created_at, saved.created_at);
    assert!(updated.updated_at > saved.updated_at);
}

#[tokio::test]
async fn deletes_are_best_effort() {
    let store = TestStore::open().await;
    seed_levels(&store).await;
    let words = store.vocabularies();

    assert!(words.delete(1i64).await);
    assert!(!words.delete(1i64).await);
    assert_eq!(words.delete_many([2i64, 3, 42]).await.unwrap(), 2);
    assert_eq!(words.count(None, None).await.unwrap(), 2);
    assert_eq!(words.delete_many(Vec::<i64>::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn count_needs_a_field_for_a_value() {
    let store = TestStore::open().await;
    seed_levels(&store).await;
    let words = store.vocabularies();

    assert_eq!(words.count(None, None).await.unwrap(), 5);
    assert_eq!(words.count(Some("wordPackId"), Some(Value::from(1))).await.unwrap(), 5);
    assert_eq!(words.count(Some("level"), Some(Value::from(9))).await.unwrap(), 0);
    let err = words.count(None, Some(Value::from(1))).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidParams);
}

#[tokio::test]
async fn clear_empties_only_its_collection() {
    let store = TestStore::open().await;
    seed_levels(&store).await;
    store.word_packs().save(&WordPack::new("basics")).await.unwrap();

    store.vocabularies().clear().await.unwrap();
    assert_eq!(store.vocabularies().count(None, None).await.unwrap(), 0);
    assert_eq!(store.word_packs().count(None, None).await.unwrap(), 1);
}

#[tokio::test]
async fn collections_without_timestamps_are_left_alone() {
    let store = TestStore::open().await;
    let practice = store.practice_records();
    let saved = practice
        .save(&PracticeRecord {
            id: None,
            vocabulary_id: 1,
            score: 80,
            correct: true,
            practiced_at: "2024-01-01T00:00:00.000000Z".into(),
        })
        .await
        .unwrap();

    let raw = store.store.repository::<Value>(&PRACTICE_RECORDS);
    let record = raw.find_by_id(saved.id.unwrap()).await.unwrap().unwrap();
    assert!(record.get("createdAt").is_none());
    assert!(record.get("updatedAt").is_none());
    assert_eq!(record.get("score"), Some(&Value::from(80)));
}

#[tokio::test]
async fn unique_index_rejects_duplicates() {
    let store = TestStore::open().await;
    let packs = store.word_packs();
    packs.save(&WordPack::new("basics")).await.unwrap();
    let err = packs.save(&WordPack::new("basics")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::StorageError);
    assert_eq!(packs.count(None, None).await.unwrap(), 1);
}

#[tokio::test]
async fn large_full_scan_still_returns_everything() {
    let store = TestStore::open_with(
        StoreFactory::new(),
        StoreConfig::new(TEST_STORE_NAME, 1).scan_warning_threshold(2),
    )
    .await;
    seed_levels(&store).await;

    let all = store.vocabularies().find_all(&QueryOptions::new()).await.unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(store.stats().full_scans, 1);
}

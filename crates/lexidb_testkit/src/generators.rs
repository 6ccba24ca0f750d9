//! Property-based test generators using proptest.
//!
//! Provides strategies for vocabulary entities and for queries over the
//! indexed fields of [`VOCABULARIES`](crate::fixtures::VOCABULARIES).

use crate::fixtures::Vocabulary;
use lexidb_core::{Condition, QueryCondition, QueryOptions, SortDirection, Value};
use proptest::prelude::*;

/// Highest level [`vocabulary_strategy`] generates.
pub const MAX_LEVEL: i64 = 5;

/// Word packs [`vocabulary_strategy`] spreads words over.
pub const WORD_PACK_IDS: std::ops::RangeInclusive<i64> = 1..=3;

/// Strategy for lowercase words.
pub fn word_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex")
}

/// Strategy for unsaved words.
pub fn vocabulary_strategy() -> impl Strategy<Value = Vocabulary> {
    (WORD_PACK_IDS, word_strategy(), word_strategy(), 1..=MAX_LEVEL).prop_map(
        |(pack, word, meaning, level)| Vocabulary::new(pack, &word, &meaning, level),
    )
}

/// Strategy for a batch of unsaved words.
pub fn vocabulary_batch_strategy(max: usize) -> impl Strategy<Value = Vec<Vocabulary>> {
    prop::collection::vec(vocabulary_strategy(), 0..=max)
}

fn bound_strategy(field: &'static str) -> BoxedStrategy<i64> {
    match field {
        "level" => (0..=MAX_LEVEL + 1).boxed(),
        _ => (0..=*WORD_PACK_IDS.end() + 1).boxed(),
    }
}

/// Strategy for one condition on `level` or `wordPackId`.
pub fn condition_strategy() -> impl Strategy<Value = QueryCondition> {
    prop_oneof![Just("level"), Just("wordPackId")].prop_flat_map(|field| {
        let value = bound_strategy(field);
        let pair = (bound_strategy(field), bound_strategy(field), any::<bool>(), any::<bool>());
        prop_oneof![
            value.clone().prop_map(move |v| QueryCondition::eq(field, v)),
            value.clone().prop_map(move |v| QueryCondition::gt(field, v)),
            value.clone().prop_map(move |v| QueryCondition::gte(field, v)),
            value.clone().prop_map(move |v| QueryCondition::lt(field, v)),
            value.prop_map(move |v| QueryCondition::lte(field, v)),
            pair.prop_map(move |(a, b, lower_open, upper_open)| {
                QueryCondition::new(
                    field,
                    Condition::Range {
                        lower: Value::from(a.min(b)),
                        upper: Value::from(a.max(b)),
                        lower_open,
                        upper_open,
                    },
                )
            }),
        ]
    })
}

/// Strategy for queries over the word fixture: up to three conditions, an
/// optional ordering and optional pagination.
pub fn query_options_strategy() -> impl Strategy<Value = QueryOptions> {
    (
        prop::collection::vec(condition_strategy(), 0..=3),
        prop::option::of((
            prop_oneof![Just("level"), Just("word"), Just("createdAt")],
            prop_oneof![Just(SortDirection::Asc), Just(SortDirection::Desc)],
        )),
        prop::option::of(0usize..4),
        prop::option::of(0usize..6),
    )
        .prop_map(|(conditions, order, offset, limit)| {
            let mut options = conditions
                .into_iter()
                .fold(QueryOptions::new(), QueryOptions::filter);
            if let Some((field, direction)) = order {
                options = options.order_by(field, direction);
            }
            if let Some(offset) = offset {
                options = options.offset(offset);
            }
            if let Some(limit) = limit {
                options = options.limit(limit);
            }
            options
        })
}

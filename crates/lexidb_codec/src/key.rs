//! Host store keys.

use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// A key that the host store can order and index.
///
/// Keys are totally ordered across kinds: every number sorts before every
/// text string, which sorts before every byte string, which sorts before
/// every array. Arrays compare element by element, then by length.
///
/// Integers and floats share the `Number` kind and compare numerically.
/// Integers beyond 2^53 lose precision, as they would in a browser store.
#[derive(Debug, Clone)]
pub enum Key {
    /// Numeric key (never NaN, `-0.0` normalized to `0.0`).
    Number(f64),
    /// Text key.
    Text(String),
    /// Binary key.
    Bytes(Vec<u8>),
    /// Compound key.
    Array(Vec<Key>),
}

impl Key {
    /// Converts a record value into a key.
    ///
    /// Returns `None` for values that are not valid keys: null, booleans,
    /// maps, NaN, and arrays containing any of those.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Integer(n) => Some(Key::number(*n as f64)),
            Value::Float(f) if !f.is_nan() => Some(Key::number(*f)),
            Value::Text(s) => Some(Key::Text(s.clone())),
            Value::Bytes(b) => Some(Key::Bytes(b.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
            _ => None,
        }
    }

    /// Converts the key back into a record value.
    ///
    /// Integral numbers within the `i64` range become `Value::Integer`.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.2e18 {
                    Value::Integer(*n as i64)
                } else {
                    Value::Float(*n)
                }
            }
            Key::Text(s) => Value::Text(s.clone()),
            Key::Bytes(b) => Value::Bytes(b.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    /// Returns the key as an integer if it is an integral number.
    pub fn as_integer(&self) -> Option<i64> {
        self.to_value().as_integer()
    }

    fn number(n: f64) -> Key {
        // -0.0 and 0.0 are the same key
        Key::Number(if n == 0.0 { 0.0 } else { n })
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Text(_) => 1,
            Key::Bytes(_) => 2,
            Key::Array(_) => 3,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Key::Text(a), Key::Text(b)) => a.cmp(b),
            (Key::Bytes(a), Key::Bytes(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::number(n as f64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn invalid_values_are_not_keys() {
        assert!(Key::from_value(&Value::Null).is_none());
        assert!(Key::from_value(&Value::Bool(true)).is_none());
        assert!(Key::from_value(&Value::map()).is_none());
        assert!(Key::from_value(&Value::Float(f64::NAN)).is_none());
        assert!(Key::from_value(&Value::Array(vec![Value::Null])).is_none());
    }

    #[test]
    fn kinds_are_ordered() {
        let number = Key::from(1_000_000i64);
        let text = Key::from("");
        let bytes = Key::Bytes(vec![]);
        let array = Key::Array(vec![]);
        assert!(number < text);
        assert!(text < bytes);
        assert!(bytes < array);
    }

    #[test]
    fn integers_and_floats_compare_numerically() {
        let int = Key::from_value(&Value::Integer(2)).unwrap();
        let float = Key::from_value(&Value::Float(2.0)).unwrap();
        let bigger = Key::from_value(&Value::Float(2.5)).unwrap();
        assert_eq!(int, float);
        assert!(int < bigger);
    }

    #[test]
    fn negative_zero_is_zero() {
        let neg = Key::from_value(&Value::Float(-0.0)).unwrap();
        assert_eq!(neg, Key::from(0i64));
    }

    #[test]
    fn integral_numbers_round_trip_as_integers() {
        assert_eq!(Key::from(42i64).to_value(), Value::Integer(42));
        assert_eq!(
            Key::from_value(&Value::Float(1.5)).unwrap().to_value(),
            Value::Float(1.5)
        );
    }

    #[test]
    fn arrays_compare_elementwise_then_by_length() {
        let short = Key::Array(vec![Key::from(1i64)]);
        let long = Key::Array(vec![Key::from(1i64), Key::from(0i64)]);
        let high = Key::Array(vec![Key::from(2i64)]);
        assert!(short < long);
        assert!(long < high);
    }

    proptest! {
        #[test]
        fn integer_key_order_matches_integer_order(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            prop_assert_eq!(Key::from(a).cmp(&Key::from(b)), a.cmp(&b));
        }

        #[test]
        fn text_key_order_matches_string_order(a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
            prop_assert_eq!(Key::from(a.as_str()).cmp(&Key::from(b.as_str())), a.cmp(&b));
        }
    }
}

//! Bridge between serde types and record values.
//!
//! Conversion goes through `ciborium`'s serde value model, so any type that
//! serializes to CBOR can be stored as a record.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use ciborium::value::{Integer, Value as CborValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Converts a serializable value into a record value.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> CodecResult<Value> {
    let cbor =
        CborValue::serialized(value).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    from_cbor_value(cbor)
}

/// Converts a record value into a deserializable type.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> CodecResult<T> {
    to_cbor_value(value)
        .deserialized()
        .map_err(|e| CodecError::decoding_failed(e.to_string()))
}

fn from_cbor_value(cbor: CborValue) -> CodecResult<Value> {
    Ok(match cbor {
        CborValue::Null => Value::Null,
        CborValue::Bool(b) => Value::Bool(b),
        CborValue::Integer(n) => {
            let wide = i128::from(n);
            Value::Integer(i64::try_from(wide).map_err(|_| CodecError::IntegerOverflow)?)
        }
        CborValue::Float(f) => Value::Float(f),
        CborValue::Text(s) => Value::Text(s),
        CborValue::Bytes(b) => Value::Bytes(b),
        CborValue::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_cbor_value)
                .collect::<CodecResult<_>>()?,
        ),
        CborValue::Map(pairs) => {
            let mut fields = BTreeMap::new();
            for (k, v) in pairs {
                let CborValue::Text(name) = k else {
                    return Err(CodecError::invalid_structure(
                        "record field names must be text",
                    ));
                };
                fields.insert(name, from_cbor_value(v)?);
            }
            Value::Map(fields)
        }
        CborValue::Tag(_, inner) => from_cbor_value(*inner)?,
        _ => return Err(CodecError::unsupported_type("unknown CBOR value")),
    })
}

fn to_cbor_value(value: &Value) -> CborValue {
    match value {
        Value::Null => CborValue::Null,
        Value::Bool(b) => CborValue::Bool(*b),
        Value::Integer(n) => CborValue::Integer(Integer::from(*n)),
        Value::Float(f) => CborValue::Float(*f),
        Value::Text(s) => CborValue::Text(s.clone()),
        Value::Bytes(b) => CborValue::Bytes(b.clone()),
        Value::Array(items) => CborValue::Array(items.iter().map(to_cbor_value).collect()),
        Value::Map(fields) => CborValue::Map(
            fields
                .iter()
                .map(|(k, v)| (CborValue::Text(k.clone()), to_cbor_value(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Word {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        text: String,
        ease_factor: f64,
        tags: Vec<String>,
        note: Option<String>,
    }

    fn word() -> Word {
        Word {
            id: None,
            text: "apple".into(),
            ease_factor: 2.5,
            tags: vec!["fruit".into()],
            note: None,
        }
    }

    #[test]
    fn struct_becomes_map_with_serde_names() {
        let value = to_value(&word()).unwrap();
        let map = value.as_map().unwrap();
        assert!(!map.contains_key("id"));
        assert_eq!(value.get("text"), Some(&Value::from("apple")));
        assert_eq!(value.get("easeFactor"), Some(&Value::Float(2.5)));
        assert_eq!(value.get("note"), Some(&Value::Null));
    }

    #[test]
    fn injected_fields_survive_decoding() {
        let mut value = to_value(&word()).unwrap();
        value.set_path("id", Value::Integer(7));
        let decoded: Word = from_value(&value).unwrap();
        assert_eq!(decoded.id, Some(7));
        assert_eq!(decoded.text, "apple");
    }

    #[test]
    fn integer_widens_into_float_field() {
        let mut value = to_value(&word()).unwrap();
        value.set_path("easeFactor", Value::Integer(3));
        let decoded: Word = from_value(&value).unwrap();
        assert_eq!(decoded.ease_factor, 3.0);
    }

    #[test]
    fn value_passes_through_unchanged() {
        let value = Value::from_pairs([("a", Value::from(1)), ("b", Value::from("x"))]);
        assert_eq!(to_value(&value).unwrap(), value);
        let back: Value = from_value(&value).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn decoding_reports_missing_fields() {
        let err = from_value::<Word>(&Value::map()).unwrap_err();
        assert!(matches!(err, CodecError::DecodingFailed { .. }));
    }

    #[test]
    fn oversized_integer_is_rejected() {
        let err = to_value(&u64::MAX).unwrap_err();
        assert_eq!(err, CodecError::IntegerOverflow);
    }
}

//! Typed access to untyped Traccar telemetry records.
//!
//! Records arrive as JSON objects. Every accessor returns `None` when the key
//! is missing or holds a value of the wrong JSON type, so callers can skip
//! malformed fields one at a time.

use serde_json::{Map, Value};

/// A raw telemetry record or attribute bag.
pub type Record = Map<String, Value>;

pub fn number(record: &Record, key: &str) -> Option<f64> {
    record.get(key).and_then(Value::as_f64).filter(|v| v.is_finite())
}

/// Integer view of a numeric field, truncating any fraction.
pub fn integer(record: &Record, key: &str) -> Option<i64> {
    match record.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        _ => None,
    }
}

pub fn boolean(record: &Record, key: &str) -> Option<bool> {
    record.get(key).and_then(Value::as_bool)
}

pub fn string<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

pub fn object<'a>(record: &'a Record, key: &str) -> Option<&'a Record> {
    record.get(key).and_then(Value::as_object)
}

/// Latitude/longitude pair of a position record, when both are numbers.
pub fn coordinates(record: &Record) -> Option<(f64, f64)> {
    Some((number(record, "latitude")?, number(record, "longitude")?))
}

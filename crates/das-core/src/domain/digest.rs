//! Canonical JSON and content digests for artifacts and fixtures.
//!
//! Canonical form: object keys sorted by UTF-16 code units, integer-valued
//! floats collapsed to integers, compact encoding. Two artifacts that differ
//! only in key order hash identically.

use das_store::ContentDigest;
use serde_json::{Map, Number, Value};

use crate::domain::error::{DasError, Result};

fn canonicalize(value: &Value) -> Result<Value> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key])?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => Ok(Value::Array(
            items.iter().map(canonicalize).collect::<Result<Vec<_>>>()?,
        )),
        Value::Number(n) if n.is_f64() => {
            let f = n.as_f64().unwrap_or(f64::NAN);
            if !f.is_finite() {
                return Err(DasError::NonCanonical(
                    "NaN/Infinity not permitted in canonical JSON".to_string(),
                ));
            }
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(Value::Number(Number::from(f as i64)))
            } else {
                Ok(value.clone())
            }
        }
        other => Ok(other.clone()),
    }
}

/// Canonical compact JSON encoding of `value`.
pub fn canonical_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(&canonicalize(value)?)?)
}

/// SHA-256 of the canonical encoding.
pub fn compute_digest(value: &Value) -> Result<ContentDigest> {
    Ok(ContentDigest::from_bytes(canonical_json(value)?.as_bytes()))
}

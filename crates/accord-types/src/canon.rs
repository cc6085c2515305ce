//! Canonical byte encoding for hashed and signed payloads.
//!
//! Every structure that is hashed or signed goes through this module first.
//! The encoding is compact JSON with lexicographically ordered object keys,
//! UTF-8 strings, and no whitespace. Two inputs produce identical bytes iff
//! they are semantically equal.
//!
//! Exactness rules:
//! - Floats are rejected (`AC_ERR_300`). Trust deltas enter canonical
//!   payloads as fixed-point decimal strings with three fractional digits.
//! - Identifiers are 32-char lowercase hex; hashes are 64-char lowercase hex.
//! - Timestamps render as `YYYY-MM-DDTHH:MM:SS.sssZ` (millisecond precision).
//!
//! `serde_json::Value` is the input tree; it cannot contain cycles, and its
//! default `Map` is BTree-backed so object keys are already sorted. The
//! encoder still sorts explicitly so the contract does not depend on a
//! cargo feature.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::{AccordError, Result};

/// Encode a value tree to its canonical byte form.
///
/// # Errors
/// Returns [`AccordError::Canonicalization`] if the tree contains a number
/// that is not exactly representable as an integer (i.e. any float).
pub fn to_canonical_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    write_value(&mut out, value)?;
    Ok(out)
}

fn write_value(out: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.extend_from_slice(i.to_string().as_bytes());
            } else if let Some(u) = n.as_u64() {
                out.extend_from_slice(u.to_string().as_bytes());
            } else {
                return Err(AccordError::Canonicalization {
                    reason: format!("non-integer number {n} in hashed context"),
                });
            }
        }
        Value::String(s) => {
            // serde_json handles the full JSON escape table.
            let escaped = serde_json::to_string(s)
                .map_err(|e| AccordError::Canonicalization {
                    reason: e.to_string(),
                })?;
            out.extend_from_slice(escaped.as_bytes());
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                let escaped = serde_json::to_string(key)
                    .map_err(|e| AccordError::Canonicalization {
                        reason: e.to_string(),
                    })?;
                out.extend_from_slice(escaped.as_bytes());
                out.push(b':');
                write_value(out, &map[key.as_str()])?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

/// Canonical timestamp form: `YYYY-MM-DDTHH:MM:SS.sssZ`.
#[must_use]
pub fn canon_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Canonical hash form: 64-char lowercase hex.
#[must_use]
pub fn canon_hash(hash: &[u8; 32]) -> String {
    hex::encode(hash)
}

/// Canonical trust-delta form: fixed-point with three fractional digits.
#[must_use]
pub fn canon_delta(delta: Decimal) -> String {
    format!("{:.3}", delta.round_dp(3))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

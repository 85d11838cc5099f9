//! Small helpers shared by the field engine, the connection layer and tests.

use crate::errors::{DbError, Result};
use bson::DateTime;
use bson::oid::ObjectId;
use chrono::Utc;
use std::cmp::Ordering;

/// Current time truncated to millisecond precision.
#[must_use]
pub fn now() -> DateTime {
    DateTime::from_millis(Utc::now().timestamp_millis())
}

#[must_use]
pub fn new_object_id() -> ObjectId {
    ObjectId::new()
}

/// Compares two dotted version strings to the lesser precision of the two,
/// so `3.2` equals `3.2.11` while `3.2.0` is less than `3.2.11`.
///
/// Returns `1` when `v1 > v2`, `-1` when `v1 < v2`, `0` otherwise.
///
/// # Errors
/// `DbError::Config` when a component is not an integer.
pub fn compare_versions(v1: &str, v2: &str) -> Result<i64> {
    let parse = |s: &str| {
        s.trim()
            .parse::<i64>()
            .map_err(|e| DbError::Config(format!("invalid version component {s:?}: {e}")))
    };
    for (a, b) in v1.split('.').zip(v2.split('.')) {
        match parse(a)?.cmp(&parse(b)?) {
            Ordering::Less => return Ok(-1),
            Ordering::Greater => return Ok(1),
            Ordering::Equal => {}
        }
    }
    Ok(0)
}

/// Percent-decodes a URI component, turning `+` into a space.
///
/// Returns `None` on a truncated or non-hex escape or when the result is not UTF-8.
#[must_use]
pub fn query_unescape(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let &[hi, lo] = bytes.get(i + 1..i + 3)? else {
                    return None;
                };
                out.push((hex_value(hi)? << 4) | hex_value(lo)?);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

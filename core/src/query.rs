//! Query-string encoding for GET requests.
//!
//! Nested maps and arrays use bracket notation (`a[b]=x`, `a[0]=y`). Keys and
//! values are percent-encoded, so the brackets travel as `%5B`/`%5D`. Keys
//! keep the order of the caller's mapping.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

/// Bytes left as-is in a URI component: alphanumerics and `-_.!~*'()`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Encode `query` as `?k=v&...`, or an empty string when it has no entries.
///
/// `query` must serialize to a map (or to `null`, treated as empty).
pub fn encode<Q>(query: &Q) -> Result<String, Error>
where
    Q: Serialize + ?Sized,
{
    let mut parts = Vec::new();
    match serde_json::to_value(query)? {
        Value::Null => {}
        Value::Object(map) => {
            for (key, value) in &map {
                push_pairs(escape(key), value, &mut parts);
            }
        }
        other => {
            return Err(Error::Serialization(format!(
                "query must be a map, got {other}"
            )))
        }
    }

    if parts.is_empty() {
        return Ok(String::new());
    }
    Ok(format!("?{}", parts.join("&")))
}

fn push_pairs(prefix: String, value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                push_pairs(format!("{prefix}%5B{}%5D", escape(key)), nested, parts);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                push_pairs(format!("{prefix}%5B{index}%5D"), nested, parts);
            }
        }
        Value::String(text) => parts.push(format!("{prefix}={}", escape(text))),
        Value::Number(number) => parts.push(format!("{prefix}={number}")),
        Value::Bool(flag) => parts.push(format!("{prefix}={flag}")),
        Value::Null => parts.push(format!("{prefix}=")),
    }
}

fn escape(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

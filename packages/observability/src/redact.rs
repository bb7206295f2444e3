//! Field redaction applied before a log entry is written anywhere.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Placeholder written in place of a sensitive value.
pub const REDACTED: &str = "[REDACTED]";

/// Longest string value written verbatim.
const MAX_VALUE_LEN: usize = 512;

/// Substrings that mark a field name as sensitive.
const DENYLIST_KEYS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "totp",
    "token",
    "otc",
    "code",
    "authorization",
    "cookie",
];

/// Redact every field of a structured log entry.
pub fn redact_fields(fields: HashMap<String, Value>) -> HashMap<String, Value> {
    fields
        .into_iter()
        .map(|(k, v)| {
            let clean = redact_value(&k, &v);
            (k, clean)
        })
        .collect()
}

/// Redact a single value given the key it was recorded under.
pub fn redact_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(s) => redact_string(s),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), redact_value(k, v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|i| redact_value(key, i)).collect()),
        _ => value.clone(),
    }
}

fn redact_string(raw: &str) -> Value {
    if looks_like_sensitive_value(raw) {
        return Value::String(REDACTED.to_string());
    }
    if raw.len() > MAX_VALUE_LEN {
        let mut cut = MAX_VALUE_LEN;
        while !raw.is_char_boundary(cut) {
            cut -= 1;
        }
        return Value::String(format!("{}…[TRUNCATED:{}]", &raw[..cut], raw.len()));
    }
    Value::String(raw.to_string())
}

fn looks_like_sensitive_value(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("bearer ") {
        return true;
    }
    // JWT-shaped
    if raw.matches('.').count() == 2
        && raw.len() > 40
        && !raw.contains(|c: char| c == ' ' || c == '/' || c == ':')
    {
        return true;
    }
    is_long_hex(raw) || is_long_base64(raw)
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|entry| lower.contains(entry))
}

fn is_long_hex(value: &str) -> bool {
    value.len() > 48 && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_long_base64(value: &str) -> bool {
    value.len() > 48
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=' || c == '_')
}

//! Tolerant field coercion for vendor JSON.
//!
//! Vendors encode flags as booleans, 0/1 numbers, or free-text status
//! words (sometimes localized). Numbers arrive as JSON numbers or strings.

use serde_json::Value;

use crate::chain::normalize;

const TRUTHY: &[&str] = &[
    "1", "true", "yes", "on", "aktif", "active", "enabled", "available", "allowed", "live",
    "trading",
];

const FALSY: &[&str] = &[
    "0",
    "false",
    "no",
    "off",
    "nonaktif",
    "inactive",
    "disabled",
    "unavailable",
    "notallowed",
    "suspended",
    "offline",
    "halted",
    "closed",
    "maintenance",
];

/// Map a vendor flag to a bool.
///
/// Known status words win; anything else falls back to JSON truthiness
/// (non-empty string, non-zero number, `true`, any array or object).
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => coerce_str(s).unwrap_or(!s.is_empty()),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Status-word lookup only; `None` when the word is not in either vocabulary.
pub fn coerce_str(raw: &str) -> Option<bool> {
    let word = normalize(raw);
    if TRUTHY.contains(&word.as_str()) {
        Some(true)
    } else if FALSY.contains(&word.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse a number that may be encoded as a JSON number or a string.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

/// First present, non-null field among `keys`.
pub fn pick<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// First present field among `keys`, rendered as a trimmed string.
pub fn pick_str(obj: &Value, keys: &[&str]) -> Option<String> {
    pick(obj, keys).and_then(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

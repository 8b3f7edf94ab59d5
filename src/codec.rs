// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hardened JSON encoding and decoding.
//!
//! Tool results come from servers the host does not control, so this codec
//! defends the host on both directions:
//!
//! - [`encode`] never fails. Composite values are walked pre-order with a
//!   visited set and a depth ceiling; anything revisited or nested past the
//!   ceiling is replaced by a sentinel string instead of recursing.
//! - [`decode`] never raises. Raw text containing dangerous key patterns
//!   (`__proto__`, bracket-accessor `constructor`/`prototype` spellings) or
//!   exceeding the size ceiling is returned unparsed. Keys on the dangerous
//!   list are dropped during the structural pass. The parsed value is owned
//!   and handed out immutably; no later stage can patch it in place.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Sentinel substituted for revisited or over-deep composite values.
pub const CYCLE_SENTINEL: &str = "[Circular]";

/// Maximum nesting depth tolerated during encoding. Kept comfortably below
/// serde_json's parser recursion limit (128) so truncated output stays
/// parseable by the same stack.
const MAX_ENCODE_DEPTH: usize = 100;

/// Dangerous key patterns scanned for (case-insensitively) in raw text
/// before parsing, including bracket-accessor spellings.
static DANGEROUS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)__proto__|\[\s*["']constructor["']\s*\]|\[\s*["']prototype["']\s*\]"#)
        .expect("dangerous-pattern regex is valid")
});

/// Keys dropped during the structural pass.
const DANGEROUS_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

/// Strings that only use the base64 alphabet are never parse candidates.
static BASE64_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/]+=*$").expect("base64 regex is valid"));

/// Prefixes that mark conversational text rather than a JSON document.
const HUMAN_MESSAGE_PREFIXES: [&str; 8] = [
    "\u{2705}", // check mark
    "\u{274c}", // cross mark
    "\u{26a0}", // warning sign
    "\u{2139}", // information
    "Success",
    "Error",
    "Warning",
    "Failed",
];

/// Result of a decode attempt.
///
/// Decoding is fail-safe, not fail-open: anything suspicious comes back as
/// [`Decoded::Raw`] with the original text untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Successfully parsed, with dangerous keys stripped.
    Parsed(Value),

    /// Returned unparsed (oversized, dangerous pattern, or not valid JSON).
    Raw(String),
}

impl Decoded {
    /// The parsed value, if any.
    pub fn as_parsed(&self) -> Option<&Value> {
        match self {
            Self::Parsed(v) => Some(v),
            Self::Raw(_) => None,
        }
    }

    /// Convert into a plain value either way.
    pub fn into_value(self) -> Value {
        match self {
            Self::Parsed(v) => v,
            Self::Raw(text) => Value::String(text),
        }
    }
}

/// Encode a value to a JSON string. Never fails.
///
/// Deterministic and side-effect-free: pathological nesting is cut off with
/// [`CYCLE_SENTINEL`] rather than overflowing the stack or raising.
pub fn encode(value: &Value) -> String {
    let mut visited: HashSet<*const Value> = HashSet::new();
    let bounded = bound_value(value, &mut visited, 0);
    serde_json::to_string(&bounded).unwrap_or_else(|_| format!("\"{CYCLE_SENTINEL}\""))
}

fn bound_value(value: &Value, visited: &mut HashSet<*const Value>, depth: usize) -> Value {
    match value {
        Value::Object(map) => {
            if depth >= MAX_ENCODE_DEPTH || !visited.insert(value as *const Value) {
                return Value::String(CYCLE_SENTINEL.to_string());
            }
            let bounded = map
                .iter()
                .map(|(k, v)| (k.clone(), bound_value(v, visited, depth + 1)))
                .collect();
            visited.remove(&(value as *const Value));
            Value::Object(bounded)
        }
        Value::Array(items) => {
            if depth >= MAX_ENCODE_DEPTH || !visited.insert(value as *const Value) {
                return Value::String(CYCLE_SENTINEL.to_string());
            }
            let bounded = items
                .iter()
                .map(|v| bound_value(v, visited, depth + 1))
                .collect();
            visited.remove(&(value as *const Value));
            Value::Array(bounded)
        }
        leaf => leaf.clone(),
    }
}

/// Decode text into a JSON value, or hand the original text back untouched.
///
/// `max_bytes` is the size ceiling enforced before any parsing happens.
pub fn decode(text: &str, max_bytes: usize) -> Decoded {
    if text.len() > max_bytes {
        tracing::warn!(
            size = text.len(),
            limit = max_bytes,
            "response exceeds size ceiling, returning unparsed"
        );
        return Decoded::Raw(text.to_string());
    }

    if DANGEROUS_PATTERN.is_match(text) {
        tracing::warn!("dangerous key pattern in response, returning unparsed");
        return Decoded::Raw(text.to_string());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value) => Decoded::Parsed(strip_dangerous_keys(value)),
        Err(_) => Decoded::Raw(text.to_string()),
    }
}

/// Recursively drop any key on the dangerous list, case-insensitively.
fn strip_dangerous_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| {
                    let lower = k.to_lowercase();
                    !DANGEROUS_KEYS.contains(&lower.as_str())
                })
                .map(|(k, v)| (k, strip_dangerous_keys(v)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(strip_dangerous_keys).collect())
        }
        leaf => leaf,
    }
}

/// Decide whether a string is worth attempting to parse as JSON.
///
/// Avoids parsing conversational text that happens to contain braces:
/// the string must be non-empty, not base64-alphabet-only, not start with a
/// human-message glyph or prefix, and (after trimming) start with `{`/`[`
/// and end with the matching `}`/`]`.
pub fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    if BASE64_ONLY.is_match(trimmed) {
        return false;
    }

    if HUMAN_MESSAGE_PREFIXES
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
    {
        return false;
    }

    (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_plain_value() {
        let value = json!({"a": 1, "b": [true, null, "x"]});
        let text = encode(&value);
        let round: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(round, value);
    }

    #[test]
    fn test_encode_never_fails_on_deep_nesting() {
        let mut value = json!("leaf");
        for _ in 0..512 {
            value = json!({ "next": value });
        }
        let text = encode(&value);
        assert!(text.contains(CYCLE_SENTINEL));
        // Still a finite, parseable document.
        assert!(serde_json::from_str::<Value>(&text).is_ok());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let value = json!({"z": [1, 2, 3], "a": {"nested": true}});
        assert_eq!(encode(&value), encode(&value));
    }

    #[test]
    fn test_decode_returns_original_on_proto() {
        let text = r#"{"a": 1, "__proto__": {"polluted": true}}"#;
        match decode(text, 1024) {
            Decoded::Raw(original) => assert_eq!(original, text),
            Decoded::Parsed(_) => panic!("__proto__ payload must not be parsed"),
        }
    }

    #[test]
    fn test_decode_proto_case_insensitive() {
        let text = r#"{"__PROTO__": 1}"#;
        assert!(matches!(decode(text, 1024), Decoded::Raw(_)));
    }

    #[test]
    fn test_decode_bracket_accessor_spellings() {
        assert!(matches!(
            decode(r#"{"a": "x['constructor']"}"#, 1024),
            Decoded::Raw(_)
        ));
        assert!(matches!(
            decode(r#"{"a": "x[ 'prototype' ]"}"#, 1024),
            Decoded::Raw(_)
        ));
    }

    #[test]
    fn test_decode_strips_dangerous_keys() {
        // "constructor" as a bare key passes the raw-text scan (no bracket
        // accessor) but is dropped during the structural pass.
        let text = r#"{"a": 1, "constructor": {"bad": true}, "nested": {"Prototype": 2, "ok": 3}}"#;
        match decode(text, 1024) {
            Decoded::Parsed(value) => {
                assert_eq!(value["a"], json!(1));
                assert!(value.get("constructor").is_none());
                assert!(value["nested"].get("Prototype").is_none());
                assert_eq!(value["nested"]["ok"], json!(3));
            }
            Decoded::Raw(_) => panic!("expected parse"),
        }
    }

    #[test]
    fn test_decode_oversized_returns_raw() {
        let text = r#"{"a": 1}"#;
        assert!(matches!(decode(text, 4), Decoded::Raw(_)));
        assert!(matches!(decode(text, 1024), Decoded::Parsed(_)));
    }

    #[test]
    fn test_decode_invalid_json_returns_raw() {
        let text = "not json at all";
        match decode(text, 1024) {
            Decoded::Raw(original) => assert_eq!(original, text),
            Decoded::Parsed(_) => panic!("expected raw"),
        }
    }

    #[test]
    fn test_looks_like_json_accepts_objects_and_arrays() {
        assert!(looks_like_json(r#"{"a": 1}"#));
        assert!(looks_like_json("  [1, 2, 3]  "));
    }

    #[test]
    fn test_looks_like_json_rejects_empty_and_plain_text() {
        assert!(!looks_like_json(""));
        assert!(!looks_like_json("   "));
        assert!(!looks_like_json("hello world"));
        assert!(!looks_like_json("result was {unclear}"));
    }

    #[test]
    fn test_looks_like_json_rejects_base64() {
        assert!(!looks_like_json("aGVsbG8gd29ybGQ="));
        assert!(!looks_like_json("SGVsbG8vd29ybGQrZm9v"));
    }

    #[test]
    fn test_looks_like_json_rejects_human_messages() {
        assert!(!looks_like_json("\u{2705} Done: {\"a\": 1}"));
        assert!(!looks_like_json("Error: {\"code\": 1}"));
        assert!(!looks_like_json("Warning {\"w\": true}"));
    }

    #[test]
    fn test_looks_like_json_requires_matching_delimiters() {
        assert!(!looks_like_json("{\"a\": 1]"));
        assert!(!looks_like_json("[1, 2}"));
    }

    #[test]
    fn test_decoded_into_value() {
        assert_eq!(
            Decoded::Parsed(json!({"a": 1})).into_value(),
            json!({"a": 1})
        );
        assert_eq!(
            Decoded::Raw("plain".to_string()).into_value(),
            json!("plain")
        );
    }
}

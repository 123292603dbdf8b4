//! Parsing of downloaded translation payloads and writing them into bodies
//!
//! Translation vendors do not always return clean JSON. Payloads may contain
//! escapes JSON does not allow (`\'`, `\ `), and may be a JSON string wrapping
//! the actual document.

use super::{TranslatedPayload, TranslationEntry};
use crate::content::BodyPath;
use crate::error::{Error, Result};
use serde_json::Value;
use std::borrow::Cow;

/// Characters that may follow a backslash in JSON
const JSON_ESCAPES: &[char] = &['"', '\\', '/', 'b', 'f', 'n', 'r', 't', 'u'];

/// Remove backslashes that do not start a valid JSON escape
pub fn strip_invalid_escapes(text: &str) -> Cow<'_, str> {
    if !text.contains('\\') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(next) if JSON_ESCAPES.contains(next) => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            _ => {}
        }
    }
    Cow::Owned(out)
}

fn parse_lenient(text: &str) -> Result<Value> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidPayload("empty payload".to_string()));
    }

    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(first) => {
            let cleaned = strip_invalid_escapes(text);
            if let Cow::Borrowed(_) = cleaned {
                return Err(Error::InvalidPayload(first.to_string()));
            }
            tracing::debug!(error = %first, "Payload is not valid JSON, retrying without stray escapes");
            serde_json::from_str(&cleaned).map_err(|e| Error::InvalidPayload(e.to_string()))
        }
    }
}

/// Parse a downloaded payload
///
/// Invalid escapes are removed when the text does not parse as-is. A payload that
/// decodes to a JSON string is decoded a second time.
pub fn parse_payload(text: &str) -> Result<TranslatedPayload> {
    let value = match parse_lenient(text)? {
        Value::String(inner) => parse_lenient(&inner)?,
        value => value,
    };

    if !value.is_object() {
        return Err(Error::InvalidPayload(format!(
            "expected an object, got {}",
            type_name(&value)
        )));
    }
    serde_json::from_value(value).map_err(|e| Error::InvalidPayload(e.to_string()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The value to write for a translation entry, or `None` to skip it
///
/// Null values are always skipped; with `skip_blank` so are `""`, `0` and
/// `false`. One-element arrays are unwrapped.
pub fn translation_value(value: &Value, skip_blank: bool) -> Option<Value> {
    match value {
        Value::Null => None,
        blank if skip_blank && is_blank(blank) => None,
        Value::Array(items) if items.len() == 1 => Some(items[0].clone()),
        other => Some(other.clone()),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Write every entry into `body`, creating missing containers
///
/// Entries the root item receives are written with `skip_blank`, so an empty
/// translation never clears a field. Returns the number of entries written.
pub fn apply_translations(
    body: &mut Value,
    entries: &[TranslationEntry],
    skip_blank: bool,
) -> Result<usize> {
    let mut written = 0;
    for entry in entries {
        let Some(value) = translation_value(&entry.value, skip_blank) else {
            continue;
        };
        BodyPath::parse(&entry.key)?.set(body, value)?;
        written += 1;
    }
    Ok(written)
}

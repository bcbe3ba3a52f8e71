//! Lenient readers for fields of untrusted persisted documents.
//!
//! Documents arrive from old clients, hand-edited exports and AI output, so
//! every accessor degrades to a caller-supplied fallback instead of failing.

use serde_json::Value;

/// Reads a finite number. Plain JSON numbers pass through, numeric strings
/// such as `"42"` or `" 3.5 "` are parsed, and anything else (missing values,
/// booleans, objects, non-finite parses) yields the fallback.
pub fn coerce_number(value: Option<&Value>, fallback: f64) -> f64 {
    match value {
        Some(Value::Number(number)) => match number.as_f64() {
            Some(parsed) if parsed.is_finite() => parsed,
            _ => fallback,
        },
        Some(Value::String(text)) => match text.trim().parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => parsed,
            _ => fallback,
        },
        _ => fallback,
    }
}

/// Reads a trimmed string. Missing values, non-strings and whitespace-only
/// strings yield the fallback.
pub fn coerce_non_empty_string(value: Option<&Value>, fallback: &str) -> String {
    match value {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                fallback.to_string()
            } else {
                trimmed.to_string()
            }
        }
        _ => fallback.to_string(),
    }
}

/// Reads a trimmed string where absence is meaningful: `None` when the value
/// is missing, not a string, or blank.
pub fn coerce_optional_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        _ => None,
    }
}

//! Input sanitization for user-supplied text.
//!
//! Strips HTML tags and the characters `<`, `>`, `'`, `"` before any
//! validation runs. Objects are walked recursively; arrays are not.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

const DANGEROUS: [char; 4] = ['<', '>', '\'', '"'];

/// Remove HTML tags and dangerous characters, then trim.
pub fn sanitize(input: &str) -> String {
    let without_tags = HTML_TAG.replace_all(input, "");
    without_tags
        .chars()
        .filter(|c| !DANGEROUS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitize every string field of a JSON object, descending into nested
/// objects.
///
/// Arrays (and everything inside them) and non-string scalars are returned
/// unchanged. A top-level string is sanitized directly.
pub fn sanitize_deep(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize(s)),
        Value::Object(map) => Value::Object(sanitize_object(map)),
        other => other.clone(),
    }
}

fn sanitize_object(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let cleaned = match value {
                Value::String(s) => Value::String(sanitize(s)),
                Value::Object(inner) => Value::Object(sanitize_object(inner)),
                other => other.clone(),
            };
            (key.clone(), cleaned)
        })
        .collect()
}

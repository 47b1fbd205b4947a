//! JSON-LD extraction from page markup.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Nested `@graph` containers deeper than this are not searched.
pub const MAX_GRAPH_DEPTH: usize = 8;

static JSONLD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("Invalid JSON-LD regex")
});

/// Collect every record from the page's JSON-LD blocks.
///
/// A block holding an array contributes each element; a block holding an
/// object contributes the object. Blocks that are not valid JSON are skipped.
#[must_use]
pub fn extract_records(markup: &str) -> Vec<Value> {
    let mut records = Vec::new();
    for (index, cap) in JSONLD_REGEX.captures_iter(markup).enumerate() {
        let Some(body) = cap.get(1) else {
            continue;
        };
        let sanitized = sanitize_json(body.as_str());
        match serde_json::from_str::<Value>(&sanitized) {
            Ok(Value::Array(items)) => records.extend(items),
            Ok(obj @ Value::Object(_)) => records.push(obj),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(block = index, error = %e, "skipping malformed JSON-LD block");
            }
        }
    }
    records
}

/// Escape raw control characters that some sites leave inside JSON strings.
fn sanitize_json(json: &str) -> String {
    let mut result = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in json.chars() {
        if in_string {
            if escaped {
                escaped = false;
                result.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    result.push(c);
                }
                '"' => {
                    in_string = false;
                    result.push(c);
                }
                '\n' => result.push_str("\\n"),
                '\r' => result.push_str("\\r"),
                '\t' => result.push_str("\\t"),
                c if c.is_control() => {}
                _ => result.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            result.push(c);
        }
    }

    result
}

/// True if `tag` is `wanted`, or ends with `:wanted` or `/wanted`
/// (`schema:Recipe`, `http://schema.org/Recipe`).
#[must_use]
pub fn tag_matches(tag: &str, wanted: &str) -> bool {
    let tag = tag.trim();
    if tag == wanted {
        return true;
    }
    tag.strip_suffix(wanted)
        .is_some_and(|prefix| prefix.ends_with(':') || prefix.ends_with('/'))
}

/// Test a record's `@type` (string or array of strings) against `wanted`.
#[must_use]
pub fn has_type(record: &Value, wanted: &str) -> bool {
    match record.get("@type") {
        Some(Value::String(s)) => tag_matches(s, wanted),
        Some(Value::Array(tags)) => tags
            .iter()
            .filter_map(Value::as_str)
            .any(|t| tag_matches(t, wanted)),
        _ => false,
    }
}

/// Depth-first search for the first `Recipe` record, descending into
/// `@graph` containers before moving on to the next sibling.
#[must_use]
pub fn find_recipe_record(records: &[Value]) -> Option<&Value> {
    find_in(records, 0)
}

fn find_in(records: &[Value], depth: usize) -> Option<&Value> {
    if depth > MAX_GRAPH_DEPTH {
        tracing::debug!(depth, "JSON-LD graph nesting too deep, giving up");
        return None;
    }
    for record in records {
        if has_type(record, "Recipe") {
            return Some(record);
        }
        let found = match record.get("@graph") {
            Some(Value::Array(children)) => find_in(children, depth + 1),
            Some(child @ Value::Object(_)) => find_in(std::slice::from_ref(child), depth + 1),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

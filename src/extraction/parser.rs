//! Best-effort parsing of extraction completions.
//!
//! Candidates are the whole completion, a fenced ```json block, every balanced
//! `{...}` object and the widest `{...}` span, in that order. The first object
//! holding every declared key wins, otherwise the first object at all. Failure
//! is never an error: the record comes back unparsed with the raw text intact.

use serde_json::{Map, Value};

use super::record::ExtractedRecord;
use super::schema::ExtractionSchema;
use crate::log_debug;

/// Parse `raw` against the schema's declared keys.
pub fn parse_completion(schema: &ExtractionSchema, raw: &str) -> ExtractedRecord {
    log_debug!("Parsing extraction completion - {} chars", raw.len());

    let Some(object) = find_json_object(schema, raw) else {
        log_debug!("No JSON object found in extraction completion");
        return ExtractedRecord::unparsed(
            schema,
            raw.to_string(),
            "completion contains no JSON object".to_string(),
        );
    };

    let missing: Vec<&str> = schema
        .field_names()
        .filter(|name| !object.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        log_debug!("Extraction completion missing keys: {:?}", missing);
        return ExtractedRecord::unparsed(
            schema,
            raw.to_string(),
            format!("missing keys: {}", missing.join(", ")),
        );
    }

    let fields = schema
        .field_names()
        .map(|name| {
            let value = object.get(name).map(value_to_text).unwrap_or_default();
            (name.to_string(), value)
        })
        .collect();
    ExtractedRecord::parsed(fields, raw.to_string())
}

fn find_json_object(schema: &ExtractionSchema, raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw.trim().trim_matches('\u{feff}');
    let mut candidates = vec![trimmed.to_string()];
    candidates.extend(extract_from_markdown(trimmed));
    candidates.extend(balanced_objects(trimmed));
    candidates.extend(widest_object_span(trimmed));

    let objects: Vec<Map<String, Value>> = candidates
        .iter()
        .filter_map(|candidate| match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
        .collect();
    let index = objects
        .iter()
        .position(|object| schema.field_names().all(|name| object.contains_key(name)))
        .unwrap_or(0);
    objects.into_iter().nth(index)
}

/// Extract JSON from markdown code blocks
fn extract_from_markdown(text: &str) -> Option<String> {
    let start = text.find("```json").map(|i| i + 7).or_else(|| {
        text.find("```").map(|i| i + 3)
    })?;
    let end = text.get(start..)?.find("```")?;
    text.get(start..start + end).map(|s| s.trim().to_string())
}

/// Every top-level `{...}` object, left to right, ignoring braces inside strings
fn balanced_objects(text: &str) -> Vec<String> {
    let mut objects = Vec::new();
    let mut from = 0;
    while let Some(offset) = text.get(from..).and_then(|rest| rest.find('{')) {
        let start = from + offset;
        match matching_brace(text, start) {
            Some(end) => {
                objects.extend(text.get(start..=end).map(str::to_string));
                from = end + 1;
            }
            None => from = start + 1,
        }
    }
    objects
}

/// Byte index of the `}` closing the `{` at `start`
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.get(start..)?.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn widest_object_span(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start)
        .then(|| text.get(start..=end).map(str::to_string))
        .flatten()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join("; "),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => value.to_string(),
    }
}

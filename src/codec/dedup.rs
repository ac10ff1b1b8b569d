//! String deduplication: long strings that repeat are moved into a lookup
//! table and replaced by a marker-prefixed index token.

use std::collections::HashMap;

use serde_json::Value;

use crate::errors::{Result, StoreError};

pub const REF_MARKER: char = '\u{1}';
pub const MIN_DEDUP_LEN: usize = 24;

pub fn deduplicate(value: Value) -> (Value, Vec<String>) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut first_seen: Vec<String> = Vec::new();
    count_strings(&value, &mut counts, &mut first_seen);

    // Strings that already start with the marker are always tabled so a
    // token can never be confused with original content.
    let table: Vec<String> = first_seen
        .into_iter()
        .filter(|s| s.starts_with(REF_MARKER) || counts.get(s).copied().unwrap_or(0) >= 2)
        .collect();

    if table.is_empty() {
        return (value, table);
    }

    let index: HashMap<&str, usize> = table
        .iter()
        .enumerate()
        .map(|(i, s)| (s.as_str(), i))
        .collect();
    let replaced = replace_strings(value, &index);
    (replaced, table)
}

pub fn expand(value: Value, table: &[String]) -> Result<Value> {
    Ok(match value {
        Value::String(s) => match s.strip_prefix(REF_MARKER) {
            Some(raw_index) => {
                let idx: usize = raw_index.parse().map_err(|_| {
                    StoreError::corruption(format!("malformed string reference '{raw_index}'"))
                })?;
                let resolved = table.get(idx).ok_or_else(|| {
                    StoreError::corruption(format!(
                        "string reference {idx} outside table of {}",
                        table.len()
                    ))
                })?;
                Value::String(resolved.clone())
            }
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| expand(item, table))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key, expand(item, table)?);
            }
            Value::Object(out)
        }
        other => other,
    })
}

fn is_candidate(s: &str) -> bool {
    s.starts_with(REF_MARKER) || s.chars().count() >= MIN_DEDUP_LEN
}

fn count_strings(value: &Value, counts: &mut HashMap<String, usize>, order: &mut Vec<String>) {
    match value {
        Value::String(s) if is_candidate(s) => {
            let count = counts.entry(s.clone()).or_insert(0);
            if *count == 0 {
                order.push(s.clone());
            }
            *count += 1;
        }
        Value::Array(items) => items
            .iter()
            .for_each(|item| count_strings(item, counts, order)),
        Value::Object(map) => map
            .values()
            .for_each(|item| count_strings(item, counts, order)),
        _ => {}
    }
}

fn replace_strings(value: Value, index: &HashMap<&str, usize>) -> Value {
    match value {
        Value::String(s) => match index.get(s.as_str()) {
            Some(i) => Value::String(format!("{REF_MARKER}{i}")),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| replace_strings(item, index))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, replace_strings(item, index)))
                .collect(),
        ),
        other => other,
    }
}

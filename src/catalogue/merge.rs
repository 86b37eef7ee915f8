//! Inheritance merge of metadata trees.
//!
//! `merge_meta(parent, child)` produces the child's effective metadata:
//!
//! - a child key `-K` deletes `K` from the parent
//! - keys in `no_inherit` are never taken from the parent
//! - keys in `no_merge` take the child value as-is
//! - otherwise lists are normalised to mappings and mappings merge recursively;
//!   any other child value replaces the parent's

use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};

/// Merge `child` over `parent`.
///
/// `no_inherit` and `no_merge` apply to top-level keys only; nested merges use
/// plain deep-merge rules.
#[must_use]
pub fn merge_meta(
    parent: &Map<String, Value>,
    child: &Map<String, Value>,
    no_inherit: &BTreeSet<String>,
    no_merge: &BTreeSet<String>,
) -> Map<String, Value> {
    let deletions: HashSet<&str> = child.keys().filter_map(|k| k.strip_prefix('-')).collect();

    let mut result = Map::new();
    for (key, value) in parent {
        if no_inherit.contains(key) || deletions.contains(key.as_str()) {
            continue;
        }
        result.insert(key.clone(), value.clone());
    }

    for (key, value) in child {
        if key.starts_with('-') {
            continue;
        }
        let merged = match result.get(key) {
            Some(existing) if !no_merge.contains(key) => merge_values(existing, value),
            _ => value.clone(),
        };
        result.insert(key.clone(), merged);
    }

    result
}

fn merge_values(parent: &Value, child: &Value) -> Value {
    match (as_mapping(parent), as_mapping(child)) {
        (Some(p), Some(c)) => {
            let empty = BTreeSet::new();
            Value::Object(merge_meta(&p, &c, &empty, &empty))
        }
        _ => child.clone(),
    }
}

fn as_mapping(value: &Value) -> Option<Cow<'_, Map<String, Value>>> {
    match value {
        Value::Object(map) => Some(Cow::Borrowed(map)),
        Value::Array(items) => Some(Cow::Owned(normalize_list(items))),
        _ => None,
    }
}

/// Turn a list into a mapping.
///
/// String items become keys with an empty mapping value; mapping items are merged in
/// order, later entries overwriting earlier ones. Numbers and booleans are used as
/// keys in their text form; other items are dropped.
#[must_use]
pub fn normalize_list(items: &[Value]) -> Map<String, Value> {
    let mut map = Map::new();
    for item in items {
        match item {
            Value::String(s) => {
                map.insert(s.clone(), Value::Object(Map::new()));
            }
            Value::Object(entries) => {
                for (key, value) in entries {
                    map.insert(key.clone(), value.clone());
                }
            }
            Value::Number(_) | Value::Bool(_) => {
                map.insert(item.to_string(), Value::Object(Map::new()));
            }
            Value::Null | Value::Array(_) => {}
        }
    }
    map
}

/// Interpret a value as a mapping of identifiers.
///
/// Mappings pass through, lists are normalised, a single string becomes a one-key
/// mapping. Anything else is empty.
#[must_use]
pub fn as_identifier_map(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        Value::Array(items) => normalize_list(items),
        Value::String(s) => {
            let mut map = Map::new();
            map.insert(s.clone(), Value::Object(Map::new()));
            map
        }
        _ => Map::new(),
    }
}

/// Key names declared by a `no_inherit` / `no_merge` style entry.
#[must_use]
pub fn key_set(value: Option<&Value>) -> BTreeSet<String> {
    value.map(as_identifier_map).map(|map| map.keys().cloned().collect()).unwrap_or_default()
}

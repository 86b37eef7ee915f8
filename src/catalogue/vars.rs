//! `${VAR}` substitution against an accumulating context.
//!
//! Unknown variables are left in place verbatim. That is not an error here: a
//! value may only become resolvable further down the tree, and recipes may expand
//! what remains themselves.

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Variables visible during substitution.
pub type Context = BTreeMap<String, String>;

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("variable pattern must compile"));

/// Substitute every known `${VAR}` in `text`.
#[must_use]
pub fn resolve_vars(text: &str, context: &Context) -> String {
    if !text.contains("${") {
        return text.to_string();
    }
    VAR_PATTERN
        .replace_all(text, |caps: &Captures<'_>| match context.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Substitute recursively through strings, list items, mapping keys and mapping values.
#[must_use]
pub fn resolve_value(value: &Value, context: &Context) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_vars(s, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, context)).collect()),
        Value::Object(map) => Value::Object(resolve_map(map, context)),
        other => other.clone(),
    }
}

#[must_use]
pub fn resolve_map(map: &Map<String, Value>, context: &Context) -> Map<String, Value> {
    map.iter().map(|(k, v)| (resolve_vars(k, context), resolve_value(v, context))).collect()
}

/// Fold an `env` block into `context`, in declaration order.
///
/// Each value is resolved against everything defined so far, including earlier keys
/// of the same block, and may shadow a context variable.
#[must_use]
pub fn resolve_env(env: &Map<String, Value>, context: &Context) -> Context {
    let mut resolved = context.clone();
    for (key, value) in env {
        let text = match value {
            Value::String(s) => resolve_vars(s, &resolved),
            other => context_string(&resolve_value(other, &resolved)),
        };
        resolved.insert(key.clone(), text);
    }
    resolved
}

/// Text form of a value as seen by `${VAR}` substitution and container env vars.
#[must_use]
pub fn context_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//! YAML front-matter splitting and conversion into the JSON value model.
//!
//! Front-matter is everything between a `---` line at the very start of a document and
//! the next line that is exactly `---`. Without a closing delimiter the document has no
//! front-matter at all and the stray opening line stays part of the body.
//!
//! Splitting goes through `gray_matter` with an engine that hands back the raw block,
//! so the YAML itself is always parsed by `serde_yaml` and malformed YAML can be
//! reported with the document's name. Body lines come back with `\n` endings.

use gray_matter::{Matter, Pod, engine::Engine};
use serde_json::{Map, Number, Value};
use serde_yaml::Value as YamlValue;

use crate::constants::FRONTMATTER_DELIMITER;

// gray_matter engine returning the front-matter block untouched.
struct RawFrontmatter;

impl Engine for RawFrontmatter {
    fn parse(content: &str) -> Result<Pod, gray_matter::Error> {
        Ok(Pod::String(content.to_string()))
    }
}

/// A document split at its front-matter delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Raw YAML text, `None` when the document has no (closed) front-matter
    pub yaml: Option<String>,
    /// Body text with leading blank lines removed
    pub body: String,
}

impl Split {
    fn unsplit(input: &str) -> Self {
        Self {
            yaml: None,
            body: input.to_string(),
        }
    }
}

/// Split `input` into front-matter YAML and body.
#[must_use]
pub fn split(input: &str) -> Split {
    let matter = Matter::<RawFrontmatter>::new();
    let Ok(parsed) = matter.parse::<String>(input) else {
        return Split::unsplit(input);
    };

    let yaml = match parsed.data {
        Some(yaml) => yaml,
        // gray_matter reports an empty block the same way as a missing one
        None if is_empty_block(input) => String::new(),
        None => return Split::unsplit(input),
    };

    let mut body = parsed.content;
    if !body.is_empty() && input.ends_with('\n') {
        body.push('\n');
    }
    Split {
        yaml: Some(yaml),
        body,
    }
}

// An opening delimiter followed, after blank lines only, by a closing one.
fn is_empty_block(input: &str) -> bool {
    let mut lines = input.lines();
    lines.next().is_some_and(|first| first.trim_end() == FRONTMATTER_DELIMITER)
        && lines
            .find(|line| !line.trim().is_empty())
            .is_some_and(|line| line.trim_end() == FRONTMATTER_DELIMITER)
}

/// Parse front-matter YAML into a metadata mapping.
///
/// Empty front-matter and an explicit `null` both give an empty mapping.
///
/// # Errors
///
/// Returns the parser message if the YAML is malformed or is not a mapping.
pub fn parse_metadata(yaml: &str) -> Result<Map<String, Value>, String> {
    let parsed: YamlValue = serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;
    match yaml_to_json(parsed) {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(format!("front-matter must be a mapping, found {}", kind(&other))),
    }
}

/// Convert a YAML value to the JSON value model used for metadata.
///
/// Mapping keys that are not strings (numbers, booleans) are stringified. Tagged
/// values keep their inner value.
#[must_use]
pub fn yaml_to_json(value: YamlValue) -> Value {
    match value {
        YamlValue::Null => Value::Null,
        YamlValue::Bool(b) => Value::Bool(b),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64().and_then(Number::from_f64).map_or(Value::Null, Value::Number)
            }
        }
        YamlValue::String(s) => Value::String(s),
        YamlValue::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        YamlValue::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(key_to_string(key), yaml_to_json(value));
            }
            Value::Object(map)
        }
        YamlValue::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn key_to_string(key: YamlValue) -> String {
    match key {
        YamlValue::String(s) => s,
        YamlValue::Null => "null".to_string(),
        other => match yaml_to_json(other) {
            Value::String(s) => s,
            v => v.to_string(),
        },
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

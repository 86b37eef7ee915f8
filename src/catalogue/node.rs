//! Typed views of resolved metadata.
//!
//! Metadata stays an untyped JSON tree through inheritance and substitution. Once a
//! path is fully resolved, [`NodeSpec`] pulls out the keys with build meaning and
//! [`Identifier`] separates container images from files.

use anyhow::Result;
use serde_json::{Map, Value};
use std::fmt;

use super::merge::as_identifier_map;
use super::vars::context_string;
use crate::constants::IMAGE_PREFIX;
use crate::core::BuildError;

/// An output or requirement name: a container image or a file under the build directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identifier {
    /// `docker:<tag>`, holding the bare tag
    Image(String),
    /// Path relative to the build directory
    File(String),
}

impl Identifier {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(IMAGE_PREFIX) {
            Some(tag) => Self::Image(tag.to_string()),
            None => Self::File(raw.to_string()),
        }
    }

    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }

    #[must_use]
    pub fn as_file(&self) -> Option<&str> {
        match self {
            Self::File(path) => Some(path),
            Self::Image(_) => None,
        }
    }

    #[must_use]
    pub fn as_image(&self) -> Option<&str> {
        match self {
            Self::Image(tag) => Some(tag),
            Self::File(_) => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(tag) => write!(f, "{IMAGE_PREFIX}{tag}"),
            Self::File(path) => f.write_str(path),
        }
    }
}

impl From<&str> for Identifier {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// One `provides` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provide {
    pub id: Identifier,
    /// Extra files this output depends on beyond the path-level `requires`
    pub requires: Vec<String>,
}

/// Build-relevant fields of one resolved catalogue path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeSpec {
    pub path: String,
    pub provides: Vec<Provide>,
    /// Includes the keys of `build_requires`
    pub requires: Vec<String>,
    pub build_requires: Vec<String>,
    /// In declaration order
    pub env: Vec<(String, String)>,
    /// Tag of the image named by `runs_on`, without the `docker:` prefix
    pub runs_on: Option<String>,
}

impl NodeSpec {
    /// Extract the typed view from resolved metadata.
    ///
    /// # Errors
    ///
    /// [`BuildError::MalformedRunsOn`] if `runs_on` is set but is not a `docker:`
    /// reference.
    pub fn from_metadata(path: &str, meta: &Map<String, Value>) -> Result<Self> {
        let provides = meta
            .get("provides")
            .map(as_identifier_map)
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| Provide {
                id: Identifier::parse(&key),
                requires: value.get("requires").map(keys_of).unwrap_or_default(),
            })
            .collect();

        let env = match meta.get("env") {
            Some(Value::Object(env)) => {
                env.iter().map(|(k, v)| (k.clone(), context_string(v))).collect()
            }
            _ => Vec::new(),
        };

        Ok(Self {
            path: path.to_string(),
            provides,
            requires: meta.get("requires").map(keys_of).unwrap_or_default(),
            build_requires: meta.get("build_requires").map(keys_of).unwrap_or_default(),
            env,
            runs_on: parse_runs_on(path, meta.get("runs_on"))?,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.provides.iter().filter_map(|p| p.id.as_image())
    }

    pub fn files(&self) -> impl Iterator<Item = &Provide> {
        self.provides.iter().filter(|p| !p.id.is_image())
    }

    #[must_use]
    pub fn provide(&self, id: &Identifier) -> Option<&Provide> {
        self.provides.iter().find(|p| &p.id == id)
    }
}

fn keys_of(value: &Value) -> Vec<String> {
    as_identifier_map(value).keys().cloned().collect()
}

fn parse_runs_on(path: &str, value: Option<&Value>) -> Result<Option<String>> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.is_empty() => return Ok(None),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    match raw.strip_prefix(IMAGE_PREFIX) {
        Some(tag) => Ok(Some(tag.to_string())),
        None => Err(BuildError::MalformedRunsOn {
            path: path.to_string(),
            value: raw,
        }
        .into()),
    }
}

//! Variable resolution of inherited metadata.

use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::merge::as_identifier_map;
use super::node::NodeSpec;
use super::paths::{depth, parent_path};
use super::vars::{Context, resolve_env, resolve_map};
use super::Catalogue;
use crate::constants::SELF_VAR;
use crate::core::BuildError;

// Keys that may be written as lists but are consumed as mappings.
const IDENTIFIER_KEYS: [&str; 3] = ["provides", "requires", "build_requires"];

/// Resolves catalogue paths to concrete metadata for one external context.
///
/// Construction walks the catalogue once, root first, folding every path's `env`
/// block into the context inherited from its nearest ancestor. Resolving a path is
/// then a single substitution pass over its merged metadata.
pub struct Resolver<'a> {
    catalogue: &'a Catalogue,
    contexts: HashMap<&'a str, Context>,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(catalogue: &'a Catalogue, base: &Context) -> Self {
        let mut order: Vec<&'a String> = catalogue.paths.keys().collect();
        order.sort_by_key(|path| depth(path));

        let mut contexts: HashMap<&'a str, Context> = HashMap::with_capacity(order.len());
        for path in order {
            let inherited = nearest_context(path, &contexts).unwrap_or(base);
            let context = match catalogue.paths[path].meta.get("env") {
                Some(Value::Object(env)) => resolve_env(env, inherited),
                _ => inherited.clone(),
            };
            contexts.insert(path.as_str(), context);
        }

        Self {
            catalogue,
            contexts,
        }
    }

    #[must_use]
    pub const fn catalogue(&self) -> &'a Catalogue {
        self.catalogue
    }

    /// Accumulated variable context at `path`, after its own `env` block.
    #[must_use]
    pub fn context(&self, path: &str) -> Option<&Context> {
        self.contexts.get(path)
    }

    /// Fully substituted metadata for `path`.
    ///
    /// `SELF` is bound to the path unless its env defines it. `provides`,
    /// `requires` and `build_requires` come back as mappings, and every
    /// `build_requires` key also appears in `requires`.
    ///
    /// # Errors
    ///
    /// [`BuildError::PathNotFound`] if the catalogue has no such path.
    pub fn resolve_path(&self, path: &str) -> Result<Map<String, Value>> {
        let (Some(entry), Some(context)) = (self.catalogue.paths.get(path), self.contexts.get(path))
        else {
            return Err(BuildError::PathNotFound {
                path: path.to_string(),
            }
            .into());
        };

        let mut context = context.clone();
        context.entry(SELF_VAR.to_string()).or_insert_with(|| path.to_string());

        let mut meta = resolve_map(&entry.meta, &context);
        for key in IDENTIFIER_KEYS {
            if let Some(value) = meta.get_mut(key) {
                if !value.is_object() {
                    *value = Value::Object(as_identifier_map(value));
                }
            }
        }

        if let Some(Value::Object(build_requires)) = meta.get("build_requires").cloned() {
            let requires = meta
                .entry("requires")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(requires) = requires {
                for (key, value) in build_requires {
                    requires.entry(key).or_insert(value);
                }
            }
        }

        Ok(meta)
    }

    /// Resolve `path` and extract its typed view.
    pub fn resolve_node(&self, path: &str) -> Result<(Map<String, Value>, NodeSpec)> {
        let meta = self.resolve_path(path)?;
        let spec = NodeSpec::from_metadata(path, &meta)?;
        Ok((meta, spec))
    }
}

fn nearest_context<'c>(path: &str, contexts: &'c HashMap<&str, Context>) -> Option<&'c Context> {
    let mut current = path;
    while !current.is_empty() {
        current = parent_path(current);
        if let Some(context) = contexts.get(current) {
            return Some(context);
        }
    }
    None
}

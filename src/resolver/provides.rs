//! Output → provider index.

use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::catalogue::{Catalogue, Context, Resolver};
use crate::core::BuildError;

/// Which catalogue path provides each output, keyed by the identifier as written
/// (`docker:<tag>` for images).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvidesIndex {
    outputs: BTreeMap<String, String>,
}

impl ProvidesIndex {
    /// Resolve every path and index its `provides`.
    ///
    /// # Errors
    ///
    /// [`BuildError::DuplicateProvider`] when two paths provide the same output.
    pub fn build(resolver: &Resolver<'_>) -> Result<Self> {
        let mut outputs: BTreeMap<String, String> = BTreeMap::new();

        for path in resolver.catalogue().paths.keys() {
            let meta = resolver.resolve_path(path)?;
            let Some(Value::Object(provides)) = meta.get("provides") else {
                continue;
            };
            for output in provides.keys() {
                if let Some(first) = outputs.get(output) {
                    return Err(BuildError::DuplicateProvider {
                        output: output.clone(),
                        first: first.clone(),
                        second: path.clone(),
                    }
                    .into());
                }
                outputs.insert(output.clone(), path.clone());
            }
        }

        tracing::debug!("Indexed {} outputs", outputs.len());
        Ok(Self {
            outputs,
        })
    }

    #[must_use]
    pub fn provider(&self, output: &str) -> Option<&str> {
        self.outputs.get(output).map(String::as_str)
    }

    /// `(output, path)` pairs sorted by output.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outputs.iter().map(|(o, p)| (o.as_str(), p.as_str()))
    }

    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Build the provides index for `catalogue` under `context`.
pub fn build_provides_index(catalogue: &Catalogue, context: &Context) -> Result<ProvidesIndex> {
    ProvidesIndex::build(&catalogue.resolver(context))
}

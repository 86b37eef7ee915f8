//! The catalogue: every document of a package tree, grouped by logical path, with
//! inherited metadata.
//!
//! Loading runs the pipeline
//!
//! 1. [`load_documents`](crate::markdown::load_documents): read every markdown file
//! 2. [`map_paths`]: group documents by logical path
//! 3. [`resolve_inheritance`]: merge metadata root to leaf
//!
//! Variable substitution is context dependent (architecture, caller-provided
//! variables) and happens later, through a [`Resolver`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use qbuild::catalogue::{Catalogue, Context};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let catalogue = Catalogue::load(Path::new("."), &[])?;
//! let context: Context = [("ARCH".to_string(), "x86_64".to_string())].into();
//! let meta = catalogue.resolver(&context).resolve_path("guests/linux")?;
//! println!("{}", serde_json::to_string_pretty(&meta)?);
//! # Ok(())
//! # }
//! ```

pub mod inheritance;
pub mod merge;
pub mod node;
pub mod paths;
pub mod resolve;
pub mod vars;

pub use inheritance::resolve_inheritance;
pub use merge::{merge_meta, normalize_list};
pub use node::{Identifier, NodeSpec, Provide};
pub use paths::{ancestors, document_path, map_paths, parent_path};
pub use resolve::Resolver;
pub use vars::{Context, resolve_env, resolve_value, resolve_vars};

use anyhow::{Context as _, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::constants::CATALOGUE_SNAPSHOT;
use crate::markdown::{Document, load_documents};
use crate::utils::{ensure_dir, write_if_changed};

/// A logical path with its inherited metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CataloguePath {
    /// Metadata merged from the root down, before variable substitution
    pub meta: Map<String, Value>,
    /// Documents mapped to this path, in discovery order; the first is authoritative
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalogue {
    pub paths: BTreeMap<String, CataloguePath>,
    pub files: BTreeMap<String, Document>,
}

impl Catalogue {
    /// Load and inherit every document under `root`, skipping `exclude`d directories.
    pub fn load(root: &Path, exclude: &[PathBuf]) -> Result<Self> {
        let files = load_documents(root, exclude)
            .with_context(|| format!("Failed to load catalogue from {}", root.display()))?;
        Ok(Self::from_documents(files))
    }

    #[must_use]
    pub fn from_documents(files: BTreeMap<String, Document>) -> Self {
        let index = map_paths(&files);
        let paths = resolve_inheritance(&files, &index);
        tracing::debug!("Catalogue has {} paths from {} documents", paths.len(), files.len());
        Self {
            paths,
            files,
        }
    }

    /// Build a catalogue from already-inherited paths, without source documents.
    #[must_use]
    pub fn from_paths(paths: BTreeMap<String, CataloguePath>) -> Self {
        Self {
            paths,
            files: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&CataloguePath> {
        self.paths.get(path)
    }

    #[must_use]
    pub fn resolver(&self, context: &Context) -> Resolver<'_> {
        Resolver::new(self, context)
    }

    /// Pretty JSON of the whole catalogue, as written to the build snapshot.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize catalogue")
    }

    /// Write the snapshot `catalogue.json` into `build_dir`.
    ///
    /// Returns whether the file changed. An unchanged snapshot is left alone so it
    /// stays clean for the cache.
    pub fn write_snapshot(&self, build_dir: &Path) -> Result<bool> {
        ensure_dir(build_dir)?;
        let snapshot = self.to_json()?;
        let changed = write_if_changed(&build_dir.join(CATALOGUE_SNAPSHOT), snapshot.as_bytes())?;
        if changed {
            tracing::debug!("Updated {}", CATALOGUE_SNAPSHOT);
        }
        Ok(changed)
    }
}

//! Document loading for the catalogue.
//!
//! A package tree is a directory of markdown documents. Each document carries YAML
//! front-matter (its metadata) and free text (its body). [`load_documents`] walks the
//! tree and returns every document keyed by its path relative to the root, with
//! forward slashes, in sorted order.
//!
//! ```text
//! ---
//! provides:
//!   docker:builder/${HOST_ARCH}: {}
//! requires:
//!   - catalogue.json
//! ---
//!
//! # Builder image
//! ```

pub mod frontmatter;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::cache::digest_bytes;
use crate::constants::DOCUMENT_EXTENSION;
use crate::core::BuildError;
use crate::utils::{is_excluded_dir, to_slash_path};

/// One loaded document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Parsed front-matter, empty when the document has none
    pub meta: Map<String, Value>,
    /// Body text after the front-matter, leading blank lines removed
    pub content: String,
    /// Digest of the raw file bytes
    pub hash: String,
}

impl Document {
    /// Parse raw document bytes. `file` names the document in error messages.
    pub fn parse(file: &str, raw: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(raw);
        let split = frontmatter::split(&text);
        let meta = match &split.yaml {
            Some(yaml) => {
                frontmatter::parse_metadata(yaml).map_err(|reason| BuildError::FrontmatterParse {
                    file: file.to_string(),
                    reason,
                })?
            }
            None => Map::new(),
        };

        Ok(Self {
            meta,
            content: split.body,
            hash: digest_bytes(raw),
        })
    }

    pub fn read(root: &Path, relative: &str) -> Result<Self> {
        let full = root.join(relative);
        let raw = fs::read(&full)
            .with_context(|| format!("Failed to read document: {}", full.display()))?;
        Self::parse(relative, &raw)
    }
}

/// Load every document under `root`.
///
/// Hidden directories and any directory listed in `exclude` (typically a build
/// directory nested in the package) are skipped. Keys are root-relative paths.
///
/// # Errors
///
/// Fails if the tree cannot be walked, a document cannot be read, or a document's
/// front-matter is malformed.
pub fn load_documents(root: &Path, exclude: &[PathBuf]) -> Result<BTreeMap<String, Document>> {
    let mut documents = BTreeMap::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded_dir(entry, exclude));

    for entry in walker {
        let entry =
            entry.with_context(|| format!("Failed to walk package tree: {}", root.display()))?;
        if !entry.file_type().is_file() || !is_document(entry.path()) {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let key = to_slash_path(relative);
        let document = Document::read(root, &key)?;
        tracing::trace!("Loaded document {key} ({} metadata keys)", document.meta.len());
        documents.insert(key, document);
    }

    tracing::debug!("Loaded {} documents from {}", documents.len(), root.display());
    Ok(documents)
}

fn is_document(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION)
}

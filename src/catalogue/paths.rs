//! Mapping physical document locations onto logical catalogue paths.
//!
//! Logical paths form a slash-delimited namespace rooted at `""`:
//!
//! | document                    | logical path  |
//! |-----------------------------|---------------|
//! | `index.md`                  | `""`          |
//! | `docs/fs/ext4.md`           | `fs/ext4`     |
//! | `guests/linux/README.md`    | `guests/linux`|
//! | `notes.txt`                 | `notes.txt`   |
//!
//! An explicit `path:` key in the front-matter overrides all of the above.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::constants::{DOCS_PREFIX, DOCUMENT_EXTENSION, INDEX_STEMS};
use crate::markdown::Document;

/// Logical path for the document at `physical` (root-relative, forward slashes).
#[must_use]
pub fn document_path(physical: &str, meta: &Map<String, Value>) -> String {
    if let Some(Value::String(explicit)) = meta.get("path") {
        return explicit.clone();
    }

    let path = physical.strip_prefix(DOCS_PREFIX).unwrap_or(physical);
    let suffix = format!(".{DOCUMENT_EXTENSION}");

    for stem in INDEX_STEMS {
        let index_file = format!("{stem}{suffix}");
        if path == index_file {
            return String::new();
        }
        if let Some(parent) = path.strip_suffix(&format!("/{index_file}")) {
            return parent.to_string();
        }
    }

    path.strip_suffix(&suffix).unwrap_or(path).to_string()
}

/// Parent of a logical path. The root is its own parent.
#[must_use]
pub fn parent_path(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..idx])
}

/// Every ancestor of `path`, root first, ending with `path` itself.
#[must_use]
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut chain = vec![path];
    let mut current = path;
    while !current.is_empty() {
        current = parent_path(current);
        chain.push(current);
    }
    chain.reverse();
    chain
}

/// Number of segments below the root (`""` is 0, `a/b` is 2).
#[must_use]
pub fn depth(path: &str) -> usize {
    if path.is_empty() { 0 } else { path.matches('/').count() + 1 }
}

/// Group documents by logical path; each group lists its sources in discovery order.
#[must_use]
pub fn map_paths(documents: &BTreeMap<String, Document>) -> BTreeMap<String, Vec<String>> {
    let mut paths: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (physical, document) in documents {
        let logical = document_path(physical, &document.meta);
        paths.entry(logical).or_default().push(physical.clone());
    }
    paths
}

//! Root-to-leaf metadata inheritance.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::CataloguePath;
use super::merge::{key_set, merge_meta};
use super::paths::{depth, parent_path};
use crate::markdown::Document;

// Merged state at a path, reused by every descendant.
struct Inherited {
    meta: Map<String, Value>,
    no_inherit: BTreeSet<String>,
    no_merge: BTreeSet<String>,
}

/// Merge every logical path's metadata with its ancestors'.
///
/// Paths are processed parents first, so each path merges its own document over
/// the already-merged state of its nearest ancestor that has a document. The
/// `no_inherit` and `no_merge` keys declared anywhere up the chain apply to the
/// merge at that level and every level below. Only the first source of a path
/// contributes metadata.
#[must_use]
pub fn resolve_inheritance(
    documents: &BTreeMap<String, Document>,
    path_index: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<String, CataloguePath> {
    let mut order: Vec<&String> = path_index.keys().collect();
    order.sort_by_key(|path| depth(path));

    let empty = Map::new();
    let mut states: HashMap<&str, Inherited> = HashMap::with_capacity(order.len());

    for path in order {
        let sources = &path_index[path];
        let own = sources.first().and_then(|s| documents.get(s)).map_or(&empty, |d| &d.meta);

        let base = nearest_ancestor(path, &states);
        let mut no_inherit = base.map(|b| b.no_inherit.clone()).unwrap_or_default();
        let mut no_merge = base.map(|b| b.no_merge.clone()).unwrap_or_default();
        no_inherit.extend(key_set(own.get("no_inherit")));
        no_merge.extend(key_set(own.get("no_merge")));

        let meta = merge_meta(base.map_or(&empty, |b| &b.meta), own, &no_inherit, &no_merge);
        if sources.len() > 1 {
            tracing::debug!("{path:?} has {} sources, using {}", sources.len(), sources[0]);
        }

        states.insert(
            path.as_str(),
            Inherited {
                meta,
                no_inherit,
                no_merge,
            },
        );
    }

    path_index
        .iter()
        .map(|(path, sources)| {
            let meta = states.remove(path.as_str()).map(|s| s.meta).unwrap_or_default();
            (
                path.clone(),
                CataloguePath {
                    meta,
                    sources: sources.clone(),
                },
            )
        })
        .collect()
}

fn nearest_ancestor<'s>(
    path: &str,
    states: &'s HashMap<&str, Inherited>,
) -> Option<&'s Inherited> {
    let mut current = path;
    while !current.is_empty() {
        current = parent_path(current);
        if let Some(state) = states.get(current) {
            return Some(state);
        }
    }
    None
}

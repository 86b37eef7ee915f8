//! Build plan construction.
//!
//! Starting from the requested outputs, [`BuildGraph::build`] walks `requires`
//! depth first through the provides index and records:
//!
//! - `nodes`: every visited path with its resolved metadata
//! - `edges`: `(dependent, dependency)` for every `requires` entry
//! - `order`: post-order DFS, so dependencies always precede their dependents
//! - `needed`: per path, which of its outputs were actually asked for
//!
//! Outputs nobody provides are accepted when the file already exists in the build
//! directory; they become leaves with no node.

use anyhow::Result;
use petgraph::graph::{DiGraph, NodeIndex};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use super::provides::ProvidesIndex;
use crate::catalogue::{Catalogue, Context, Identifier, NodeSpec, Resolver};
use crate::core::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    // On the current DFS chain
    Gray,
    // Fully walked
    Black,
}

/// A visited catalogue path.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Fully resolved metadata, as handed to the recipe
    pub meta: Map<String, Value>,
    pub spec: NodeSpec,
}

/// Ordered, cycle-free build plan for a set of target outputs.
#[derive(Debug, Default)]
pub struct BuildGraph {
    /// Requested outputs with their provider (`None` for pre-existing files)
    pub targets: Vec<(String, Option<String>)>,
    pub nodes: BTreeMap<String, GraphNode>,
    pub edges: Vec<(String, String)>,
    pub order: Vec<String>,
    pub needed: BTreeMap<String, BTreeSet<Identifier>>,
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl BuildGraph {
    /// Walk the dependencies of `targets`.
    ///
    /// # Errors
    ///
    /// - [`BuildError::ProviderNotFound`] for a target or requirement that no path
    ///   provides and that does not exist under `build_dir`
    /// - [`BuildError::DependencyCycle`] when a path (transitively) requires itself
    /// - any resolution error of a visited path
    pub fn build<S: AsRef<str>>(
        targets: &[S],
        resolver: &Resolver<'_>,
        index: &ProvidesIndex,
        build_dir: &Path,
    ) -> Result<Self> {
        let mut walker = Walker {
            resolver,
            index,
            build_dir,
            colors: HashMap::new(),
            chain: Vec::new(),
            graph: Self::default(),
        };

        for target in targets {
            let target = target.as_ref();
            walker.visit_output(target, None)?;
            let provider = index.provider(target).map(str::to_string);
            walker.graph.targets.push((target.to_string(), provider));
        }

        let graph = walker.graph;
        tracing::debug!(
            "Build graph: {} nodes, {} edges, order {:?}",
            graph.nodes.len(),
            graph.edges.len(),
            graph.order
        );
        Ok(graph)
    }

    /// Outputs of `path` that some requester asked for.
    #[must_use]
    pub fn needed_outputs(&self, path: &str) -> Option<&BTreeSet<Identifier>> {
        self.needed.get(path)
    }

    /// Direct dependencies of `path` (catalogue paths or external files), sorted.
    #[must_use]
    pub fn dependencies(&self, path: &str) -> Vec<&str> {
        let Some(&idx) = self.node_map.get(path) else {
            return Vec::new();
        };
        let mut deps: Vec<&str> =
            self.graph.neighbors(idx).map(|n| self.graph[n].as_str()).collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    /// JSON summary: targets, order, edges and needed outputs.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let targets: Map<String, Value> = self
            .targets
            .iter()
            .map(|(target, provider)| (target.clone(), json!(provider)))
            .collect();
        let needed: Map<String, Value> = self
            .needed
            .iter()
            .map(|(path, ids)| {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                (path.clone(), json!(ids))
            })
            .collect();
        json!({
            "targets": targets,
            "order": self.order,
            "edges": self.edges,
            "needed": needed,
        })
    }

    /// Render the dependency tree below each target.
    ///
    /// Paths already expanded elsewhere in the tree are marked `(*)` instead of
    /// being expanded again.
    #[must_use]
    pub fn to_tree_string(&self) -> String {
        let mut result = String::new();
        let mut visited = HashSet::new();
        for (target, provider) in &self.targets {
            result.push_str(target);
            result.push('\n');
            if let Some(provider) = provider {
                self.build_tree_string(provider, &mut result, "", true, &mut visited);
            }
        }
        result
    }

    fn build_tree_string(
        &self,
        node: &str,
        result: &mut String,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<String>,
    ) {
        let connector = if is_last {
            "└── "
        } else {
            "├── "
        };
        let name = if node.is_empty() { "." } else { node };
        let deps = self.dependencies(node);

        if !deps.is_empty() && !visited.insert(node.to_string()) {
            result.push_str(&format!("{prefix}{connector}{name} (*)\n"));
            return;
        }
        result.push_str(&format!("{prefix}{connector}{name}\n"));

        let child_prefix = if is_last {
            format!("{prefix}    ")
        } else {
            format!("{prefix}│   ")
        };
        for (i, dep) in deps.iter().enumerate() {
            let is_last_child = i == deps.len() - 1;
            self.build_tree_string(dep, result, &child_prefix, is_last_child, visited);
        }
    }

    fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(name) {
            index
        } else {
            let index = self.graph.add_node(name.to_string());
            self.node_map.insert(name.to_string(), index);
            index
        }
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.edges.push((from.to_string(), to.to_string()));
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);
        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }
}

/// Build the graph for `targets` with a fresh resolver and provides index.
pub fn build_graph<S: AsRef<str>>(
    targets: &[S],
    catalogue: &Catalogue,
    context: &Context,
    build_dir: &Path,
) -> Result<BuildGraph> {
    let resolver = catalogue.resolver(context);
    let index = ProvidesIndex::build(&resolver)?;
    BuildGraph::build(targets, &resolver, &index, build_dir)
}

struct Walker<'w, 'c> {
    resolver: &'w Resolver<'c>,
    index: &'w ProvidesIndex,
    build_dir: &'w Path,
    colors: HashMap<String, Color>,
    chain: Vec<String>,
    graph: BuildGraph,
}

impl Walker<'_, '_> {
    fn visit_output(&mut self, output: &str, requester: Option<&str>) -> Result<()> {
        let index = self.index;
        let Some(path) = index.provider(output) else {
            if self.build_dir.join(output).exists() {
                tracing::debug!("{output} exists in build directory, treating as external");
                return Ok(());
            }
            return Err(BuildError::ProviderNotFound {
                output: output.to_string(),
                required_by: requester.map(str::to_string),
            }
            .into());
        };

        self.graph.needed.entry(path.to_string()).or_default().insert(Identifier::parse(output));
        self.visit_path(path)
    }

    fn visit_path(&mut self, path: &str) -> Result<()> {
        match self.colors.get(path) {
            Some(Color::Black) => return Ok(()),
            Some(Color::Gray) => {
                let start = self.chain.iter().position(|p| p == path).unwrap_or(0);
                let mut cycle = self.chain[start..].to_vec();
                cycle.push(path.to_string());
                return Err(BuildError::DependencyCycle {
                    chain: cycle,
                }
                .into());
            }
            None => {}
        }

        self.colors.insert(path.to_string(), Color::Gray);
        self.chain.push(path.to_string());
        self.graph.ensure_node(path);

        let index = self.index;
        let (meta, spec) = self.resolver.resolve_node(path)?;
        for requirement in &spec.requires {
            let dependency = index.provider(requirement).unwrap_or(requirement);
            self.graph.add_edge(path, dependency);
            self.visit_output(requirement, Some(path))?;
        }

        self.chain.pop();
        self.colors.insert(path.to_string(), Color::Black);
        self.graph.order.push(path.to_string());
        self.graph.nodes.insert(
            path.to_string(),
            GraphNode {
                meta,
                spec,
            },
        );
        Ok(())
    }
}

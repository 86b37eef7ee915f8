//! Build runner.
//!
//! Executes a [`BuildGraph`] strictly in order. For every path that provides
//! something:
//!
//! 1. compute its Merkle input hash and publish it for its outputs
//! 2. validate that it has a way to build what it provides
//! 3. build its image if it has a recipe and the image is dirty
//! 4. run the recipe for the requested file outputs that are dirty
//! 5. check every requested output now exists
//!
//! The cache is saved after every successful step. Any failure aborts the whole
//! build; nothing is retried.

use anyhow::{Context as _, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::cache::BuildCache;
use crate::catalogue::{Catalogue, Context, Identifier, NodeSpec};
use crate::constants::{CONTAINER_BUILD_MOUNT, DEFAULT_TAG_PREFIX, META_ENV_VAR, RECIPE_FILE};
use crate::container::{ContainerRun, ContainerTool, ImageBuild};
use crate::core::BuildError;
use crate::resolver::{BuildGraph, ProvidesIndex};
use crate::utils::remove_path;

/// What a build did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub images_built: usize,
    pub images_clean: usize,
    pub outputs_built: usize,
    pub outputs_clean: usize,
}

impl std::fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} image(s) built, {} clean; {} output(s) built, {} clean",
            self.images_built, self.images_clean, self.outputs_built, self.outputs_clean
        )
    }
}

/// Runs builds of one package tree into one build directory.
pub struct BuildRunner<'t, T: ContainerTool> {
    package_root: PathBuf,
    build_dir: PathBuf,
    host_arch: String,
    tool: &'t T,
    force: bool,
}

impl<'t, T: ContainerTool> BuildRunner<'t, T> {
    /// `build_dir` is made absolute so it can be bind-mounted.
    pub fn new(
        package_root: &Path,
        build_dir: &Path,
        host_arch: impl Into<String>,
        tool: &'t T,
    ) -> Result<Self> {
        let build_dir = std::path::absolute(build_dir)
            .with_context(|| format!("Failed to resolve {}", build_dir.display()))?;
        Ok(Self {
            package_root: package_root.to_path_buf(),
            build_dir,
            host_arch: host_arch.into(),
            tool,
            force: false,
        })
    }

    /// Rebuild everything regardless of the cache.
    #[must_use]
    pub const fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Write the catalogue snapshot into the build directory; see
    /// [`Catalogue::write_snapshot`].
    pub fn write_snapshot(&self, catalogue: &Catalogue) -> Result<bool> {
        catalogue.write_snapshot(&self.build_dir)
    }

    /// Build `targets` and everything they depend on.
    pub async fn build<S: AsRef<str>>(
        &self,
        catalogue: &Catalogue,
        context: &Context,
        targets: &[S],
    ) -> Result<BuildSummary> {
        self.write_snapshot(catalogue)?;

        let resolver = catalogue.resolver(context);
        let index = ProvidesIndex::build(&resolver)?;
        let graph = BuildGraph::build(targets, &resolver, &index, &self.build_dir)?;
        self.run_graph(&graph).await
    }

    /// Execute an already-built graph.
    pub async fn run_graph(&self, graph: &BuildGraph) -> Result<BuildSummary> {
        let mut cache = BuildCache::load(&self.build_dir);
        let mut dep_hashes: HashMap<String, String> = HashMap::new();
        let mut summary = BuildSummary::default();

        for path in &graph.order {
            let Some(node) = graph.nodes.get(path) else {
                continue;
            };
            let spec = &node.spec;
            if spec.provides.is_empty() {
                continue;
            }

            let input_hash = cache.hash_path_inputs(spec, &self.package_root, &dep_hashes)?;
            for provide in &spec.provides {
                dep_hashes.insert(provide.id.to_string(), input_hash.clone());
            }

            let context_dir = self.package_root.join(path);
            let has_recipe = context_dir.join(RECIPE_FILE).is_file();
            let has_images = spec.images().next().is_some();
            let has_files = spec.files().next().is_some();

            if has_images && !has_recipe {
                return Err(BuildError::MissingRecipe {
                    path: path.clone(),
                }
                .into());
            }
            if has_files && !has_recipe && spec.runs_on.is_none() {
                return Err(BuildError::NoBuildMechanism {
                    path: path.clone(),
                }
                .into());
            }

            let mut tag = None;
            if has_recipe {
                let built = self
                    .image_step(&mut cache, spec, &context_dir, &input_hash, &mut summary)
                    .await?;
                tag = Some(built);
            }

            if has_files {
                if let Some(runs_on) = &spec.runs_on {
                    tag = Some(runs_on.clone());
                }
                let Some(tag) = tag else {
                    continue;
                };
                let needed = needed_files(graph, spec);
                self.file_step(&mut cache, &node.meta, spec, &tag, &input_hash, &needed, &mut summary)
                    .await?;
            }
        }

        tracing::info!("Build complete: {summary}");
        Ok(summary)
    }

    async fn image_step(
        &self,
        cache: &mut BuildCache,
        spec: &NodeSpec,
        context_dir: &Path,
        input_hash: &str,
        summary: &mut BuildSummary,
    ) -> Result<String> {
        let tag = image_tag(spec);

        if !self.force {
            let tool = self.tool;
            let dirty = cache
                .is_image_dirty(&tag, input_hash, &self.host_arch, |id: String| async move {
                    tool.image_exists(&id).await
                })
                .await?;
            if !dirty {
                tracing::info!("Clean: {}", tag);
                summary.images_clean += 1;
                return Ok(tag);
            }
        }

        let build = ImageBuild {
            context_dir: context_dir.to_path_buf(),
            tag: tag.clone(),
            build_args: spec.env.clone(),
            mounts: spec
                .build_requires
                .iter()
                .map(|req| (self.build_dir.join(req), format!("{CONTAINER_BUILD_MOUNT}/{req}")))
                .collect(),
        };
        let image_id = self.tool.build_image(&build).await?;

        cache.update_image_hash(&tag, input_hash, &image_id, &self.host_arch);
        cache.save()?;
        summary.images_built += 1;
        Ok(tag)
    }

    #[allow(clippy::too_many_arguments)]
    async fn file_step(
        &self,
        cache: &mut BuildCache,
        meta: &Map<String, Value>,
        spec: &NodeSpec,
        tag: &str,
        input_hash: &str,
        needed: &[(String, Vec<String>)],
        summary: &mut BuildSummary,
    ) -> Result<()> {
        if needed.is_empty() {
            return Ok(());
        }

        let mut dirty = Vec::new();
        for (output, extra) in needed {
            if self.force || cache.is_output_dirty(output, input_hash, extra)? {
                dirty.push((output, extra));
            }
        }
        summary.outputs_clean += needed.len() - dirty.len();

        if dirty.is_empty() {
            let names: Vec<&str> = needed.iter().map(|(o, _)| o.as_str()).collect();
            tracing::info!("Clean: {}", names.join(", "));
            return Ok(());
        }

        for (output, _) in &dirty {
            remove_path(&self.build_dir.join(output))?;
        }

        let mut env = spec.env.clone();
        let meta_json = serde_json::to_string(meta).context("Failed to serialize metadata")?;
        env.push((META_ENV_VAR.to_string(), meta_json));

        let run = ContainerRun {
            image: tag.to_string(),
            build_dir: self.build_dir.clone(),
            env,
            targets: dirty.iter().map(|(output, _)| (*output).clone()).collect(),
        };
        let output_log = self.tool.run_container(&run).await?;

        for (output, _) in &dirty {
            if !self.build_dir.join(output).exists() {
                return Err(BuildError::OutputNotCreated {
                    output: (*output).clone(),
                    path: spec.path.clone(),
                    output_log,
                }
                .into());
            }
        }

        for (output, extra) in &dirty {
            cache.update_output_hash(output, input_hash, extra)?;
        }
        cache.save()?;
        summary.outputs_built += dirty.len();
        Ok(())
    }
}

/// Tag of the image a path's recipe builds.
#[must_use]
pub fn image_tag(spec: &NodeSpec) -> String {
    spec.images().next().map_or_else(
        || {
            let name = if spec.path.is_empty() { "root" } else { spec.path.as_str() };
            format!("{DEFAULT_TAG_PREFIX}{name}")
        },
        str::to_string,
    )
}

/// Requested file outputs of `spec` with their extra requirements, in sorted order.
fn needed_files(graph: &BuildGraph, spec: &NodeSpec) -> Vec<(String, Vec<String>)> {
    let Some(needed) = graph.needed_outputs(&spec.path) else {
        return Vec::new();
    };
    needed
        .iter()
        .filter_map(Identifier::as_file)
        .filter_map(|output| {
            spec.provide(&Identifier::File(output.to_string()))
                .map(|provide| (output.to_string(), provide.requires.clone()))
        })
        .collect()
}

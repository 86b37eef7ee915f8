//! Runtime configuration.
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults (host architecture, CPU count, `build`, `podman`)
//! 2. `qbuild.toml` in the package root, if present
//! 3. `QBUILD_*` environment variables
//! 4. command-line flags
//!
//! ```toml
//! build_dir = "out"
//! arch = "aarch64"
//! jobs = 4
//! container_tool = "podman"
//!
//! [context]
//! VENDOR = "qemount"
//! ```

pub mod parser;

pub use parser::parse_config;

use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::catalogue::Context;
use crate::constants::{CONFIG_FILE, DEFAULT_BUILD_DIR, DEFAULT_CONTAINER_TOOL};
use crate::utils::{default_jobs, host_arch, normalize_arch};

/// Contents of `qbuild.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub build_dir: Option<PathBuf>,
    pub arch: Option<String>,
    pub host_arch: Option<String>,
    /// Value of `JOBS` in the substitution context
    pub jobs: Option<usize>,
    pub container_tool: Option<String>,
    /// Extra variables seeded into the substitution context
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root: Option<PathBuf>,
    pub build_dir: Option<PathBuf>,
    pub arch: Option<String>,
    pub host_arch: Option<String>,
    pub container_tool: Option<String>,
}

/// Fully resolved configuration of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub root: PathBuf,
    pub build_dir: PathBuf,
    pub arch: String,
    pub host_arch: String,
    pub jobs: usize,
    pub container_tool: String,
    pub extra_context: BTreeMap<String, String>,
}

impl BuildConfig {
    /// Defaults for a package at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let host = host_arch();
        Self {
            root: root.into(),
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            arch: host.clone(),
            host_arch: host,
            jobs: default_jobs(),
            container_tool: DEFAULT_CONTAINER_TOOL.to_string(),
            extra_context: BTreeMap::new(),
        }
    }

    /// Resolve every layer using the process environment.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        Self::load_with_env(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve every layer, reading environment variables through `env`.
    pub fn load_with_env<F>(overrides: &ConfigOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = overrides.root.clone().unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::new(root);

        let file_path = config.root.join(CONFIG_FILE);
        if file_path.is_file() {
            let file: ConfigFile = parse_config(&file_path)?;
            tracing::debug!("Loaded {}", file_path.display());
            config.apply_file(file);
        }

        config.apply_env(env);
        config.apply_overrides(overrides);
        config.arch = normalize_arch(&config.arch);
        config.host_arch = normalize_arch(&config.host_arch);
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(build_dir) = file.build_dir {
            self.build_dir = build_dir;
        }
        if let Some(arch) = file.arch {
            self.arch = arch;
        }
        if let Some(host_arch) = file.host_arch {
            self.host_arch = host_arch;
        }
        if let Some(jobs) = file.jobs {
            self.jobs = jobs.max(1);
        }
        if let Some(tool) = file.container_tool {
            self.container_tool = tool;
        }
        self.extra_context.extend(file.context);
    }

    fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(build_dir) = env("QBUILD_BUILD_DIR") {
            self.build_dir = PathBuf::from(build_dir);
        }
        if let Some(arch) = env("QBUILD_ARCH") {
            self.arch = arch;
        }
        if let Some(host_arch) = env("QBUILD_HOST_ARCH") {
            self.host_arch = host_arch;
        }
        if let Some(jobs) = env("QBUILD_JOBS") {
            match jobs.trim().parse::<usize>() {
                Ok(jobs) => self.jobs = jobs.max(1),
                Err(_) => tracing::warn!("Ignoring QBUILD_JOBS={jobs:?}: not a number"),
            }
        }
        if let Some(tool) = env("QBUILD_CONTAINER_TOOL") {
            self.container_tool = tool;
        }
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(build_dir) = &overrides.build_dir {
            self.build_dir.clone_from(build_dir);
        }
        if let Some(arch) = &overrides.arch {
            self.arch.clone_from(arch);
        }
        if let Some(host_arch) = &overrides.host_arch {
            self.host_arch.clone_from(host_arch);
        }
        if let Some(tool) = &overrides.container_tool {
            self.container_tool.clone_from(tool);
        }
    }

    /// External substitution context: `[context]` extras plus `ARCH`, `HOST_ARCH`
    /// and `JOBS`.
    #[must_use]
    pub fn context(&self) -> Context {
        let mut context = self.extra_context.clone();
        context.insert("ARCH".to_string(), self.arch.clone());
        context.insert("HOST_ARCH".to_string(), self.host_arch.clone());
        context.insert("JOBS".to_string(), self.jobs.to_string());
        context
    }

    /// Directories the document loader must not descend into.
    #[must_use]
    pub fn excluded_dirs(&self) -> Vec<PathBuf> {
        vec![self.build_dir.clone()]
    }

    #[must_use]
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }
}

//! Container tool collaborators.
//!
//! The runner never shells out directly. It talks to a [`ContainerTool`], which
//! builds tagged images from a recipe directory, answers whether an image exists,
//! and runs a recipe image against the shared build directory.
//! [`PodmanTool`] implements it with any podman-compatible CLI. Tests substitute
//! an in-process double.

pub mod command_builder;

pub use command_builder::{ContainerCommand, ContainerCommandOutput};

use anyhow::Result;
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::constants::CONTAINER_BUILD_MOUNT;
use crate::core::BuildError;

/// Inputs of one image build.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageBuild {
    /// Directory holding the recipe; used as build context
    pub context_dir: PathBuf,
    pub tag: String,
    /// Passed as `--build-arg KEY=VALUE`
    pub build_args: Vec<(String, String)>,
    /// Read-only mounts as `(host path, container path)`
    pub mounts: Vec<(PathBuf, String)>,
}

/// Inputs of one recipe run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerRun {
    pub image: String,
    /// Absolute build directory, mounted read-write at `/host/build`
    pub build_dir: PathBuf,
    pub env: Vec<(String, String)>,
    /// Output identifiers handed to the recipe as positional arguments
    pub targets: Vec<String>,
}

/// Contract the build runner depends on.
pub trait ContainerTool: Send + Sync {
    /// Whether an image with this tag or id exists locally.
    fn image_exists(&self, reference: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Build and tag an image, returning its identifier.
    fn build_image(&self, build: &ImageBuild) -> impl Future<Output = Result<String>> + Send;

    /// Run a recipe image to completion, returning its combined output.
    fn run_container(&self, run: &ContainerRun) -> impl Future<Output = Result<String>> + Send;
}

/// [`ContainerTool`] backed by a podman-compatible executable.
#[derive(Debug, Clone)]
pub struct PodmanTool {
    program: PathBuf,
}

impl PodmanTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find `tool` on `PATH` (or accept it as a path).
    ///
    /// # Errors
    ///
    /// [`BuildError::ContainerToolNotFound`] when nothing executable is found.
    pub fn locate(tool: &str) -> Result<Self> {
        let program = which::which(tool).map_err(|_| BuildError::ContainerToolNotFound {
            tool: tool.to_string(),
        })?;
        tracing::debug!(target: "container", "Using container tool {}", program.display());
        Ok(Self::new(program))
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> ContainerCommand {
        ContainerCommand::new(&self.program)
    }

    /// Arguments of `podman build` for `build`, without the program.
    #[must_use]
    pub fn build_args(build: &ImageBuild) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        for (host, container) in &build.mounts {
            args.push("--volume".to_string());
            args.push(format!("{}:{container}:ro", host.display()));
        }
        for (key, value) in &build.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push("-t".to_string());
        args.push(build.tag.clone());
        args.push(".".to_string());
        args
    }

    /// Arguments of `podman run` for `run`, without the program.
    #[must_use]
    pub fn run_args(run: &ContainerRun) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:{CONTAINER_BUILD_MOUNT}", run.build_dir.display()),
        ];
        for (key, value) in &run.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(run.image.clone());
        args.extend(run.targets.iter().cloned());
        args
    }
}

impl ContainerTool for PodmanTool {
    async fn image_exists(&self, reference: &str) -> Result<bool> {
        self.command()
            .args(["image", "exists", reference])
            .with_context(format!("image exists {reference}"))
            .succeeds()
            .await
    }

    async fn build_image(&self, build: &ImageBuild) -> Result<String> {
        tracing::info!("Building image {}", build.tag);
        self.command()
            .args(Self::build_args(build))
            .current_dir(&build.context_dir)
            .with_context(format!("build {}", build.tag))
            .execute()
            .await?;

        if !self.image_exists(&build.tag).await? {
            return Err(BuildError::ImageNotCreated {
                tag: build.tag.clone(),
            }
            .into());
        }

        self.command()
            .args(["image", "inspect", "--format", "{{.Id}}", build.tag.as_str()])
            .with_context(format!("inspect {}", build.tag))
            .execute_stdout()
            .await
    }

    async fn run_container(&self, run: &ContainerRun) -> Result<String> {
        tracing::info!("Running {} for {}", run.image, run.targets.join(" "));
        let output = self
            .command()
            .args(Self::run_args(run))
            .with_context(format!("run {}", run.image))
            .execute()
            .await?;
        Ok(output.combined())
    }
}

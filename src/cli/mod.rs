//! Command-line interface.
//!
//! # Commands
//!
//! - `dump` - print the catalogue as JSON
//! - `outputs` - list every provided output
//! - `deps` - show the build plan for some targets
//! - `build` - build targets and their dependencies
//!
//! # Global options
//!
//! - `--root <dir>` - package root (default `.`)
//! - `--build-dir <dir>` - build directory (default `build`)
//! - `--arch`, `--host-arch` - target and host architecture
//! - `--container-tool` - podman-compatible executable
//! - `-v/--verbose`, `-q/--quiet` - log level
//!
//! Targets accept globs (`data/fs/*`) and tolerate a leading `build/`.

pub mod build;
pub mod common;
pub mod deps;
pub mod dump;
pub mod outputs;

pub use common::{CommandContext, CommandExecutor, expand_targets, normalize_target};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{BuildConfig, ConfigOverrides};

#[derive(Parser, Debug)]
#[command(
    name = "qbuild",
    about = "Content-addressed build orchestrator for markdown catalogues",
    version,
    long_about = "qbuild loads a tree of markdown documents whose front-matter declares \
                  what each path provides and requires, then builds the requested outputs \
                  in dependency order inside containers, skipping anything whose inputs \
                  have not changed."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Package root containing the catalogue
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Build directory
    #[arg(long, global = true)]
    build_dir: Option<PathBuf>,

    /// Target architecture
    #[arg(long, global = true)]
    arch: Option<String>,

    /// Host architecture used for image cache keys
    #[arg(long, global = true)]
    host_arch: Option<String>,

    /// Container tool executable
    #[arg(long, global = true)]
    container_tool: Option<String>,

    /// Enable debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the catalogue as JSON
    Dump(dump::DumpCommand),

    /// List every output the catalogue provides
    Outputs(outputs::OutputsCommand),

    /// Show the dependency plan for targets
    Deps(deps::DepsCommand),

    /// Build targets and everything they depend on
    Build(build::BuildCommand),
}

impl Cli {
    /// Default log filter for the chosen verbosity.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            root: self.root.clone(),
            build_dir: self.build_dir.clone(),
            arch: self.arch.clone(),
            host_arch: self.host_arch.clone(),
            container_tool: self.container_tool.clone(),
        }
    }

    pub async fn execute(self) -> Result<()> {
        let config = BuildConfig::load(&self.overrides())?;
        self.execute_with_config(config).await
    }

    pub async fn execute_with_config(self, config: BuildConfig) -> Result<()> {
        let ctx = CommandContext::load(config)?;
        match self.command {
            Commands::Dump(cmd) => cmd.execute(&ctx).await,
            Commands::Outputs(cmd) => cmd.execute(&ctx).await,
            Commands::Deps(cmd) => cmd.execute(&ctx).await,
            Commands::Build(cmd) => cmd.execute(&ctx).await,
        }
    }
}

//! qbuild - content-addressed build orchestrator
//!
//! A package is a tree of markdown documents. Each document's YAML front-matter
//! declares, for one logical path, what that path `provides` (files under the build
//! directory or `docker:` images), what it `requires`, its `env`, and how it builds
//! (a `Dockerfile` next to the document or a `runs_on` image). Metadata is
//! inherited from parent paths, `${VAR}` references are substituted, and requested
//! outputs are built in dependency order inside containers. A Merkle hash cache
//! skips every step whose inputs are unchanged.
//!
//! # Pipeline
//!
//! 1. [`markdown`] - load documents and split front-matter from body
//! 2. [`catalogue`] - map documents to logical paths, merge inherited metadata,
//!    substitute variables
//! 3. [`resolver`] - index providers and build the ordered dependency graph
//! 4. [`cache`] - hash inputs and decide what is dirty
//! 5. [`runner`] - drive the [`container`] tool through the graph
//!
//! # Supporting modules
//!
//! - [`cli`] - command-line interface
//! - [`config`] - layered runtime configuration (`qbuild.toml`, `QBUILD_*`, flags)
//! - [`core`] - error types and user-facing error reporting
//! - [`utils`] - atomic writes, directory helpers, architecture detection
//!
//! # Example
//!
//! ```rust,no_run
//! use qbuild::catalogue::Catalogue;
//! use qbuild::config::BuildConfig;
//! use qbuild::container::PodmanTool;
//! use qbuild::runner::BuildRunner;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = BuildConfig::new(".");
//! let catalogue = Catalogue::load(&config.root, &config.excluded_dirs())?;
//! let tool = PodmanTool::locate(&config.container_tool)?;
//! let summary = BuildRunner::new(&config.root, &config.build_dir, &config.host_arch, &tool)?
//!     .build(&catalogue, &config.context(), &["data/fs/ext4"])
//!     .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalogue;
pub mod cli;
pub mod config;
pub mod constants;
pub mod container;
pub mod core;
pub mod markdown;
pub mod resolver;
pub mod runner;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

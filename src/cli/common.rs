//! Shared plumbing for CLI commands.

use anyhow::Result;
use std::future::Future;

use crate::catalogue::{Catalogue, Context};
use crate::config::BuildConfig;
use crate::constants::TARGET_BUILD_PREFIX;
use crate::core::BuildError;
use crate::resolver::ProvidesIndex;

/// Common trait for CLI command execution.
pub trait CommandExecutor: Sized {
    fn execute(self, ctx: &CommandContext) -> impl Future<Output = Result<()>> + Send;
}

/// Everything a command needs: resolved configuration and the loaded catalogue.
#[derive(Debug)]
pub struct CommandContext {
    pub config: BuildConfig,
    pub catalogue: Catalogue,
    pub context: Context,
}

impl CommandContext {
    /// Load the catalogue of the configured package root.
    pub fn load(config: BuildConfig) -> Result<Self> {
        let catalogue = Catalogue::load(&config.root, &config.excluded_dirs())?;
        let context = config.context();
        Ok(Self {
            config,
            catalogue,
            context,
        })
    }

    pub fn provides_index(&self) -> Result<ProvidesIndex> {
        ProvidesIndex::build(&self.catalogue.resolver(&self.context))
    }
}

/// Strip one leading `build/`, so paths copied from a build directory listing work.
#[must_use]
pub fn normalize_target(target: &str) -> &str {
    target.strip_prefix(TARGET_BUILD_PREFIX).unwrap_or(target)
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expand target patterns against the provided outputs.
///
/// Literals pass through unchanged, even when nothing provides them (the graph
/// builder reports that). Globs match against every provided output in sorted
/// order. Duplicates are dropped, keeping the first occurrence.
///
/// # Errors
///
/// [`BuildError::NoTargetsMatched`] for a glob with no match, or an error for an
/// invalid glob.
pub fn expand_targets<S: AsRef<str>>(patterns: &[S], index: &ProvidesIndex) -> Result<Vec<String>> {
    let mut targets: Vec<String> = Vec::new();
    let mut push = |target: &str| {
        if !targets.iter().any(|t| t == target) {
            targets.push(target.to_string());
        }
    };

    for pattern in patterns {
        let pattern = normalize_target(pattern.as_ref());
        if !is_glob(pattern) {
            push(pattern);
            continue;
        }

        let glob = glob::Pattern::new(pattern).map_err(|err| BuildError::Other {
            message: format!("Invalid target pattern '{pattern}': {err}"),
        })?;
        let mut matched = false;
        for output in index.outputs().filter(|output| glob.matches(output)) {
            matched = true;
            push(output);
        }
        if !matched {
            return Err(BuildError::NoTargetsMatched {
                pattern: pattern.to_string(),
            }
            .into());
        }
    }

    tracing::debug!("Expanded targets: {:?}", targets);
    Ok(targets)
}

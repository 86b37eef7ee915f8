//! Error handling for qbuild
//!
//! Library functions return [`anyhow::Result`]; every failure with build meaning is
//! raised as a [`BuildError`] variant wrapped into [`anyhow::Error`], so callers can
//! still `downcast_ref::<BuildError>()` to react to a specific case.
//!
//! # Error Categories
//!
//! - **Configuration**: [`BuildError::DuplicateProvider`], [`BuildError::ProviderNotFound`],
//!   [`BuildError::MissingRecipe`], [`BuildError::NoBuildMechanism`],
//!   [`BuildError::MalformedRunsOn`], [`BuildError::ConfigError`]
//! - **Structural**: [`BuildError::DependencyCycle`]
//! - **External tool**: [`BuildError::ContainerToolNotFound`],
//!   [`BuildError::ContainerToolFailed`], [`BuildError::ImageNotCreated`]
//! - **Postcondition**: [`BuildError::OutputNotCreated`]
//!
//! All of them are fatal for the whole build. A missing or unreadable hash cache is
//! deliberately not in this list: it degrades to an empty cache with a warning.
//!
//! # Examples
//!
//! ```rust,no_run
//! use qbuild::core::{BuildError, user_friendly_error};
//!
//! let error = BuildError::DependencyCycle {
//!     chain: vec!["a".into(), "b".into(), "a".into()],
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Every failure the catalogue, graph builder, cache and runner can report.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Two catalogue paths declare the same output in `provides`.
    ///
    /// # Fields
    /// - `output`: the contested output identifier
    /// - `first`: the path indexed first
    /// - `second`: the path that tried to claim it again
    #[error("Duplicate provider for {output}: {first} and {second}")]
    DuplicateProvider {
        /// Output identifier provided twice
        output: String,
        /// Path that already provides the output
        first: String,
        /// Path that also claims it
        second: String,
    },

    /// No catalogue path provides an output and no such file exists in the build
    /// directory.
    #[error("{}", provider_message(output, required_by.as_deref()))]
    ProviderNotFound {
        /// Output that could not be resolved
        output: String,
        /// Path whose `requires` named it, `None` for a requested target
        required_by: Option<String>,
    },

    /// A logical path was asked for that the catalogue does not contain.
    #[error("Path not found in catalogue: {path}")]
    PathNotFound {
        /// The missing logical path
        path: String,
    },

    /// `requires` edges form a cycle.
    ///
    /// The chain starts and ends with the same path.
    #[error("Dependency cycle: {}", chain.iter().map(|p| display_path(p)).collect::<Vec<_>>().join(" -> "))]
    DependencyCycle {
        /// Paths from the first occurrence of the repeated path through the repeat
        chain: Vec<String>,
    },

    /// A path provides a container image but has no recipe to build it.
    #[error("{} provides docker image but has no Dockerfile", display_path(path))]
    MissingRecipe {
        /// Offending logical path
        path: String,
    },

    /// A path provides files but has neither a recipe nor a `runs_on` image.
    #[error("{} provides files but has no Dockerfile or runs_on", display_path(path))]
    NoBuildMechanism {
        /// Offending logical path
        path: String,
    },

    /// `runs_on` is set to something other than a `docker:` reference.
    #[error("{}: runs_on must start with 'docker:', got: {value}", display_path(path))]
    MalformedRunsOn {
        /// Offending logical path
        path: String,
        /// The value found in metadata
        value: String,
    },

    /// The configured container tool is not on `PATH`.
    #[error("Container tool '{tool}' not found")]
    ContainerToolNotFound {
        /// Executable name that was looked up
        tool: String,
    },

    /// The container tool exited unsuccessfully.
    #[error("Container {operation} failed ({status})")]
    ContainerToolFailed {
        /// What was attempted, e.g. `build localhost/tools`
        operation: String,
        /// Exit status description
        status: String,
        /// Captured stdout and stderr
        output: String,
    },

    /// A build reported success but the tagged image does not exist.
    #[error("Image was not created: {tag}")]
    ImageNotCreated {
        /// Tag that should exist after the build
        tag: String,
    },

    /// A run reported success but a requested output is missing.
    #[error("Output was not created: {output} (by {})", display_path(path))]
    OutputNotCreated {
        /// Missing output identifier
        output: String,
        /// Path whose recipe should have produced it
        path: String,
        /// Captured container output for diagnosis
        output_log: String,
    },

    /// A document's YAML front-matter could not be parsed.
    #[error("Invalid front-matter in {file}: {reason}")]
    FrontmatterParse {
        /// Document path relative to the package root
        file: String,
        /// Parser message
        reason: String,
    },

    /// A target glob matched no provided output.
    #[error("No outputs match: {pattern}")]
    NoTargetsMatched {
        /// The glob that matched nothing
        pattern: String,
    },

    /// Invalid configuration file or option.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

// Root is the empty string; show it as "." so messages stay readable.
fn display_path(path: &str) -> &str {
    if path.is_empty() { "." } else { path }
}

fn provider_message(output: &str, required_by: Option<&str>) -> String {
    match required_by {
        Some(requester) => {
            format!("No provider for {output} required by {}", display_path(requester))
        }
        None => format!("No provider for target: {output}"),
    }
}

impl Clone for BuildError {
    fn clone(&self) -> Self {
        match self {
            Self::DuplicateProvider {
                output,
                first,
                second,
            } => Self::DuplicateProvider {
                output: output.clone(),
                first: first.clone(),
                second: second.clone(),
            },
            Self::ProviderNotFound {
                output,
                required_by,
            } => Self::ProviderNotFound {
                output: output.clone(),
                required_by: required_by.clone(),
            },
            Self::PathNotFound {
                path,
            } => Self::PathNotFound {
                path: path.clone(),
            },
            Self::DependencyCycle {
                chain,
            } => Self::DependencyCycle {
                chain: chain.clone(),
            },
            Self::MissingRecipe {
                path,
            } => Self::MissingRecipe {
                path: path.clone(),
            },
            Self::NoBuildMechanism {
                path,
            } => Self::NoBuildMechanism {
                path: path.clone(),
            },
            Self::MalformedRunsOn {
                path,
                value,
            } => Self::MalformedRunsOn {
                path: path.clone(),
                value: value.clone(),
            },
            Self::ContainerToolNotFound {
                tool,
            } => Self::ContainerToolNotFound {
                tool: tool.clone(),
            },
            Self::ContainerToolFailed {
                operation,
                status,
                output,
            } => Self::ContainerToolFailed {
                operation: operation.clone(),
                status: status.clone(),
                output: output.clone(),
            },
            Self::ImageNotCreated {
                tag,
            } => Self::ImageNotCreated {
                tag: tag.clone(),
            },
            Self::OutputNotCreated {
                output,
                path,
                output_log,
            } => Self::OutputNotCreated {
                output: output.clone(),
                path: path.clone(),
                output_log: output_log.clone(),
            },
            Self::FrontmatterParse {
                file,
                reason,
            } => Self::FrontmatterParse {
                file: file.clone(),
                reason: reason.clone(),
            },
            Self::NoTargetsMatched {
                pattern,
            } => Self::NoTargetsMatched {
                pattern: pattern.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            // io::Error is not Clone
            Self::IoError(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// A [`BuildError`] plus optional details and a suggestion, for CLI display.
///
/// ```rust,no_run
/// use qbuild::core::{BuildError, ErrorContext};
///
/// let context = ErrorContext::new(BuildError::ContainerToolNotFound { tool: "podman".into() })
///     .with_suggestion("Install podman or pass --container-tool");
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: BuildError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: BuildError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print to stderr: error in red, details in yellow, suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with a suggestion where one is known.
///
/// [`BuildError`] variants get tailored suggestions; IO errors get filesystem hints;
/// anything else is shown with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(build_error) = error.downcast_ref::<BuildError>() {
        return create_error_context(build_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(BuildError::Other {
                message: error.to_string(),
            })
            .with_suggestion("Check ownership of the package tree and the build directory");
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(BuildError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax in qbuild.toml");
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(BuildError::Other {
        message,
    })
}

fn create_error_context(error: BuildError) -> ErrorContext {
    match &error {
        BuildError::DuplicateProvider { .. } => ErrorContext::new(error)
            .with_suggestion("Remove the output from one of the two paths' provides, or add it to no_inherit if a child inherits it by accident"),

        BuildError::ProviderNotFound { output, .. } => {
            let suggestion = format!(
                "Add '{output}' to the provides of a catalogue path, or place the file in the build directory. Run 'qbuild outputs' to list known outputs"
            );
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        BuildError::DependencyCycle { .. } => ErrorContext::new(error)
            .with_suggestion("Break the cycle by removing one of the requires entries along the chain"),

        BuildError::MissingRecipe { .. } | BuildError::NoBuildMechanism { .. } => ErrorContext::new(error)
            .with_suggestion("Add a Dockerfile next to the path's document, or set runs_on: docker:<image> to reuse an existing image"),

        BuildError::MalformedRunsOn { .. } => ErrorContext::new(error)
            .with_suggestion("Write runs_on as docker:<tag>"),

        BuildError::ContainerToolNotFound { tool } => {
            let suggestion = format!("Install {tool}, or point --container-tool / QBUILD_CONTAINER_TOOL at a compatible executable");
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        BuildError::ContainerToolFailed { output, .. } => {
            let details = tail_lines(output, 20);
            ErrorContext::new(error)
                .with_details(details)
                .with_suggestion("Fix the recipe and re-run; completed steps are cached and will be skipped")
        }

        BuildError::OutputNotCreated { output_log, .. } => {
            let details = tail_lines(output_log, 20);
            ErrorContext::new(error)
                .with_details(details)
                .with_suggestion("The recipe must write every requested output under /host/build before exiting")
        }

        BuildError::NoTargetsMatched { .. } => ErrorContext::new(error)
            .with_suggestion("Run 'qbuild outputs' to list available targets"),

        _ => ErrorContext::new(error),
    }
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

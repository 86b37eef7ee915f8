//! Test utilities for qbuild
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration tests:
//!
//! - [`init_test_logging`] - opt-in tracing output for tests
//! - [`catalogue_from_json`] - an in-memory catalogue without any files
//! - [`PackageFixture`] - a package tree on disk
//! - [`FakeContainerTool`] - an in-process [`ContainerTool`](crate::container::ContainerTool)
//!   that records calls and writes requested outputs
//!
//! # Example
//!
//! ```rust,no_run
//! use qbuild::test_utils::{FakeContainerTool, PackageFixture};
//!
//! let package = PackageFixture::new().unwrap();
//! package.doc("docs/tools.md", "provides: [tools/out]", "").unwrap();
//! package.recipe("tools").unwrap();
//! let tool = FakeContainerTool::new();
//! ```

pub mod fake_tool;
pub mod fixtures;

pub use fake_tool::{FakeContainerTool, ToolCall};
pub use fixtures::PackageFixture;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::catalogue::{Catalogue, CataloguePath};

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` if given, else `RUST_LOG` if set, else stays silent. Only the
/// first call has any effect.
///
/// ```bash
/// RUST_LOG=qbuild=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true) // Show targets like "container" and "cache"
            .with_thread_ids(false)
            .try_init();
    });
}

/// Build a catalogue from `{logical path: merged metadata}`.
///
/// The metadata is taken as already inherited. Each path gets one synthetic source
/// `<path>.md`.
///
/// # Panics
///
/// If `paths` is not an object or a value is not an object.
#[must_use]
pub fn catalogue_from_json(paths: Value) -> Catalogue {
    let Value::Object(paths) = paths else {
        panic!("catalogue fixture must be an object");
    };
    let paths: BTreeMap<String, CataloguePath> = paths
        .into_iter()
        .map(|(path, meta)| {
            let Value::Object(meta) = meta else {
                panic!("metadata of {path:?} must be an object");
            };
            let source = format!("{path}.md");
            (
                path,
                CataloguePath {
                    meta,
                    sources: vec![source],
                },
            )
        })
        .collect();
    Catalogue::from_paths(paths)
}

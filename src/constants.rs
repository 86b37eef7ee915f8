//! Fixed names shared across the catalogue, cache and runner.
//!
//! Anything that is part of the on-disk or in-container contract lives here so the
//! layout of a package tree and a build directory is defined in one place.

/// Extension of catalogue documents.
pub const DOCUMENT_EXTENSION: &str = "md";

/// Line that opens and closes a document's YAML front-matter.
pub const FRONTMATTER_DELIMITER: &str = "---";

/// Leading directory stripped from document paths before mapping.
pub const DOCS_PREFIX: &str = "docs/";

/// File names that collapse onto their parent directory's logical path.
pub const INDEX_STEMS: [&str; 2] = ["index", "README"];

/// Persisted hash cache, relative to the build directory.
pub const CACHE_FILE: &str = "cache/hashes.json";

/// Catalogue snapshot written into the build directory before every build.
pub const CATALOGUE_SNAPSHOT: &str = "catalogue.json";

/// Container recipe expected in a path's context directory.
pub const RECIPE_FILE: &str = "Dockerfile";

/// Prefix that marks an identifier as a container image rather than a file.
pub const IMAGE_PREFIX: &str = "docker:";

/// Tag prefix for images built by paths that do not name their own image.
pub const DEFAULT_TAG_PREFIX: &str = "localhost/";

/// Where the build directory is mounted inside containers.
pub const CONTAINER_BUILD_MOUNT: &str = "/host/build";

/// Environment variable carrying the node's resolved metadata as JSON.
pub const META_ENV_VAR: &str = "META";

/// Context variable bound to the logical path being resolved.
pub const SELF_VAR: &str = "SELF";

/// Default external container tool.
pub const DEFAULT_CONTAINER_TOOL: &str = "podman";

/// Default build directory, relative to the working directory.
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Optional per-package configuration file.
pub const CONFIG_FILE: &str = "qbuild.toml";

/// Prefix accepted (and stripped) on CLI targets.
pub const TARGET_BUILD_PREFIX: &str = "build/";

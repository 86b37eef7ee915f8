//! Host platform helpers.

use std::path::Path;

/// Map a machine name to the architecture names used in catalogue metadata.
///
/// `arm64` (as reported by macOS) becomes `aarch64`; `amd64` becomes `x86_64`.
/// Anything else is returned unchanged.
#[must_use]
pub fn normalize_arch(machine: &str) -> String {
    match machine {
        "arm64" => "aarch64".to_string(),
        "amd64" => "x86_64".to_string(),
        other => other.to_string(),
    }
}

/// Architecture of the machine running the build, in catalogue naming.
#[must_use]
pub fn host_arch() -> String {
    normalize_arch(std::env::consts::ARCH)
}

// Upper bound on the default job count handed to recipes.
const MAX_DEFAULT_JOBS: usize = 16;

/// Default parallelism hint for recipes: the CPU count, clamped to `1..=16`.
#[must_use]
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map_or(1, std::num::NonZeroUsize::get)
        .clamp(1, MAX_DEFAULT_JOBS)
}

/// Render a relative path with forward slashes on every platform.
///
/// Logical catalogue paths and hash inputs must not depend on the host separator.
#[must_use]
pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

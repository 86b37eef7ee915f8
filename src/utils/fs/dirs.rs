//! Directory creation and removal helpers.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::DirEntry;

/// Create `path` and all missing parents.
///
/// # Errors
///
/// Fails if creation fails or if `path` exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

/// Remove a file or a whole directory tree. Missing paths are not an error.
///
/// Symlinks are removed themselves, never followed.
pub fn remove_path(path: &Path) -> Result<()> {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return Ok(());
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    } else {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove file: {}", path.display()))?;
    }
    Ok(())
}

/// Whether a walk should skip `entry`: hidden directories and any directory in
/// `exclude`. Files are never skipped.
#[must_use]
pub fn is_excluded_dir(entry: &DirEntry, exclude: &[PathBuf]) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let hidden = entry.file_name().to_string_lossy().starts_with('.');
    hidden || exclude.iter().any(|excluded| same_path(entry.path(), excluded))
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

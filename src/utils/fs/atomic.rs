//! Atomic file writes: write a sibling temp file, sync it, then rename over the target.

use crate::utils::fs::dirs::ensure_dir;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Atomically replace `path` with `content`.
///
/// The parent directory is created if needed. Content is written to
/// `<path>.tmp`, flushed to disk, and renamed over `path`, so readers see either
/// the previous file or the complete new one.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created, the temp file
/// cannot be written or synced, or the rename fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = path.with_extension(tmp_extension(path));

    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

    Ok(())
}

/// Atomically write `content` unless `path` already holds exactly these bytes.
///
/// Returns `true` when the file was (re)written. Leaving identical files alone keeps
/// their mtime stable, which keeps downstream hash lookups on the fast path.
pub fn write_if_changed(path: &Path, content: &[u8]) -> Result<bool> {
    if fs::read(path).is_ok_and(|existing| existing == content) {
        return Ok(false);
    }
    atomic_write(path, content)?;
    Ok(true)
}

// `hashes.json` -> `hashes.json.tmp`, not `hashes.tmp`
fn tmp_extension(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("cache").join("hashes.json");

        atomic_write(&file_path, b"{}").unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "{}");
        assert!(!temp.path().join("cache").join("hashes.json.tmp").exists());
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("catalogue.json");

        atomic_write(&file, b"first").unwrap();
        atomic_write(&file, b"second").unwrap();

        assert_eq!(fs::read_to_string(&file).unwrap(), "second");
    }

    #[test]
    fn test_write_if_changed_skips_identical_content() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("catalogue.json");

        assert!(write_if_changed(&file, b"same").unwrap());
        assert!(!write_if_changed(&file, b"same").unwrap());
        assert!(write_if_changed(&file, b"different").unwrap());
        assert_eq!(fs::read_to_string(&file).unwrap(), "different");
    }
}

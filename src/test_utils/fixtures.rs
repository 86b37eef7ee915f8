//! On-disk package fixtures.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::catalogue::Catalogue;
use crate::constants::{DEFAULT_BUILD_DIR, RECIPE_FILE};

/// A package tree in a temporary directory, with its build directory at `build/`.
#[derive(Debug)]
pub struct PackageFixture {
    temp: TempDir,
}

impl PackageFixture {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp: tempfile::tempdir().context("Failed to create temp dir")?,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    #[must_use]
    pub fn build_dir(&self) -> PathBuf {
        self.root().join(DEFAULT_BUILD_DIR)
    }

    /// Write any file relative to the package root.
    pub fn file(&self, rel: &str, content: &str) -> Result<PathBuf> {
        Self::write(self.root().join(rel.trim_start_matches('/')), content)
    }

    fn write(path: PathBuf, content: &str) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Write a document with `front_matter` (YAML, without delimiters) and `body`.
    pub fn doc(&self, rel: &str, front_matter: &str, body: &str) -> Result<PathBuf> {
        self.file(rel, &format!("---\n{front_matter}\n---\n{body}"))
    }

    /// Put a recipe in the context directory of logical path `path` (`""` is the root).
    pub fn recipe(&self, path: &str) -> Result<PathBuf> {
        Self::write(self.root().join(path).join(RECIPE_FILE), "FROM scratch\n")
    }

    /// Write a file into the build directory.
    pub fn build_file(&self, rel: &str, content: &str) -> Result<PathBuf> {
        Self::write(self.build_dir().join(rel), content)
    }

    pub fn read_build_file(&self, rel: &str) -> Result<String> {
        let path = self.build_dir().join(rel);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    /// Load the catalogue, excluding the build directory.
    pub fn catalogue(&self) -> Result<Catalogue> {
        Catalogue::load(self.root(), &[self.build_dir()])
    }
}

//! Incremental build cache.
//!
//! Every build directory carries one cache file, `cache/hashes.json`, mapping
//!
//! - an output path to a [`FileEntry`]: the input hash that produced the file plus
//!   the file's own digest, mtime and size
//! - `docker:<tag>:<host arch>` to an [`ImageEntry`]: the input hash and the image id
//!
//! A step is clean when its freshly computed input hash equals the recorded one.
//! Input hashes are Merkle-style: a path's hash covers its dependencies' hashes,
//! so a change anywhere upstream dirties everything downstream.
//!
//! The cache is loaded once at the start of a run and saved atomically after
//! every successful step. A missing or unreadable file is an empty cache.

pub mod hash;

pub use hash::{FileHasher, FileStamp, digest_bytes};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::catalogue::NodeSpec;
use crate::constants::{CACHE_FILE, IMAGE_PREFIX};
use crate::utils::atomic_write;

/// Record of a file output produced by a build step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub input_hash: String,
    /// Digest of the output's content when it was recorded
    pub hash: String,
    pub mtime: f64,
    pub size: u64,
}

/// Record of a built container image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub input_hash: String,
    /// Image identifier reported by the container tool
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheEntry {
    File(FileEntry),
    Image(ImageEntry),
}

/// The persisted cache of one build directory plus the in-memory file hasher.
#[derive(Debug)]
pub struct BuildCache {
    build_dir: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
    hasher: FileHasher,
}

impl BuildCache {
    /// Load the cache of `build_dir`.
    ///
    /// A missing file gives an empty cache; an unreadable or unparsable one is
    /// logged and also gives an empty cache, so everything rebuilds.
    #[must_use]
    pub fn load(build_dir: &Path) -> Self {
        let path = build_dir.join(CACHE_FILE);
        let entries = match std::fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data).unwrap_or_else(|err| {
                tracing::warn!("Ignoring unreadable build cache {}: {}", path.display(), err);
                BTreeMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                tracing::warn!("Failed to load build cache from {}: {}", path.display(), err);
                BTreeMap::new()
            }
        };

        Self {
            build_dir: build_dir.to_path_buf(),
            entries,
            hasher: FileHasher::new(),
        }
    }

    /// Atomically write the cache file, keys sorted.
    pub fn save(&self) -> Result<()> {
        let data =
            serde_json::to_vec_pretty(&self.entries).context("Failed to serialize build cache")?;
        atomic_write(&self.path(), &data)
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.build_dir.join(CACHE_FILE)
    }

    #[must_use]
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    #[must_use]
    pub const fn entries(&self) -> &BTreeMap<String, CacheEntry> {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Cache key of an image for one host architecture.
    #[must_use]
    pub fn image_key(tag: &str, host_arch: &str) -> String {
        format!("{IMAGE_PREFIX}{tag}:{host_arch}")
    }

    /// Input hash of a catalogue path; see [`FileHasher::hash_path_inputs`].
    pub fn hash_path_inputs(
        &mut self,
        spec: &NodeSpec,
        package_root: &Path,
        dep_hashes: &HashMap<String, String>,
    ) -> Result<String> {
        self.hasher.hash_path_inputs(spec, package_root, dep_hashes, &self.build_dir)
    }

    pub fn hash_output_inputs(&mut self, base: &str, output_requires: &[String]) -> Result<String> {
        self.hasher.hash_output_inputs(base, output_requires, &self.build_dir)
    }

    /// Whether `output` must be rebuilt for a path whose input hash is `input_hash`.
    ///
    /// Dirty when the file is missing, has no file entry, or was produced from
    /// different inputs.
    pub fn is_output_dirty(
        &mut self,
        output: &str,
        input_hash: &str,
        output_requires: &[String],
    ) -> Result<bool> {
        if !self.build_dir.join(output).exists() {
            tracing::debug!(target: "cache", "{output}: missing");
            return Ok(true);
        }
        let Some(CacheEntry::File(entry)) = self.entries.get(output) else {
            tracing::debug!(target: "cache", "{output}: not in cache");
            return Ok(true);
        };
        let recorded = entry.input_hash.clone();
        let expected = self.hash_output_inputs(input_hash, output_requires)?;
        let dirty = recorded != expected;
        if dirty {
            tracing::debug!(target: "cache", "{output}: inputs changed");
        }
        Ok(dirty)
    }

    /// Whether the image `tag` must be rebuilt on `host_arch`.
    ///
    /// Dirty when there is no entry, the inputs changed, or `image_exists` says the
    /// recorded image id is gone (for instance after an image prune). The probe is
    /// only consulted when everything else says clean.
    pub async fn is_image_dirty<F, Fut>(
        &self,
        tag: &str,
        input_hash: &str,
        host_arch: &str,
        image_exists: F,
    ) -> Result<bool>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let key = Self::image_key(tag, host_arch);
        let Some(CacheEntry::Image(entry)) = self.entries.get(&key) else {
            tracing::debug!(target: "cache", "{key}: not in cache");
            return Ok(true);
        };
        if entry.input_hash != input_hash {
            tracing::debug!(target: "cache", "{key}: inputs changed");
            return Ok(true);
        }
        if !image_exists(entry.hash.clone()).await? {
            tracing::debug!(target: "cache", "{key}: image {} no longer exists", entry.hash);
            return Ok(true);
        }
        Ok(false)
    }

    /// Record that `output` was produced from `input_hash`.
    pub fn update_output_hash(
        &mut self,
        output: &str,
        input_hash: &str,
        output_requires: &[String],
    ) -> Result<()> {
        let full = self.build_dir.join(output);
        let expected = self.hash_output_inputs(input_hash, output_requires)?;
        let hash = self.hasher.hash_path(&full)?.unwrap_or_default();
        let stamp = FileStamp::of(&full)?;
        self.entries.insert(
            output.to_string(),
            CacheEntry::File(FileEntry {
                input_hash: expected,
                hash,
                mtime: stamp.mtime,
                size: stamp.size,
            }),
        );
        Ok(())
    }

    /// Record that `tag` was built on `host_arch` from `input_hash` as `image_id`.
    pub fn update_image_hash(&mut self, tag: &str, input_hash: &str, image_id: &str, host_arch: &str) {
        self.entries.insert(
            Self::image_key(tag, host_arch),
            CacheEntry::Image(ImageEntry {
                input_hash: input_hash.to_string(),
                hash: image_id.to_string(),
            }),
        );
    }
}

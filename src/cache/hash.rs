//! Content digests for build inputs.
//!
//! All digests are SHA-256, rendered as `sha256:<hex>`. A [`FileHasher`] remembers
//! every file it hashed together with its mtime and size, and returns the remembered
//! digest while both are unchanged. A file rewritten with identical size inside the
//! same mtime tick is therefore not re-read; that is an accepted blind spot.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::catalogue::NodeSpec;
use crate::utils::{is_excluded_dir, to_slash_path};

/// Digest of `bytes` as `sha256:<hex>`.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> String {
    finish(Sha256::new().chain_update(bytes))
}

fn finish(hasher: Sha256) -> String {
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Modification time (seconds since the epoch) and size of a file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStamp {
    pub mtime: f64,
    pub size: u64,
}

impl FileStamp {
    pub fn of(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)
            .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0.0, |d| d.as_secs_f64());
        Ok(Self {
            mtime,
            size: metadata.len(),
        })
    }
}

#[derive(Debug, Clone)]
struct Recorded {
    stamp: FileStamp,
    digest: String,
}

/// Process-local file digest cache keyed by absolute path.
#[derive(Debug, Default)]
pub struct FileHasher {
    records: HashMap<PathBuf, Recorded>,
}

impl FileHasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of a file's content, reusing the last digest while mtime and size match.
    pub fn hash_file(&mut self, path: &Path) -> Result<String> {
        let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let stamp = FileStamp::of(&key)?;

        if let Some(recorded) = self.records.get(&key) {
            if recorded.stamp == stamp {
                return Ok(recorded.digest.clone());
            }
        }

        let content =
            fs::read(&key).with_context(|| format!("Failed to read file: {}", key.display()))?;
        let digest = digest_bytes(&content);
        tracing::trace!(target: "cache", "Hashed {} -> {digest}", key.display());
        self.records.insert(
            key,
            Recorded {
                stamp,
                digest: digest.clone(),
            },
        );
        Ok(digest)
    }

    /// Digest of every file under `dir`, ordered by relative path.
    ///
    /// A missing directory hashes like an empty one.
    pub fn hash_directory(&mut self, dir: &Path) -> Result<String> {
        self.hash_tree(dir, None)
    }

    /// Digest of a recipe context directory.
    ///
    /// Like [`hash_directory`](Self::hash_directory) but leaves out hidden
    /// directories and everything under `exclude`, so a build directory nested in
    /// the context never feeds its own outputs back into the hash.
    pub fn hash_context(&mut self, dir: &Path, exclude: &[PathBuf]) -> Result<String> {
        self.hash_tree(dir, Some(exclude))
    }

    fn hash_tree(&mut self, dir: &Path, exclude: Option<&[PathBuf]>) -> Result<String> {
        let mut files: Vec<(String, PathBuf)> = Vec::new();
        if dir.is_dir() {
            let walker = WalkDir::new(dir).follow_links(false).into_iter().filter_entry(|entry| {
                entry.depth() == 0 || exclude.is_none_or(|excluded| !is_excluded_dir(entry, excluded))
            });
            for entry in walker {
                let entry = entry
                    .with_context(|| format!("Failed to read directory entry in: {}", dir.display()))?;
                if entry.file_type().is_file() {
                    let relative = to_slash_path(entry.path().strip_prefix(dir).unwrap_or(entry.path()));
                    files.push((relative, entry.into_path()));
                }
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = Sha256::new();
        for (relative, path) in &files {
            let digest = self.hash_file(path)?;
            hasher.update(format!("{relative}:{digest}\n").as_bytes());
        }
        Ok(finish(hasher))
    }

    /// Digest of a file or directory, `None` if nothing exists at `path`.
    pub fn hash_path(&mut self, path: &Path) -> Result<Option<String>> {
        if path.is_dir() {
            self.hash_directory(path).map(Some)
        } else if path.is_file() {
            self.hash_file(path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Merkle input hash of one catalogue path.
    ///
    /// Combines, in order:
    /// 1. the path's context directory under `package_root`, without `build_dir`
    /// 2. each requirement (sorted) with its hash from `dep_hashes`, or else the
    ///    live content hash of that name under `build_dir`
    /// 3. each `build_requires` entry (sorted) with its content hash under `build_dir`
    /// 4. the env pairs sorted by key, if any
    pub fn hash_path_inputs(
        &mut self,
        spec: &NodeSpec,
        package_root: &Path,
        dep_hashes: &HashMap<String, String>,
        build_dir: &Path,
    ) -> Result<String> {
        let mut hasher = Sha256::new();

        let context_dir = package_root.join(&spec.path);
        let context_digest = self.hash_context(&context_dir, &[build_dir.to_path_buf()])?;
        hasher.update(format!("context:{context_digest}\n").as_bytes());

        let mut requires: Vec<&String> = spec.requires.iter().collect();
        requires.sort();
        for key in requires {
            let digest = match dep_hashes.get(key) {
                Some(hash) => Some(hash.clone()),
                None => self.hash_path(&build_dir.join(key))?,
            };
            hasher.update(format!("requires:{key}:{}\n", digest.unwrap_or_default()).as_bytes());
        }

        let mut build_requires: Vec<&String> = spec.build_requires.iter().collect();
        build_requires.sort();
        for key in build_requires {
            let digest = self.hash_path(&build_dir.join(key))?.unwrap_or_default();
            hasher.update(format!("build_requires:{key}:{digest}\n").as_bytes());
        }

        if !spec.env.is_empty() {
            let env: BTreeMap<&str, &str> =
                spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            let env_json = serde_json::to_string(&env).context("Failed to serialize env")?;
            hasher.update(format!("env:{env_json}\n").as_bytes());
        }

        let digest = finish(hasher);
        tracing::debug!(target: "cache", "Input hash for {:?}: {digest}", spec.path);
        Ok(digest)
    }

    /// Extend a path's input hash with the output's own extra requirements.
    ///
    /// Without extra requirements the base hash is returned unchanged.
    pub fn hash_output_inputs(
        &mut self,
        base: &str,
        output_requires: &[String],
        build_dir: &Path,
    ) -> Result<String> {
        if output_requires.is_empty() {
            return Ok(base.to_string());
        }

        let mut sorted: Vec<&String> = output_requires.iter().collect();
        sorted.sort();

        let mut hasher = Sha256::new();
        hasher.update(format!("base:{base}\n").as_bytes());
        for key in sorted {
            let digest = self.hash_path(&build_dir.join(key))?.unwrap_or_default();
            hasher.update(format!("output_requires:{key}:{digest}\n").as_bytes());
        }
        Ok(finish(hasher))
    }
}

//! Filesystem and platform helpers shared across the build pipeline.
//!
//! - [`fs`]: atomic writes and directory management for the build directory
//! - [`platform`]: host architecture and job count detection, path normalisation

pub mod fs;
pub mod platform;

pub use fs::{
    atomic_write, ensure_dir, ensure_parent_dir, is_excluded_dir, remove_path, write_if_changed,
};
pub use platform::{default_jobs, host_arch, normalize_arch, to_slash_path};

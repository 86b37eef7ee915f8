//! File system utilities for the build directory.
//!
//! The build directory holds the persisted hash cache, the catalogue snapshot and
//! every build output. Writes into it go through [`atomic_write`] so a killed
//! process never leaves a half-written cache file behind.

pub mod atomic;
pub mod dirs;

pub use atomic::{atomic_write, write_if_changed};
pub use dirs::{ensure_dir, ensure_parent_dir, is_excluded_dir, remove_path};

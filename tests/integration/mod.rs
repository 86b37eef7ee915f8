//! Integration test suite for qbuild
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **catalogue**: loading a package tree, inheritance and substitution
//! - **graph**: provider index and dependency graph on real packages
//! - **build**: the build runner against an in-process container tool
//! - **cli**: the `qbuild` binary
//! - **config**: layered configuration from files and the environment

mod build;
mod catalogue;
mod cli;
mod config;
mod graph;

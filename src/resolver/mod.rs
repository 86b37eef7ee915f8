//! Dependency resolution: which path provides what, and in which order paths must
//! be built.

pub mod dependency_graph;
pub mod provides;

pub use dependency_graph::{BuildGraph, GraphNode, build_graph};
pub use provides::{ProvidesIndex, build_provides_index};

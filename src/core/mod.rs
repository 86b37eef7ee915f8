//! Core types shared by every subsystem: the error taxonomy and its user-facing
//! presentation.

pub mod error;

pub use error::{BuildError, ErrorContext, user_friendly_error};

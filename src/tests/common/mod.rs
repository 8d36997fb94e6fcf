//! Common Test Utilities
//!
//! Shared fixtures used across test modules.

pub mod fixtures;

pub use fixtures::*;
pub use logs::*;

//! Shared test utilities for the dataset workspace.
//!
//! - Scratch directories and on-disk layout helpers
//! - Payload generators
//! - Common key and content-type fixtures
//!
//! Add to a crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use paths::*;

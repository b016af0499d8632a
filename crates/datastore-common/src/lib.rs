//! Common types shared across the keyed datastore crates.

pub mod config;
pub mod error;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};

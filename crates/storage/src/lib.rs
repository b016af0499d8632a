//! Storage backends for datasets.
//!
//! Provides [`DatasetContext`](dataset::DatasetContext) implementations for:
//! - A local directory tree
//! - Object storage (MinIO/S3, or in-memory for tests)
//!
//! Both lay files out with [`KeyPath`].

pub mod local;
pub mod object_store;
pub mod paths;

pub use self::object_store::{
    BlockingExecutor, ObjectStorage, ObjectStoreConfig, ObjectStoreContext, ObjectStoreSink,
    ObjectStoreSource,
};
pub use local::LocalDirectoryContext;
pub use paths::{content_type_for, extension_for, KeyPath, ParsedKeyPath};

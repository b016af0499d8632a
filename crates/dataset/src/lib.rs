//! Keyed multi-dimensional dataset store.
//!
//! A [`Dataset`] maps composite [`DataKey`]s to at most one [`DataFile`]
//! and at most one metadata subtree each. Files present their bytes through
//! a [`DataFileSource`] and accept writes through a [`DataFileSink`], so
//! payloads can live in memory, on disk or in a remote store. An optional
//! [`DatasetContext`] loads files lazily on lookup and, in output mode,
//! receives every file added to the dataset.
//!
//! ```
//! use dataset::{DataFile, DataKey, Dataset, Field};
//!
//! let dataset = Dataset::new();
//! let key = DataKey::from_pairs(&[("ZOOM", "1"), ("NAME", "coastline")]).unwrap();
//! dataset
//!     .add_data_file(key.clone(), DataFile::from_bytes("image/png", &b"png"[..]))
//!     .unwrap();
//! dataset.add_metadata(key.clone(), Field::new("EPSG:4326")).unwrap();
//!
//! dataset.generate_keyspaces();
//! assert!(dataset.keyspace().includes_key(&key));
//! ```

pub mod context;
pub mod dataset;
pub mod file;
pub mod json;
pub mod key;
pub mod keyspace;
pub mod metadata;
pub mod primitive;

pub use context::{DatasetContext, MemoryContext};
pub use dataset::{Dataset, MetadataMap};
pub use file::{
    DataFile, DataFileSink, DataFileSource, LocalFileSink, LocalFileSource, LocalRandomAccessFile,
    MemorySink, MemorySource, RandomAccessRead, RandomAccessWrite, SharedSource,
};
pub use json::{from_json_str, to_json_string, JSON_CONTENT_TYPE};
pub use key::{DataKey, DataKeyBuilder, DataKeyDimension, DataKeyElement};
pub use keyspace::{Keyspace, KeyspaceBuilder, KeyspaceDimension};
pub use metadata::{Array, ElementType, Field, List, Map, MetadataElement, MetadataKind};
pub use primitive::{format_significant, Primitive, PrimitiveType};

pub use datastore_common::{StoreError, StoreResult};

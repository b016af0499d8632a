//! The collaborator a [`Dataset`](crate::Dataset) uses for lazy input
//! loading and output write-through.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use datastore_common::{StoreError, StoreResult};

use crate::file::{DataFile, MemorySink, MemorySource, RandomAccessRead, RandomAccessWrite};
use crate::key::DataKey;

/// Supplies files a dataset does not hold yet and receives files added to
/// an output dataset.
///
/// Every method has a default matching a dataset with no context at all:
/// nothing is found, the dataset is neither output nor query-only and
/// writes are rejected.
pub trait DatasetContext: Send + Sync {
    /// Look up a file that is not materialized in the dataset.
    fn find_data_file(&self, _key: &DataKey) -> StoreResult<Option<DataFile>> {
        Ok(None)
    }

    /// Files added to the dataset are handed to [`add_data_file`](Self::add_data_file).
    fn is_output(&self) -> bool {
        false
    }

    /// Reads skip keyspace validation.
    fn is_query_only(&self) -> bool {
        false
    }

    /// Accept a newly added file, typically by assigning it a sink.
    fn add_data_file(&self, key: &DataKey, _file: &DataFile) -> StoreResult<()> {
        Err(StoreError::unsupported(format!(
            "context does not accept data files (key {})",
            key
        )))
    }

    fn data_file_name(&self, _key: &DataKey) -> Option<String> {
        None
    }

    fn random_access_writer(
        &self,
        key: &DataKey,
        _file: &DataFile,
    ) -> StoreResult<Box<dyn RandomAccessWrite>> {
        Err(StoreError::unsupported(format!(
            "context does not provide random access writes (key {})",
            key
        )))
    }

    fn random_access_reader(&self, key: &DataKey) -> StoreResult<Box<dyn RandomAccessRead>> {
        Err(StoreError::unsupported(format!(
            "context does not provide random access reads (key {})",
            key
        )))
    }
}

struct StoredInput {
    content_type: String,
    data: Bytes,
}

/// An in-process context: inputs come from a preloaded map, outputs are
/// captured in memory sinks.
#[derive(Default)]
pub struct MemoryContext {
    inputs: Mutex<BTreeMap<DataKey, StoredInput>>,
    outputs: Mutex<BTreeMap<DataKey, Arc<MemorySink>>>,
    output: bool,
    query_only: bool,
}

impl MemoryContext {
    /// A context serving inputs only.
    pub fn input() -> Self {
        Self::default()
    }

    /// A context capturing everything added to the dataset.
    pub fn output() -> Self {
        Self {
            output: true,
            ..Self::default()
        }
    }

    pub fn with_query_only(mut self, query_only: bool) -> Self {
        self.query_only = query_only;
        self
    }

    /// Make `data` discoverable under `key`.
    pub fn insert_input(&self, key: DataKey, content_type: impl Into<String>, data: impl Into<Bytes>) {
        self.inputs.lock().insert(
            key,
            StoredInput {
                content_type: content_type.into(),
                data: data.into(),
            },
        );
    }

    /// Bytes written so far for an output key.
    pub fn output_contents(&self, key: &DataKey) -> Option<Bytes> {
        self.outputs.lock().get(key).map(|sink| sink.contents())
    }

    pub fn output_keys(&self) -> Vec<DataKey> {
        self.outputs.lock().keys().cloned().collect()
    }
}

impl DatasetContext for MemoryContext {
    fn find_data_file(&self, key: &DataKey) -> StoreResult<Option<DataFile>> {
        let inputs = self.inputs.lock();
        Ok(inputs.get(key).map(|input| {
            debug!(key = %key, size = input.data.len(), "Serving in-memory input");
            DataFile::with_source(input.content_type.clone(), MemorySource::new(input.data.clone()))
        }))
    }

    fn is_output(&self) -> bool {
        self.output
    }

    fn is_query_only(&self) -> bool {
        self.query_only
    }

    fn add_data_file(&self, key: &DataKey, file: &DataFile) -> StoreResult<()> {
        if !self.output {
            return Err(StoreError::unsupported(format!(
                "input context does not accept data files (key {})",
                key
            )));
        }
        let sink = Arc::new(MemorySink::new());
        file.set_sink(sink.clone())?;
        self.outputs.lock().insert(key.clone(), sink);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoContext;
    impl DatasetContext for NoContext {}

    #[test]
    fn test_defaults() {
        let key = DataKey::from_pairs(&[("NAME", "a")]).unwrap();
        let ctx = NoContext;
        assert!(ctx.find_data_file(&key).unwrap().is_none());
        assert!(!ctx.is_output());
        assert!(!ctx.is_query_only());
        assert!(ctx.data_file_name(&key).is_none());
        assert!(ctx
            .add_data_file(&key, &DataFile::new("text/plain"))
            .unwrap_err()
            .is_unsupported());
        assert!(ctx.random_access_reader(&key).is_err());
    }

    #[test]
    fn test_memory_context_serves_inputs() {
        let key = DataKey::from_pairs(&[("NAME", "a")]).unwrap();
        let ctx = MemoryContext::input();
        ctx.insert_input(key.clone(), "text/plain", &b"input"[..]);

        let file = ctx.find_data_file(&key).unwrap().unwrap();
        assert_eq!(file.content_type(), "text/plain");
        assert_eq!(&file.bytes().unwrap()[..], b"input");
        assert!(ctx
            .add_data_file(&key, &DataFile::new("text/plain"))
            .is_err());
    }

    #[test]
    fn test_memory_context_captures_outputs() {
        let key = DataKey::from_pairs(&[("NAME", "out")]).unwrap();
        let ctx = MemoryContext::output();
        let file = DataFile::new("text/plain");
        ctx.add_data_file(&key, &file).unwrap();
        file.write(b"written").unwrap();

        assert_eq!(ctx.output_keys(), vec![key.clone()]);
        assert_eq!(&ctx.output_contents(&key).unwrap()[..], b"written");
    }
}

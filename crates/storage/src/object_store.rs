//! Object storage backend (MinIO/S3 compatible, or in-memory).
//!
//! The `object_store` client is async; the dataset traits are synchronous.
//! [`BlockingExecutor`] bridges the two: inside a multi-threaded tokio
//! runtime it blocks in place on the ambient runtime, elsewhere it drives
//! futures on a small private runtime.

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{aws::AmazonS3Builder, memory::InMemory, path::Path, ObjectStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, instrument};

use dataset::{
    DataFile, DataFileSink, DataFileSource, DataKey, DatasetContext, RandomAccessRead, SharedSource,
};
use datastore_common::{StoreConfig, StoreError, StoreResult};

use crate::paths::{content_type_for, KeyPath};

/// Configuration for object storage connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "datasets".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
        }
    }
}

impl ObjectStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: std::env::var("S3_ENDPOINT").unwrap_or(defaults.endpoint),
            bucket: std::env::var("S3_BUCKET").unwrap_or(defaults.bucket),
            access_key_id: std::env::var("S3_ACCESS_KEY").unwrap_or(defaults.access_key_id),
            secret_access_key: std::env::var("S3_SECRET_KEY").unwrap_or(defaults.secret_access_key),
            region: std::env::var("S3_REGION").unwrap_or(defaults.region),
            allow_http: std::env::var("S3_ALLOW_HTTP")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.allow_http),
        }
    }
}

// ============================================================================
// Blocking bridge
// ============================================================================

struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        // A plain drop panics when the last handle goes away inside async code.
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Runs object store futures to completion from synchronous code.
///
/// Calling from a current-thread tokio runtime is not supported, since
/// blocking in place requires a multi-threaded one.
#[derive(Clone)]
pub struct BlockingExecutor {
    runtime: Arc<OwnedRuntime>,
}

impl BlockingExecutor {
    pub fn new() -> StoreResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("datastore-io")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Arc::new(OwnedRuntime(Some(runtime))),
        })
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        match Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(|| handle.block_on(future)),
            Err(_) => match &self.runtime.0 {
                Some(runtime) => runtime.block_on(future),
                None => futures::executor::block_on(future),
            },
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Thin async client over an [`ObjectStore`] with errors mapped to
/// [`StoreError::Storage`].
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create an S3/MinIO client from config.
    pub fn new(config: &ObjectStoreConfig) -> StoreResult<Self> {
        let store = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region)
            .with_allow_http(config.allow_http)
            .build()
            .map_err(|e| StoreError::storage(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Wrap an existing store; `bucket` is only used in logs.
    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemory::new()), "memory")
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> StoreResult<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| StoreError::storage(format!("Failed to write {}: {}", path, e)))?;

        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> StoreResult<Bytes> {
        let location = Path::from(path);

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| StoreError::storage(format!("Failed to read {}: {}", path, e)))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StoreError::storage(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get_range(&self, path: &str, start: usize, end: usize) -> StoreResult<Bytes> {
        let location = Path::from(path);

        self.store
            .get_range(&location, start..end)
            .await
            .map_err(|e| StoreError::storage(format!("Failed to read range {}: {}", path, e)))
    }

    /// Object size in bytes.
    pub async fn size(&self, path: &str) -> StoreResult<u64> {
        let location = Path::from(path);

        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| StoreError::storage(format!("Failed to stat {}: {}", path, e)))?;

        Ok(meta.size as u64)
    }

    pub async fn exists(&self, path: &str) -> StoreResult<bool> {
        let location = Path::from(path);

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StoreError::storage(format!(
                "Failed to check {}: {}",
                path, e
            ))),
        }
    }

    /// All object paths under a prefix, recursively.
    pub async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix_path = Path::from(prefix);
        let prefix = if prefix.is_empty() { None } else { Some(&prefix_path) };
        let mut paths = Vec::new();

        let mut stream = self.store.list(prefix);
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| StoreError::storage(format!("List failed: {}", e)))?
        {
            paths.push(meta.location.to_string());
        }

        Ok(paths)
    }

    /// Object names directly under a directory prefix.
    pub async fn list_directory(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix_path = Path::from(prefix);
        let prefix = if prefix.is_empty() { None } else { Some(&prefix_path) };

        let listing = self
            .store
            .list_with_delimiter(prefix)
            .await
            .map_err(|e| StoreError::storage(format!("List failed: {}", e)))?;

        Ok(listing
            .objects
            .into_iter()
            .filter_map(|meta| meta.location.filename().map(str::to_string))
            .collect())
    }
}

// ============================================================================
// Source and sink
// ============================================================================

#[derive(Default)]
struct RemoteState {
    cached: Option<Bytes>,
    size: Option<u64>,
    position: u64,
    released: bool,
}

/// A remote object read lazily. `bytes()` fetches and caches the whole
/// object; `read` issues range requests and does not populate the cache.
pub struct ObjectStoreSource {
    storage: Arc<ObjectStorage>,
    executor: BlockingExecutor,
    path: String,
    state: Mutex<RemoteState>,
}

impl ObjectStoreSource {
    pub fn new(storage: Arc<ObjectStorage>, executor: BlockingExecutor, path: impl Into<String>) -> Self {
        Self {
            storage,
            executor,
            path: path.into(),
            state: Mutex::new(RemoteState::default()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn size_locked(&self, state: &mut RemoteState) -> StoreResult<u64> {
        if state.released {
            return Err(StoreError::logic("source has been released"));
        }
        if let Some(size) = state.size {
            return Ok(size);
        }
        let size = self.executor.block_on(self.storage.size(&self.path))?;
        state.size = Some(size);
        Ok(size)
    }
}

impl DataFileSource for ObjectStoreSource {
    fn bytes(&self) -> StoreResult<Bytes> {
        let mut state = self.state.lock();
        if state.released {
            return Err(StoreError::logic("source has been released"));
        }
        if let Some(bytes) = &state.cached {
            return Ok(bytes.clone());
        }
        let bytes = self.executor.block_on(self.storage.get(&self.path))?;
        state.size = Some(bytes.len() as u64);
        state.cached = Some(bytes.clone());
        Ok(bytes)
    }

    fn size(&self) -> StoreResult<u64> {
        let mut state = self.state.lock();
        self.size_locked(&mut state)
    }

    fn read(&self, buf: &mut [u8]) -> StoreResult<usize> {
        let mut state = self.state.lock();
        let size = self.size_locked(&mut state)?;
        if state.position >= size || buf.is_empty() {
            return Ok(0);
        }
        let start = state.position as usize;
        let end = (state.position + buf.len() as u64).min(size) as usize;

        let chunk = match &state.cached {
            Some(bytes) => bytes.slice(start..end),
            None => self
                .executor
                .block_on(self.storage.get_range(&self.path, start, end))?,
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        state.position += n as u64;
        Ok(n)
    }

    fn skip(&self, n: u64) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let size = self.size_locked(&mut state)?;
        let skipped = n.min(size.saturating_sub(state.position));
        state.position += skipped;
        Ok(skipped)
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.cached = None;
        state.released = true;
    }

    fn is_released(&self) -> bool {
        self.state.lock().released
    }
}

/// Buffers written bytes and uploads them as one object on `close`.
pub struct ObjectStoreSink {
    storage: Arc<ObjectStorage>,
    executor: BlockingExecutor,
    path: String,
    buffer: Mutex<Option<Vec<u8>>>,
}

impl ObjectStoreSink {
    pub fn new(storage: Arc<ObjectStorage>, executor: BlockingExecutor, path: impl Into<String>) -> Self {
        Self {
            storage,
            executor,
            path: path.into(),
            buffer: Mutex::new(Some(Vec::new())),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl DataFileSink for ObjectStoreSink {
    fn write(&self, buf: &[u8]) -> StoreResult<usize> {
        let mut buffer = self.buffer.lock();
        let buffer = buffer
            .as_mut()
            .ok_or_else(|| StoreError::logic("sink has been closed"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&self) -> StoreResult<()> {
        let Some(data) = self.buffer.lock().take() else {
            return Ok(());
        };
        self.executor
            .block_on(self.storage.put(&self.path, Bytes::from(data)))
    }

    fn is_closed(&self) -> bool {
        self.buffer.lock().is_none()
    }
}

/// Positioned reads over a remote object via range requests.
struct ObjectStoreRangeReader {
    storage: Arc<ObjectStorage>,
    executor: BlockingExecutor,
    path: String,
    size: u64,
}

impl RandomAccessRead for ObjectStoreRangeReader {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> StoreResult<usize> {
        if offset >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let end = (offset + buf.len() as u64).min(self.size);
        let chunk = self.executor.block_on(self.storage.get_range(
            &self.path,
            offset as usize,
            end as usize,
        ))?;
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.size)
    }
}

// ============================================================================
// Context
// ============================================================================

/// Dataset context over an object store, using the [`KeyPath`] layout
/// below a key prefix.
///
/// Output files are uploaded when their sink closes, i.e. when the file or
/// its dataset is released or dropped. Positioned writes are not supported.
pub struct ObjectStoreContext {
    storage: Arc<ObjectStorage>,
    executor: BlockingExecutor,
    prefix: String,
    output: bool,
    query_only: bool,
    default_content_type: String,
}

impl ObjectStoreContext {
    pub fn new(storage: Arc<ObjectStorage>, prefix: impl Into<String>) -> StoreResult<Self> {
        Ok(Self {
            storage,
            executor: BlockingExecutor::new()?,
            prefix: prefix.into().trim_matches('/').to_string(),
            output: false,
            query_only: false,
            default_content_type: StoreConfig::default().default_content_type,
        })
    }

    /// Connect to S3/MinIO with the store settings of `config`.
    pub fn from_config(store: &ObjectStoreConfig, config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let mut context = Self::new(Arc::new(ObjectStorage::new(store)?), config.object_prefix.clone())?;
        context.query_only = config.query_only;
        context.default_content_type = config.default_content_type.clone();
        Ok(context)
    }

    pub fn in_memory(prefix: impl Into<String>) -> StoreResult<Self> {
        Self::new(Arc::new(ObjectStorage::in_memory()), prefix)
    }

    pub fn into_output(mut self) -> Self {
        self.output = true;
        self
    }

    pub fn with_query_only(mut self, query_only: bool) -> Self {
        self.query_only = query_only;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn default_content_type(&self) -> &str {
        &self.default_content_type
    }

    pub fn storage(&self) -> &Arc<ObjectStorage> {
        &self.storage
    }

    pub fn executor(&self) -> &BlockingExecutor {
        &self.executor
    }

    fn object_path(&self, relative: &str) -> String {
        KeyPath::join(&self.prefix, relative)
    }

    /// Relative path of the stored object for `key`, if one exists.
    pub fn locate(&self, key: &DataKey) -> StoreResult<Option<String>> {
        let directory = KeyPath::directory(key);
        let mut names = self
            .executor
            .block_on(self.storage.list_directory(&self.object_path(&directory)))?;
        names.retain(|name| KeyPath::is_data_file_name(name));
        names.sort();
        Ok(names.into_iter().next().map(|name| KeyPath::join(&directory, &name)))
    }

    /// Every key with a stored object, in key order.
    pub fn keys(&self) -> StoreResult<Vec<DataKey>> {
        let paths = self.executor.block_on(self.storage.list(&self.prefix))?;
        let mut keys = Vec::new();
        for path in paths {
            let relative = match path.strip_prefix(&self.prefix) {
                Some(rest) if !self.prefix.is_empty() => rest.trim_start_matches('/'),
                _ => path.as_str(),
            };
            if let Some(parsed) = KeyPath::parse(relative)? {
                keys.push(parsed.key);
            }
        }
        keys.sort();
        keys.dedup();
        debug!(prefix = %self.prefix, count = keys.len(), "Scanned object store keys");
        Ok(keys)
    }

    /// A lazily fetching source for the stored object of `key`, if any.
    pub fn source_for(&self, key: &DataKey) -> StoreResult<Option<SharedSource>> {
        Ok(self.locate(key)?.map(|relative| {
            SharedSource::new(ObjectStoreSource::new(
                Arc::clone(&self.storage),
                self.executor.clone(),
                self.object_path(&relative),
            ))
        }))
    }

    /// Upload `data` as the object for `key`.
    pub fn put(&self, key: &DataKey, content_type: &str, data: Bytes) -> StoreResult<String> {
        let path = self.object_path(&KeyPath::file(key, content_type));
        self.executor.block_on(self.storage.put(&path, data))?;
        Ok(path)
    }
}

impl DatasetContext for ObjectStoreContext {
    #[instrument(skip(self), fields(bucket = %self.storage.bucket(), prefix = %self.prefix))]
    fn find_data_file(&self, key: &DataKey) -> StoreResult<Option<DataFile>> {
        let Some(relative) = self.locate(key)? else {
            return Ok(None);
        };
        let content_type = relative
            .rsplit_once('.')
            .and_then(|(_, ext)| content_type_for(ext))
            .map(str::to_string)
            .unwrap_or_else(|| self.default_content_type.clone());

        let source = ObjectStoreSource::new(
            Arc::clone(&self.storage),
            self.executor.clone(),
            self.object_path(&relative),
        );
        let file = DataFile::with_source(content_type, source);
        file.set_file_name(relative.clone())?;
        debug!(path = %relative, "Found remote data file");
        Ok(Some(file))
    }

    fn is_output(&self) -> bool {
        self.output
    }

    fn is_query_only(&self) -> bool {
        self.query_only
    }

    #[instrument(skip(self, file), fields(bucket = %self.storage.bucket(), prefix = %self.prefix))]
    fn add_data_file(&self, key: &DataKey, file: &DataFile) -> StoreResult<()> {
        if !self.output {
            return Err(StoreError::unsupported(format!(
                "object store prefix '{}' is read-only (key {})",
                self.prefix, key
            )));
        }
        let relative = KeyPath::file(key, file.content_type());
        let sink = ObjectStoreSink::new(
            Arc::clone(&self.storage),
            self.executor.clone(),
            self.object_path(&relative),
        );
        file.set_sink(Arc::new(sink))?;
        if file.file_name().is_none() {
            file.set_file_name(relative.clone())?;
        }
        debug!(path = %relative, "Assigned object store sink");
        Ok(())
    }

    fn data_file_name(&self, key: &DataKey) -> Option<String> {
        self.locate(key).ok().flatten()
    }

    fn random_access_reader(&self, key: &DataKey) -> StoreResult<Box<dyn RandomAccessRead>> {
        let relative = self.locate(key)?.ok_or_else(|| {
            StoreError::invalid_argument(format!("no stored object for key {}", key))
        })?;
        let path = self.object_path(&relative);
        let size = self.executor.block_on(self.storage.size(&path))?;
        Ok(Box::new(ObjectStoreRangeReader {
            storage: Arc::clone(&self.storage),
            executor: self.executor.clone(),
            path,
            size,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pairs: &[(&str, &str)]) -> DataKey {
        DataKey::from_pairs(pairs).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ObjectStoreConfig::default();
        assert_eq!(config.region, "us-east-1");
        assert!(config.allow_http);
    }

    #[test]
    fn test_source_reads_lazily() {
        let context = ObjectStoreContext::in_memory("datasets").unwrap();
        let k = key(&[("NAME", "a")]);
        let path = context
            .put(&k, "text/plain", Bytes::from_static(b"hello object store"))
            .unwrap();
        assert_eq!(path, "datasets/NAME=a/data.txt");

        let source = context.source_for(&k).unwrap().unwrap();
        assert_eq!(source.size().unwrap(), 18);

        let mut buf = [0u8; 5];
        assert_eq!(source.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(source.skip(8).unwrap(), 8);
        assert_eq!(source.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"store");
        assert_eq!(source.read(&mut buf).unwrap(), 0);

        assert_eq!(&source.bytes().unwrap()[..], b"hello object store");
        source.release();
        assert!(source.bytes().unwrap_err().is_logic());
    }

    #[test]
    fn test_sink_uploads_on_close() {
        let storage = Arc::new(ObjectStorage::in_memory());
        let executor = BlockingExecutor::new().unwrap();
        let sink = ObjectStoreSink::new(Arc::clone(&storage), executor.clone(), "out/data.bin");
        sink.write(b"abc").unwrap();
        sink.write(b"def").unwrap();
        assert!(!executor.block_on(storage.exists("out/data.bin")).unwrap());

        sink.close().unwrap();
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert_eq!(&executor.block_on(storage.get("out/data.bin")).unwrap()[..], b"abcdef");
        assert!(sink.write(b"x").unwrap_err().is_logic());
    }

    #[test]
    fn test_context_round_trip() {
        let output = ObjectStoreContext::in_memory("tiles").unwrap().into_output();
        let storage = Arc::clone(output.storage());
        let k = key(&[("ZOOM", "2"), ("NAME", "sst")]);

        let file = DataFile::from_bytes("image/png", &b"png-bytes"[..]);
        output.add_data_file(&k, &file).unwrap();
        file.copy_to_sink().unwrap();
        file.release().unwrap();

        let input = ObjectStoreContext::new(storage, "tiles").unwrap();
        assert_eq!(input.keys().unwrap(), vec![k.clone()]);
        let found = input.find_data_file(&k).unwrap().unwrap();
        assert_eq!(found.content_type(), "image/png");
        assert_eq!(found.file_name().as_deref(), Some("NAME=sst/ZOOM=2/data.png"));
        assert_eq!(&found.bytes().unwrap()[..], b"png-bytes");

        let mut reader = input.random_access_reader(&k).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(reader.read_at(4, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"bytes");

        assert!(input.find_data_file(&key(&[("NAME", "sst")])).unwrap().is_none());
        assert!(input
            .add_data_file(&key(&[("NAME", "x")]), &DataFile::new("image/png"))
            .unwrap_err()
            .is_unsupported());
    }
}

//! The keyed container mapping keys to data files and metadata subtrees.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use datastore_common::{StoreError, StoreResult};

use crate::context::DatasetContext;
use crate::file::{DataFile, RandomAccessRead, RandomAccessWrite, SharedSource};
use crate::json::{self, JSON_CONTENT_TYPE};
use crate::key::DataKey;
use crate::keyspace::{Keyspace, KeyspaceBuilder};
use crate::metadata::MetadataElement;

static NEXT_DATASET_ID: AtomicU64 = AtomicU64::new(1);

/// Auxiliary key to metadata mapping stored inside a single data file.
pub type MetadataMap = BTreeMap<DataKey, MetadataElement>;

#[derive(Debug, Default, Clone)]
struct DerivedKeyspaces {
    all: Arc<Keyspace>,
    files: Arc<Keyspace>,
    metadata: Arc<Keyspace>,
}

/// Files and metadata addressed by [`DataKey`].
///
/// Each key holds at most one file and at most one metadata subtree. The
/// file map and the metadata map have separate locks; when both are needed
/// the file map is always locked first. Context callbacks never run while a
/// map lock is held.
pub struct Dataset {
    id: u64,
    files: RwLock<BTreeMap<DataKey, Arc<DataFile>>>,
    metadata: RwLock<BTreeMap<DataKey, Arc<MetadataElement>>>,
    keyspaces: RwLock<DerivedKeyspaces>,
    global_keyspace: RwLock<Option<Arc<Keyspace>>>,
    context: Option<Arc<dyn DatasetContext>>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataset {
    /// A dataset with no context.
    pub fn new() -> Self {
        Self {
            id: NEXT_DATASET_ID.fetch_add(1, Ordering::Relaxed),
            files: RwLock::new(BTreeMap::new()),
            metadata: RwLock::new(BTreeMap::new()),
            keyspaces: RwLock::new(DerivedKeyspaces::default()),
            global_keyspace: RwLock::new(None),
            context: None,
        }
    }

    pub fn with_context(context: Arc<dyn DatasetContext>) -> Self {
        Self {
            context: Some(context),
            ..Self::new()
        }
    }

    pub fn context(&self) -> Option<&Arc<dyn DatasetContext>> {
        self.context.as_ref()
    }

    pub fn is_output(&self) -> bool {
        self.context.as_ref().map_or(false, |c| c.is_output())
    }

    pub fn is_query_only(&self) -> bool {
        self.context.as_ref().map_or(false, |c| c.is_query_only())
    }

    // ========================================================================
    // Keyspaces
    // ========================================================================

    /// Assign the keyspace that keys passed to getters are validated against.
    pub fn set_keyspace(&self, keyspace: Keyspace) {
        *self.global_keyspace.write() = Some(Arc::new(keyspace));
    }

    pub fn global_keyspace(&self) -> Option<Arc<Keyspace>> {
        self.global_keyspace.read().clone()
    }

    fn validate_key(&self, key: &DataKey) -> StoreResult<()> {
        match self.global_keyspace.read().as_ref() {
            Some(keyspace) => keyspace.validate_key(key),
            None => Ok(()),
        }
    }

    /// Recompute the keyspaces over all keys, file keys and metadata keys.
    ///
    /// Not automatic: call again after adding keys.
    pub fn generate_keyspaces(&self) {
        let files = self.files.read();
        let metadata = self.metadata.read();

        let file_keyspace = KeyspaceBuilder::new().add_keys(files.keys()).to_keyspace();
        let metadata_keyspace = KeyspaceBuilder::new().add_keys(metadata.keys()).to_keyspace();
        let all_keyspace = KeyspaceBuilder::new()
            .add_keys(files.keys())
            .add_keys(metadata.keys())
            .to_keyspace();

        info!(
            files = files.len(),
            metadata = metadata.len(),
            dimensions = all_keyspace.len(),
            "Generated dataset keyspaces"
        );

        *self.keyspaces.write() = DerivedKeyspaces {
            all: Arc::new(all_keyspace),
            files: Arc::new(file_keyspace),
            metadata: Arc::new(metadata_keyspace),
        };
    }

    /// Keyspace over every key, as of the last `generate_keyspaces`.
    pub fn keyspace(&self) -> Arc<Keyspace> {
        Arc::clone(&self.keyspaces.read().all)
    }

    pub fn file_keyspace(&self) -> Arc<Keyspace> {
        Arc::clone(&self.keyspaces.read().files)
    }

    pub fn metadata_keyspace(&self) -> Arc<Keyspace> {
        Arc::clone(&self.keyspaces.read().metadata)
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Local file, or one found through the context and cached here.
    fn lookup_file(&self, key: &DataKey) -> StoreResult<Option<Arc<DataFile>>> {
        if let Some(file) = self.files.read().get(key) {
            return Ok(Some(Arc::clone(file)));
        }

        let Some(context) = &self.context else {
            return Ok(None);
        };
        let Some(found) = context.find_data_file(key)? else {
            return Ok(None);
        };

        let mut files = self.files.write();
        let file = match files.get(key) {
            Some(existing) => {
                warn!(key = %key, "Discarding lazily loaded file, another thread loaded it first");
                Arc::clone(existing)
            }
            None => {
                debug!(key = %key, content_type = found.content_type(), "Lazily loaded data file");
                let file = Arc::new(found);
                files.insert(key.clone(), Arc::clone(&file));
                file
            }
        };
        Ok(Some(file))
    }

    /// Whether a file exists for `key`, loading it through the context if
    /// it is not held yet. A successful lookup caches the file.
    pub fn has_data_file(&self, key: &DataKey) -> StoreResult<bool> {
        Ok(self.lookup_file(key)?.is_some())
    }

    /// The file for `key`.
    ///
    /// Unless the dataset is query-only the key is first validated against
    /// the assigned keyspace.
    pub fn get_data_file(&self, key: &DataKey) -> StoreResult<Arc<DataFile>> {
        if !self.is_query_only() {
            self.validate_key(key)?;
        }
        self.lookup_file(key)?.ok_or_else(|| {
            StoreError::invalid_argument(format!("dataset has no data file for key {}", key))
        })
    }

    /// Add a file under a key that has none.
    ///
    /// In output mode the file is handed to the context right away. If it
    /// carries content, that content is copied to the sink the context
    /// assigned and the file's source is released.
    pub fn add_data_file(&self, key: DataKey, file: DataFile) -> StoreResult<Arc<DataFile>> {
        let file = Arc::new(file);
        {
            let mut files = self.files.write();
            if files.contains_key(&key) {
                return Err(StoreError::invalid_argument(format!(
                    "dataset already has a data file for key {}",
                    key
                )));
            }
            files.insert(key.clone(), Arc::clone(&file));
        }
        debug!(key = %key, content_type = file.content_type(), "Added data file");

        if let Some(context) = self.context.as_ref().filter(|c| c.is_output()) {
            context.add_data_file(&key, &file)?;
            if file.has_content() {
                if !file.is_written() && file.has_sink() {
                    file.copy_to_sink()?;
                }
                file.release_source();
            }
            debug!(key = %key, "Wrote data file through to context");
        }

        Ok(file)
    }

    /// Add a content-less file and obtain a positioned writer for it.
    pub fn add_data_file_for_random_access(
        &self,
        key: DataKey,
        file: DataFile,
    ) -> StoreResult<Box<dyn RandomAccessWrite>> {
        if file.has_content() {
            return Err(StoreError::logic(format!(
                "data file for random access on key {} already has content",
                key
            )));
        }
        let file = self.add_data_file(key.clone(), file)?;
        match &self.context {
            Some(context) => context.random_access_writer(&key, &file),
            None => Err(StoreError::unsupported(
                "random access requires a dataset context",
            )),
        }
    }

    /// A positioned reader for the file under `key`, from the context.
    pub fn get_data_file_for_random_access(&self, key: &DataKey) -> StoreResult<Box<dyn RandomAccessRead>> {
        if !self.is_query_only() {
            self.validate_key(key)?;
        }
        match &self.context {
            Some(context) => context.random_access_reader(key),
            None => Err(StoreError::unsupported(
                "random access requires a dataset context",
            )),
        }
    }

    /// Name the context uses for the file under `key`, if any.
    pub fn data_file_name(&self, key: &DataKey) -> Option<String> {
        self.context.as_ref().and_then(|c| c.data_file_name(key))
    }

    /// Keys of locally held files, in key order.
    pub fn file_keys(&self) -> Vec<DataKey> {
        self.files.read().keys().cloned().collect()
    }

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Snapshot of locally held files.
    pub fn files(&self) -> Vec<(DataKey, Arc<DataFile>)> {
        self.files
            .read()
            .iter()
            .map(|(k, f)| (k.clone(), Arc::clone(f)))
            .collect()
    }

    /// Bind sources to held files that have none, e.g. after loading a
    /// dataset from JSON. `provider` is called without any dataset lock held.
    /// Returns the number of files that received a source.
    pub fn attach_sources<F>(&self, mut provider: F) -> StoreResult<usize>
    where
        F: FnMut(&DataKey, &DataFile) -> StoreResult<Option<SharedSource>>,
    {
        let mut attached = 0;
        for (key, file) in self.files() {
            if file.has_source() || file.is_released() {
                continue;
            }
            if let Some(source) = provider(&key, &file)? {
                file.set_source(source)?;
                attached += 1;
            }
        }
        debug!(attached, "Attached data file sources");
        Ok(attached)
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Add a metadata subtree under a key that has none.
    pub fn add_metadata(&self, key: DataKey, subtree: impl Into<MetadataElement>) -> StoreResult<()> {
        let mut metadata = self.metadata.write();
        if metadata.contains_key(&key) {
            return Err(StoreError::invalid_argument(format!(
                "dataset already has metadata for key {}",
                key
            )));
        }
        debug!(key = %key, "Added metadata");
        metadata.insert(key, Arc::new(subtree.into()));
        Ok(())
    }

    /// The metadata subtree for `key`, validated against the assigned keyspace.
    pub fn get_metadata(&self, key: &DataKey) -> StoreResult<Arc<MetadataElement>> {
        self.validate_key(key)?;
        self.metadata.read().get(key).cloned().ok_or_else(|| {
            StoreError::invalid_argument(format!("dataset has no metadata for key {}", key))
        })
    }

    pub fn has_metadata(&self, key: &DataKey) -> bool {
        self.metadata.read().contains_key(key)
    }

    pub fn metadata_keys(&self) -> Vec<DataKey> {
        self.metadata.read().keys().cloned().collect()
    }

    pub fn metadata_count(&self) -> usize {
        self.metadata.read().len()
    }

    /// Snapshot of held metadata subtrees.
    pub fn metadata_entries(&self) -> Vec<(DataKey, Arc<MetadataElement>)> {
        self.metadata
            .read()
            .iter()
            .map(|(k, m)| (k.clone(), Arc::clone(m)))
            .collect()
    }

    /// Store a whole key to metadata mapping as one JSON data file.
    ///
    /// The map is consumed: its subtrees end up serialized inside the file
    /// and are not available to the caller afterwards.
    pub fn add_data_file_as_metadata(&self, key: DataKey, map: MetadataMap) -> StoreResult<Arc<DataFile>> {
        let encoded = json::metadata_map_to_json(&map)?;
        drop(map);
        let file = DataFile::from_bytes(JSON_CONTENT_TYPE, encoded.into_bytes());
        self.add_data_file(key, file)
    }

    /// Decode a mapping stored by [`add_data_file_as_metadata`](Self::add_data_file_as_metadata).
    pub fn get_data_file_as_metadata(&self, key: &DataKey) -> StoreResult<MetadataMap> {
        let file = self.get_data_file(key)?;
        let bytes = file.bytes()?;
        json::metadata_map_from_slice(&bytes)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty() && self.metadata.read().is_empty()
    }

    /// Release the content of every held file. Metadata is untouched.
    ///
    /// Every file is released even if some fail; the first failure is
    /// returned.
    pub fn release(&self) -> StoreResult<()> {
        let files = self.files.read();
        let mut first_error = None;
        for (key, file) in files.iter() {
            if let Err(e) = file.release() {
                warn!(key = %key, error = %e, "Failed to release data file");
                first_error.get_or_insert(e);
            }
        }
        info!(files = files.len(), "Released dataset content");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deep comparison of files and metadata, ignoring the context.
    pub fn try_eq(&self, other: &Dataset) -> StoreResult<bool> {
        if std::ptr::eq(self, other) {
            return Ok(true);
        }

        // Lock in id order, files before metadata within each dataset.
        let (first, second) = if self.id < other.id {
            (self, other)
        } else {
            (other, self)
        };
        let first_files = first.files.read();
        let first_metadata = first.metadata.read();
        let second_files = second.files.read();
        let second_metadata = second.metadata.read();

        if first_files.len() != second_files.len() || first_metadata.len() != second_metadata.len() {
            return Ok(false);
        }
        if first_metadata
            .iter()
            .zip(second_metadata.iter())
            .any(|((ka, ma), (kb, mb))| ka != kb || ma != mb)
        {
            return Ok(false);
        }
        for ((ka, fa), (kb, fb)) in first_files.iter().zip(second_files.iter()) {
            if ka != kb || !fa.try_eq(fb)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn with_locked_maps<R>(
        &self,
        f: impl FnOnce(&BTreeMap<DataKey, Arc<DataFile>>, &BTreeMap<DataKey, Arc<MetadataElement>>) -> R,
    ) -> R {
        let files = self.files.read();
        let metadata = self.metadata.read();
        f(&files, &metadata)
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.try_eq(other).unwrap_or(false)
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("files", &self.file_count())
            .field("metadata", &self.metadata_count())
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Field, Map};

    fn key(pairs: &[(&str, &str)]) -> DataKey {
        DataKey::from_pairs(pairs).unwrap()
    }

    #[test]
    fn test_duplicate_file_rejected() {
        let dataset = Dataset::new();
        let k = key(&[("NAME", "a")]);
        dataset
            .add_data_file(k.clone(), DataFile::from_bytes("text/plain", &b"1"[..]))
            .unwrap();
        let err = dataset
            .add_data_file(k.clone(), DataFile::from_bytes("text/plain", &b"2"[..]))
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(&dataset.get_data_file(&k).unwrap().bytes().unwrap()[..], b"1");
    }

    #[test]
    fn test_duplicate_metadata_rejected() {
        let dataset = Dataset::new();
        let k = key(&[("NAME", "a")]);
        dataset.add_metadata(k.clone(), Field::new(1i32)).unwrap();
        assert!(dataset
            .add_metadata(k.clone(), Field::new(2i32))
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_missing_key_is_invalid_argument() {
        let dataset = Dataset::new();
        let k = key(&[("NAME", "missing")]);
        assert!(!dataset.has_data_file(&k).unwrap());
        assert!(dataset.get_data_file(&k).unwrap_err().is_invalid_argument());
        assert!(dataset.get_metadata(&k).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_global_keyspace_validation() {
        let dataset = Dataset::new();
        let inside = key(&[("ZOOM", "1")]);
        let outside = key(&[("BAND", "red")]);
        dataset
            .add_data_file(outside.clone(), DataFile::new("image/png"))
            .unwrap();
        dataset.add_metadata(outside.clone(), Map::new()).unwrap();

        dataset.set_keyspace(KeyspaceBuilder::new().add_key(&inside).to_keyspace());

        assert!(dataset.get_data_file(&outside).unwrap_err().is_invalid_argument());
        assert!(dataset.get_metadata(&outside).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_generate_keyspaces() {
        let dataset = Dataset::new();
        dataset
            .add_data_file(key(&[("ZOOM", "1"), ("NAME", "a")]), DataFile::new("image/png"))
            .unwrap();
        dataset.add_metadata(key(&[("BAND", "red")]), Map::new()).unwrap();

        assert!(dataset.keyspace().is_empty());
        dataset.generate_keyspaces();

        assert_eq!(dataset.keyspace().len(), 3);
        assert_eq!(dataset.file_keyspace().len(), 2);
        assert_eq!(dataset.metadata_keyspace().len(), 1);
        assert!(!dataset.file_keyspace().includes_key(&key(&[("BAND", "red")])));
    }

    #[test]
    fn test_release_keeps_metadata() {
        let dataset = Dataset::new();
        let k = key(&[("NAME", "a")]);
        let file = dataset
            .add_data_file(k.clone(), DataFile::from_bytes("text/plain", &b"x"[..]))
            .unwrap();
        dataset.add_metadata(k.clone(), Field::new("meta")).unwrap();

        dataset.release().unwrap();
        assert!(!file.has_content());
        assert!(dataset.get_metadata(&k).is_ok());
    }

    #[test]
    fn test_random_access_requires_context() {
        let dataset = Dataset::new();
        let err = dataset
            .add_data_file_for_random_access(key(&[("NAME", "a")]), DataFile::new("image/tiff"))
            .err()
            .unwrap();
        assert!(err.is_unsupported());

        let err = dataset
            .add_data_file_for_random_access(
                key(&[("NAME", "b")]),
                DataFile::from_bytes("image/tiff", &b"x"[..]),
            )
            .err()
            .unwrap();
        assert!(err.is_logic());
    }

    #[test]
    fn test_equality_is_deep() {
        let build = |payload: &'static [u8]| {
            let dataset = Dataset::new();
            dataset
                .add_data_file(key(&[("NAME", "a")]), DataFile::from_bytes("text/plain", payload))
                .unwrap();
            dataset
                .add_metadata(key(&[("NAME", "a")]), Field::new(4546.789f64))
                .unwrap();
            dataset
        };

        assert_eq!(build(b"same"), build(b"same"));
        assert_ne!(build(b"same"), build(b"diff"));
        let a = build(b"same");
        assert_eq!(a, a);
    }
}

//! Dataset context backed by a directory on local disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

use dataset::{
    DataFile, DataKey, DatasetContext, LocalFileSink, LocalFileSource, LocalRandomAccessFile,
    RandomAccessRead, RandomAccessWrite, SharedSource,
};
use datastore_common::{StoreConfig, StoreError, StoreResult};

use crate::paths::{content_type_for, KeyPath};

/// Reads and writes data files under a root directory using the
/// [`KeyPath`] layout.
///
/// In input mode files are found on lookup; in output mode every file added
/// to the dataset gets a [`LocalFileSink`] at its layout path.
#[derive(Debug, Clone)]
pub struct LocalDirectoryContext {
    root: PathBuf,
    output: bool,
    query_only: bool,
    default_content_type: String,
}

impl LocalDirectoryContext {
    pub fn input(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output: false,
            query_only: false,
            default_content_type: StoreConfig::default().default_content_type,
        }
    }

    pub fn output(root: impl Into<PathBuf>) -> Self {
        Self {
            output: true,
            ..Self::input(root)
        }
    }

    /// Build from a validated config.
    pub fn from_config(config: &StoreConfig, output: bool) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            root: config.root_dir.clone(),
            output,
            query_only: config.query_only,
            default_content_type: config.default_content_type.clone(),
        })
    }

    pub fn with_query_only(mut self, query_only: bool) -> Self {
        self.query_only = query_only;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative path of the stored data file for `key`, if one exists.
    ///
    /// When several `data.*` files share a directory the first in name
    /// order wins.
    pub fn locate(&self, key: &DataKey) -> StoreResult<Option<String>> {
        let directory = KeyPath::directory(key);
        let dir = self.root.join(&directory);
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if KeyPath::is_data_file_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names.into_iter().next().map(|name| KeyPath::join(&directory, &name)))
    }

    fn content_type_of(&self, relative: &str) -> String {
        Path::new(relative)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(content_type_for)
            .map(str::to_string)
            .unwrap_or_else(|| self.default_content_type.clone())
    }

    /// A source over the stored file for `key`, if any.
    pub fn source_for(&self, key: &DataKey) -> StoreResult<Option<SharedSource>> {
        match self.locate(key)? {
            Some(relative) => {
                let source = LocalFileSource::open(self.root.join(relative))?;
                Ok(Some(SharedSource::new(source)))
            }
            None => Ok(None),
        }
    }

    /// Every key with a stored data file, in key order.
    pub fn keys(&self) -> StoreResult<Vec<DataKey>> {
        let mut keys = Vec::new();
        if !self.root.is_dir() {
            return Ok(keys);
        }

        for entry in walkdir::WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| StoreError::storage(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| StoreError::storage(e.to_string()))?;
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if let Some(parsed) = KeyPath::parse(&relative)? {
                keys.push(parsed.key);
            }
        }

        keys.sort();
        keys.dedup();
        debug!(root = %self.root.display(), count = keys.len(), "Scanned local dataset keys");
        Ok(keys)
    }
}

impl DatasetContext for LocalDirectoryContext {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn find_data_file(&self, key: &DataKey) -> StoreResult<Option<DataFile>> {
        let Some(relative) = self.locate(key)? else {
            return Ok(None);
        };
        let source = LocalFileSource::open(self.root.join(&relative))?;
        let file = DataFile::with_source(self.content_type_of(&relative), source);
        file.set_file_name(relative.clone())?;
        debug!(path = %relative, "Found local data file");
        Ok(Some(file))
    }

    fn is_output(&self) -> bool {
        self.output
    }

    fn is_query_only(&self) -> bool {
        self.query_only
    }

    #[instrument(skip(self, file), fields(root = %self.root.display()))]
    fn add_data_file(&self, key: &DataKey, file: &DataFile) -> StoreResult<()> {
        if !self.output {
            return Err(StoreError::unsupported(format!(
                "local directory {} is read-only (key {})",
                self.root.display(),
                key
            )));
        }
        let relative = KeyPath::file(key, file.content_type());
        let sink = LocalFileSink::create(self.root.join(&relative))?;
        file.set_sink(Arc::new(sink))?;
        // A name the caller chose is kept.
        if file.file_name().is_none() {
            file.set_file_name(relative.clone())?;
        }
        debug!(path = %relative, "Assigned local sink");
        Ok(())
    }

    fn data_file_name(&self, key: &DataKey) -> Option<String> {
        self.locate(key).ok().flatten()
    }

    fn random_access_writer(
        &self,
        key: &DataKey,
        file: &DataFile,
    ) -> StoreResult<Box<dyn RandomAccessWrite>> {
        if !self.output {
            return Err(StoreError::unsupported(format!(
                "local directory {} is read-only (key {})",
                self.root.display(),
                key
            )));
        }
        let path = self.root.join(KeyPath::file(key, file.content_type()));
        Ok(Box::new(LocalRandomAccessFile::create(path)?))
    }

    fn random_access_reader(&self, key: &DataKey) -> StoreResult<Box<dyn RandomAccessRead>> {
        let relative = self.locate(key)?.ok_or_else(|| {
            StoreError::invalid_argument(format!("no stored data file for key {}", key))
        })?;
        Ok(Box::new(LocalRandomAccessFile::open(self.root.join(relative))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{temp_test_dir, write_test_file};

    fn key(pairs: &[(&str, &str)]) -> DataKey {
        DataKey::from_pairs(pairs).unwrap()
    }

    #[test]
    fn test_find_and_scan() {
        let dir = temp_test_dir();
        write_test_file(dir.path(), "NAME=a/ZOOM=1/data.png", b"png");
        write_test_file(dir.path(), "NAME=b/data.json", b"{}");
        write_test_file(dir.path(), "NAME=b/notes.txt", b"ignored");

        let ctx = LocalDirectoryContext::input(dir.path());
        assert_eq!(
            ctx.keys().unwrap(),
            vec![key(&[("NAME", "a"), ("ZOOM", "1")]), key(&[("NAME", "b")])]
        );

        let file = ctx
            .find_data_file(&key(&[("ZOOM", "1"), ("NAME", "a")]))
            .unwrap()
            .unwrap();
        assert_eq!(file.content_type(), "image/png");
        assert_eq!(file.file_name().as_deref(), Some("NAME=a/ZOOM=1/data.png"));
        assert_eq!(&file.bytes().unwrap()[..], b"png");

        assert!(ctx.find_data_file(&key(&[("NAME", "c")])).unwrap().is_none());
    }

    #[test]
    fn test_unknown_extension_uses_default_content_type() {
        let dir = temp_test_dir();
        write_test_file(dir.path(), "NAME=a/data.xyz", b"?");
        let ctx = LocalDirectoryContext::input(dir.path());
        let file = ctx.find_data_file(&key(&[("NAME", "a")])).unwrap().unwrap();
        assert_eq!(file.content_type(), "application/octet-stream");
    }

    #[test]
    fn test_input_rejects_writes() {
        let dir = temp_test_dir();
        let ctx = LocalDirectoryContext::input(dir.path());
        let err = ctx
            .add_data_file(&key(&[("NAME", "a")]), &DataFile::new("image/png"))
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_from_config() {
        let dir = temp_test_dir();
        let config = StoreConfig {
            root_dir: dir.path().to_path_buf(),
            query_only: true,
            ..StoreConfig::default()
        };
        let ctx = LocalDirectoryContext::from_config(&config, true).unwrap();
        assert!(ctx.is_output());
        assert!(ctx.is_query_only());

        let bad = StoreConfig {
            log_level: "loud".to_string(),
            ..config
        };
        assert!(LocalDirectoryContext::from_config(&bad, false).is_err());
    }
}

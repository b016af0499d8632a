//! Data files: a content type bound to at most one source and one sink.
//!
//! A [`DataFile`] does not own bytes itself. Reads go to a
//! [`DataFileSource`], writes to a [`DataFileSink`]; either may be backed by
//! memory, local disk or a remote store. Sources are shared through
//! [`SharedSource`] so several files can present the same bytes without
//! copying.

mod random_access;
mod sink;
mod source;

pub use random_access::{LocalRandomAccessFile, RandomAccessRead, RandomAccessWrite};
pub use sink::{DataFileSink, LocalFileSink, MemorySink};
pub use source::{sources_equal, DataFileSource, LocalFileSource, MemorySource, SharedSource};

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use datastore_common::{StoreError, StoreResult};

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct FileState {
    source: Option<SharedSource>,
    sink: Option<Arc<dyn DataFileSink>>,
    file_name: Option<String>,
    source_assigned: bool,
    sink_assigned: bool,
    written: bool,
    released: bool,
}

impl FileState {
    fn live_source(&self) -> Option<&SharedSource> {
        self.source.as_ref().filter(|s| !s.is_released())
    }

    fn require_source(&self) -> StoreResult<&SharedSource> {
        if self.released {
            return Err(StoreError::logic("data file has been released"));
        }
        match &self.source {
            Some(source) if source.is_released() => {
                Err(StoreError::logic("data file source has been released"))
            }
            Some(source) => Ok(source),
            None => Err(StoreError::logic("data file has no source")),
        }
    }

    fn require_sink(&self) -> StoreResult<&Arc<dyn DataFileSink>> {
        self.sink
            .as_ref()
            .ok_or_else(|| StoreError::logic("data file has no sink"))
    }

    /// Give up this file's handle to its source. The source itself is
    /// released when the last handle drops.
    fn drop_source(&mut self) {
        self.source = None;
    }
}

/// Thread-safe content holder.
///
/// All content access holds the file's lock, so `release` never overlaps a
/// read or write in progress on another thread.
pub struct DataFile {
    id: u64,
    content_type: String,
    state: Mutex<FileState>,
}

impl DataFile {
    /// An empty file with no source or sink yet.
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            id: NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed),
            content_type: content_type.into(),
            state: Mutex::new(FileState::default()),
        }
    }

    pub fn with_source(content_type: impl Into<String>, source: impl DataFileSource + 'static) -> Self {
        Self::with_shared_source(content_type, SharedSource::new(source))
    }

    /// A file presenting a source that other files may also hold.
    pub fn with_shared_source(content_type: impl Into<String>, source: SharedSource) -> Self {
        let file = Self::new(content_type);
        {
            let mut state = file.state.lock();
            state.source = Some(source);
            state.source_assigned = true;
        }
        file
    }

    /// A file over an in-memory buffer.
    pub fn from_bytes(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::with_source(content_type, MemorySource::new(data))
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn file_name(&self) -> Option<String> {
        self.state.lock().file_name.clone()
    }

    /// Record the name the file is stored under. Fails if one is already set.
    pub fn set_file_name(&self, name: impl Into<String>) -> StoreResult<()> {
        let mut state = self.state.lock();
        if let Some(existing) = &state.file_name {
            return Err(StoreError::logic(format!(
                "data file is already named '{}'",
                existing
            )));
        }
        state.file_name = Some(name.into());
        Ok(())
    }

    /// Bind a source. Fails if one was ever assigned.
    pub fn set_source(&self, source: SharedSource) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.source_assigned {
            return Err(StoreError::logic("data file already has a source"));
        }
        state.source = Some(source);
        state.source_assigned = true;
        Ok(())
    }

    /// Bind a sink. Fails if one was ever assigned, even after release.
    pub fn set_sink(&self, sink: Arc<dyn DataFileSink>) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.sink_assigned {
            return Err(StoreError::logic("data file already has a sink"));
        }
        state.sink = Some(sink);
        state.sink_assigned = true;
        Ok(())
    }

    pub fn has_source(&self) -> bool {
        self.state.lock().source.is_some()
    }

    pub fn has_sink(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// True iff a source is assigned and not released.
    pub fn has_content(&self) -> bool {
        let state = self.state.lock();
        !state.released && state.live_source().is_some()
    }

    /// True once anything has been written to the sink.
    pub fn is_written(&self) -> bool {
        self.state.lock().written
    }

    pub fn bytes(&self) -> StoreResult<Bytes> {
        self.state.lock().require_source()?.bytes()
    }

    pub fn size(&self) -> StoreResult<u64> {
        self.state.lock().require_source()?.size()
    }

    pub fn read(&self, buf: &mut [u8]) -> StoreResult<usize> {
        self.state.lock().require_source()?.read(buf)
    }

    pub fn skip(&self, n: u64) -> StoreResult<u64> {
        self.state.lock().require_source()?.skip(n)
    }

    pub fn write(&self, buf: &[u8]) -> StoreResult<usize> {
        let mut state = self.state.lock();
        let written = state.require_sink()?.write(buf)?;
        state.written = true;
        Ok(written)
    }

    /// Copy the full source content to the sink, returning the byte count.
    pub fn copy_to_sink(&self) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let data = state.require_source()?.bytes()?;
        let sink = Arc::clone(state.require_sink()?);

        let mut offset = 0;
        while offset < data.len() {
            let n = sink.write(&data[offset..])?;
            if n == 0 {
                return Err(StoreError::storage("sink accepted no bytes"));
            }
            offset += n;
        }
        state.written = true;
        debug!(
            content_type = %self.content_type,
            size = data.len(),
            "Copied data file content to sink"
        );
        Ok(data.len() as u64)
    }

    /// Give up the source but keep the sink open.
    pub fn release_source(&self) {
        self.state.lock().drop_source();
    }

    /// Release the source and close the sink. Calling it again does nothing.
    pub fn release(&self) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.released {
            return Ok(());
        }
        state.released = true;
        state.drop_source();
        if let Some(sink) = state.sink.take() {
            sink.close()?;
        }
        Ok(())
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Content-aware comparison.
    ///
    /// Content types are compared first. Two files without content are
    /// equal; a file with content never equals one without; otherwise the
    /// bytes are compared.
    pub fn try_eq(&self, other: &DataFile) -> StoreResult<bool> {
        if std::ptr::eq(self, other) {
            return Ok(true);
        }
        if self.content_type != other.content_type {
            return Ok(false);
        }

        // Lock in id order so two threads comparing the same pair in
        // opposite directions cannot deadlock.
        let (first, second) = if self.id < other.id {
            (self, other)
        } else {
            (other, self)
        };
        let first_state = first.state.lock();
        let second_state = second.state.lock();

        let a = first_state.live_source().filter(|_| !first_state.released);
        let b = second_state.live_source().filter(|_| !second_state.released);
        match (a, b) {
            (None, None) => Ok(true),
            (Some(a), Some(b)) => sources_equal(&**a, &**b),
            _ => Ok(false),
        }
    }
}

impl PartialEq for DataFile {
    fn eq(&self, other: &Self) -> bool {
        self.try_eq(other).unwrap_or(false)
    }
}

impl std::fmt::Debug for DataFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DataFile")
            .field("content_type", &self.content_type)
            .field("file_name", &state.file_name)
            .field("has_source", &state.source.is_some())
            .field("has_sink", &state.sink.is_some())
            .field("released", &state.released)
            .finish()
    }
}

impl Drop for DataFile {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(content_type = %self.content_type, error = %e, "Failed to close sink while dropping data file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_source_is_logic_error() {
        let file = DataFile::new("image/png");
        assert!(!file.has_content());
        assert!(file.bytes().unwrap_err().is_logic());
        assert!(file.size().unwrap_err().is_logic());
        let mut buf = [0u8; 4];
        assert!(file.read(&mut buf).unwrap_err().is_logic());
        assert!(file.write(b"x").unwrap_err().is_logic());
    }

    #[test]
    fn test_source_and_sink_single_assignment() {
        let file = DataFile::from_bytes("text/plain", &b"abc"[..]);
        let err = file
            .set_source(SharedSource::new(MemorySource::new(&b"zzz"[..])))
            .unwrap_err();
        assert!(err.is_logic());

        file.set_sink(Arc::new(MemorySink::new())).unwrap();
        assert!(file.set_sink(Arc::new(MemorySink::new())).unwrap_err().is_logic());
    }

    #[test]
    fn test_sink_cannot_be_replaced_after_release() {
        let file = DataFile::new("text/plain");
        file.set_sink(Arc::new(MemorySink::new())).unwrap();
        file.release().unwrap();
        assert!(!file.has_sink());
        assert!(file.set_sink(Arc::new(MemorySink::new())).unwrap_err().is_logic());
    }

    #[test]
    fn test_file_name_single_assignment() {
        let file = DataFile::new("text/plain");
        file.set_file_name("a.txt").unwrap();
        assert!(file.set_file_name("b.txt").unwrap_err().is_logic());
        assert_eq!(file.file_name().as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_release_semantics() {
        let file = DataFile::from_bytes("text/plain", &b"payload"[..]);
        assert!(file.has_content());
        assert_eq!(file.size().unwrap(), 7);

        file.release().unwrap();
        assert!(!file.has_content());
        assert!(file.bytes().unwrap_err().is_logic());
        assert!(file.size().unwrap_err().is_logic());
        let mut buf = [0u8; 2];
        assert!(file.read(&mut buf).unwrap_err().is_logic());

        // Idempotent.
        file.release().unwrap();
        assert!(file.is_released());
        // A released file cannot be given a new source.
        assert!(file
            .set_source(SharedSource::new(MemorySource::new(&b"x"[..])))
            .is_err());
    }

    #[test]
    fn test_release_closes_sink() {
        let sink = Arc::new(MemorySink::new());
        let file = DataFile::new("text/plain");
        file.set_sink(sink.clone()).unwrap();
        file.write(b"out").unwrap();
        assert!(file.is_written());

        file.release().unwrap();
        assert!(sink.is_closed());
        assert_eq!(&sink.contents()[..], b"out");
    }

    #[test]
    fn test_copy_to_sink() {
        let sink = Arc::new(MemorySink::new());
        let file = DataFile::from_bytes("application/octet-stream", vec![7u8; 1024]);
        file.set_sink(sink.clone()).unwrap();
        assert_eq!(file.copy_to_sink().unwrap(), 1024);
        assert_eq!(sink.len(), 1024);
        assert!(file.is_written());
    }

    #[test]
    fn test_shared_source_lifetime() {
        let source = SharedSource::new(MemorySource::new(&b"shared"[..]));
        let watcher = source.clone();

        let first = DataFile::with_shared_source("text/plain", source.clone());
        let second = DataFile::with_shared_source("text/plain", source);
        assert_eq!(watcher.handle_count(), 3);

        first.release().unwrap();
        assert!(!first.has_content());
        assert!(second.has_content());
        assert_eq!(&second.bytes().unwrap()[..], b"shared");
        assert_eq!(watcher.handle_count(), 2);

        second.release().unwrap();
        assert_eq!(watcher.handle_count(), 1);
        assert!(!watcher.is_released());
        drop(watcher);
    }

    #[test]
    fn test_equality() {
        let a = DataFile::from_bytes("image/png", &b"1234"[..]);
        let b = DataFile::from_bytes("image/png", &b"1234"[..]);
        let c = DataFile::from_bytes("image/png", &b"5678"[..]);
        let d = DataFile::from_bytes("image/tiff", &b"1234"[..]);
        let empty_a = DataFile::new("image/png");
        let empty_b = DataFile::new("image/png");

        assert_eq!(a, b);
        assert_eq!(b, a);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, empty_a);
        assert_eq!(empty_a, empty_b);
        assert_eq!(a, a);

        b.release().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_concurrent_comparison_in_opposite_order() {
        let a = DataFile::from_bytes("text/plain", vec![1u8; 4096]);
        let b = DataFile::from_bytes("text/plain", vec![1u8; 4096]);

        std::thread::scope(|scope| {
            for i in 0..8 {
                let (x, y) = if i % 2 == 0 { (&a, &b) } else { (&b, &a) };
                scope.spawn(move || {
                    for _ in 0..200 {
                        assert!(x.try_eq(y).unwrap());
                    }
                });
            }
        });
    }

    #[test]
    fn test_concurrent_reads_and_release() {
        let file = DataFile::from_bytes("text/plain", vec![3u8; 256]);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        match file.bytes() {
                            Ok(bytes) => assert_eq!(bytes.len(), 256),
                            Err(e) => assert!(e.is_logic()),
                        }
                    }
                });
            }
            scope.spawn(|| file.release().unwrap());
        });

        assert!(!file.has_content());
    }
}

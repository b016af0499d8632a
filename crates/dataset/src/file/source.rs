//! Read-side content capability and its memory and local-file backends.

use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use datastore_common::{StoreError, StoreResult};

/// Streamed read access to a file's bytes.
///
/// Implementations use interior mutability; a source is shared between
/// [`DataFile`](crate::DataFile) wrappers through [`SharedSource`].
pub trait DataFileSource: Send + Sync {
    /// The full content as one buffer.
    fn bytes(&self) -> StoreResult<Bytes>;

    /// Full content length in bytes.
    fn size(&self) -> StoreResult<u64>;

    /// Read the next chunk into `buf`, returning the number of bytes read
    /// (0 at end of content).
    fn read(&self, _buf: &mut [u8]) -> StoreResult<usize> {
        Err(StoreError::unsupported("this source does not support streaming reads"))
    }

    /// Advance the read position by up to `n` bytes, returning how far it moved.
    fn skip(&self, _n: u64) -> StoreResult<u64> {
        Err(StoreError::unsupported("this source does not support skipping"))
    }

    /// Drop the buffered content; later reads fail.
    fn release(&self);

    fn is_released(&self) -> bool;
}

struct ReleaseOnDrop(Box<dyn DataFileSource>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Reference-counted handle to a source.
///
/// The source's own `release` runs exactly once, when the last handle drops.
#[derive(Clone)]
pub struct SharedSource(Arc<ReleaseOnDrop>);

impl SharedSource {
    pub fn new(source: impl DataFileSource + 'static) -> Self {
        Self(Arc::new(ReleaseOnDrop(Box::new(source))))
    }

    /// Number of live handles, this one included.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl Deref for SharedSource {
    type Target = dyn DataFileSource;

    fn deref(&self) -> &Self::Target {
        self.0 .0.as_ref()
    }
}

impl<S: DataFileSource + 'static> From<S> for SharedSource {
    fn from(source: S) -> Self {
        Self::new(source)
    }
}

/// Byte-for-byte comparison of two sources. Both must be unreleased.
pub fn sources_equal(a: &dyn DataFileSource, b: &dyn DataFileSource) -> StoreResult<bool> {
    if a.is_released() || b.is_released() {
        return Err(StoreError::logic("cannot compare a released source"));
    }
    if a.size()? != b.size()? {
        return Ok(false);
    }
    Ok(a.bytes()? == b.bytes()?)
}

fn released_error() -> StoreError {
    StoreError::logic("source has been released")
}

struct MemoryState {
    data: Option<Bytes>,
    position: usize,
}

/// Content held in a reference-counted in-memory buffer.
pub struct MemorySource {
    state: Mutex<MemoryState>,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                data: Some(data.into()),
                position: 0,
            }),
        }
    }
}

impl DataFileSource for MemorySource {
    fn bytes(&self) -> StoreResult<Bytes> {
        self.state.lock().data.clone().ok_or_else(released_error)
    }

    fn size(&self) -> StoreResult<u64> {
        let state = self.state.lock();
        state
            .data
            .as_ref()
            .map(|d| d.len() as u64)
            .ok_or_else(released_error)
    }

    fn read(&self, buf: &mut [u8]) -> StoreResult<usize> {
        let mut state = self.state.lock();
        let position = state.position;
        let data = state.data.as_ref().ok_or_else(released_error)?;
        let remaining = &data[position.min(data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        state.position = position + n;
        Ok(n)
    }

    fn skip(&self, n: u64) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let len = state.data.as_ref().ok_or_else(released_error)?.len();
        let skipped = (len.saturating_sub(state.position) as u64).min(n);
        state.position += skipped as usize;
        Ok(skipped)
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.data = None;
        state.position = 0;
    }

    fn is_released(&self) -> bool {
        self.state.lock().data.is_none()
    }
}

enum Stage {
    Unloaded,
    Loaded(Bytes),
    Released,
}

struct LocalFileState {
    stage: Stage,
    reader: Option<BufReader<File>>,
}

/// Content stored in a file on local disk.
///
/// `bytes()` loads the whole file on first use; `read`/`skip` stream
/// through an open handle without loading it.
pub struct LocalFileSource {
    path: PathBuf,
    state: Mutex<LocalFileState>,
}

impl LocalFileSource {
    /// Open a source over an existing file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )));
        }
        Ok(Self {
            path,
            state: Mutex::new(LocalFileState {
                stage: Stage::Unloaded,
                reader: None,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state.lock().stage, Stage::Loaded(_))
    }

    fn reader<'a>(&self, state: &'a mut LocalFileState) -> StoreResult<&'a mut BufReader<File>> {
        if matches!(state.stage, Stage::Released) {
            return Err(released_error());
        }
        if state.reader.is_none() {
            state.reader = Some(BufReader::new(File::open(&self.path)?));
        }
        state.reader.as_mut().ok_or_else(released_error)
    }
}

impl DataFileSource for LocalFileSource {
    fn bytes(&self) -> StoreResult<Bytes> {
        let mut state = self.state.lock();
        match &state.stage {
            Stage::Loaded(data) => Ok(data.clone()),
            Stage::Released => Err(released_error()),
            Stage::Unloaded => {
                let data = Bytes::from(std::fs::read(&self.path)?);
                debug!(path = %self.path.display(), size = data.len(), "Loaded local file");
                state.stage = Stage::Loaded(data.clone());
                Ok(data)
            }
        }
    }

    fn size(&self) -> StoreResult<u64> {
        let state = self.state.lock();
        match &state.stage {
            Stage::Loaded(data) => Ok(data.len() as u64),
            Stage::Released => Err(released_error()),
            Stage::Unloaded => Ok(std::fs::metadata(&self.path)?.len()),
        }
    }

    fn read(&self, buf: &mut [u8]) -> StoreResult<usize> {
        let mut state = self.state.lock();
        let reader = self.reader(&mut state)?;
        Ok(reader.read(buf)?)
    }

    fn skip(&self, n: u64) -> StoreResult<u64> {
        let len = self.size()?;
        let mut state = self.state.lock();
        let reader = self.reader(&mut state)?;
        let position = reader.stream_position()?;
        let skipped = len.saturating_sub(position).min(n);
        reader.seek_relative(skipped as i64)?;
        Ok(skipped)
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.stage = Stage::Released;
        state.reader = None;
    }

    fn is_released(&self) -> bool {
        matches!(self.state.lock().stage, Stage::Released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_source_read_and_skip() {
        let source = MemorySource::new(&b"abcdefgh"[..]);
        let mut buf = [0u8; 3];
        assert_eq!(source.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(source.skip(2).unwrap(), 2);
        assert_eq!(source.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"fgh");
        assert_eq!(source.read(&mut buf).unwrap(), 0);
        assert_eq!(source.skip(10).unwrap(), 0);
    }

    #[test]
    fn test_memory_source_release() {
        let source = MemorySource::new(vec![1u8, 2, 3]);
        assert_eq!(source.size().unwrap(), 3);
        source.release();
        assert!(source.is_released());
        assert!(source.bytes().unwrap_err().is_logic());
        assert!(source.size().unwrap_err().is_logic());
    }

    #[test]
    fn test_sources_equal() {
        let a = MemorySource::new(&b"same"[..]);
        let b = MemorySource::new(&b"same"[..]);
        let c = MemorySource::new(&b"diff"[..]);
        assert!(sources_equal(&a, &b).unwrap());
        assert!(!sources_equal(&a, &c).unwrap());

        b.release();
        assert!(sources_equal(&a, &b).unwrap_err().is_logic());
    }

    #[test]
    fn test_default_streaming_is_unsupported() {
        struct FixedSource;
        impl DataFileSource for FixedSource {
            fn bytes(&self) -> StoreResult<Bytes> {
                Ok(Bytes::from_static(b"x"))
            }
            fn size(&self) -> StoreResult<u64> {
                Ok(1)
            }
            fn release(&self) {}
            fn is_released(&self) -> bool {
                false
            }
        }

        let mut buf = [0u8; 1];
        assert!(FixedSource.read(&mut buf).unwrap_err().is_unsupported());
        assert!(FixedSource.skip(1).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_local_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"0123456789")
            .unwrap();

        let source = LocalFileSource::open(&path).unwrap();
        assert_eq!(source.size().unwrap(), 10);
        assert!(!source.is_loaded());

        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(source.skip(4).unwrap(), 4);
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"89");
        assert_eq!(source.skip(4).unwrap(), 0);

        assert_eq!(&source.bytes().unwrap()[..], b"0123456789");
        assert!(source.is_loaded());

        source.release();
        assert!(source.bytes().unwrap_err().is_logic());
        assert!(source.read(&mut buf).unwrap_err().is_logic());
    }

    struct FlagSource {
        inner: MemorySource,
        released: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl DataFileSource for FlagSource {
        fn bytes(&self) -> StoreResult<Bytes> {
            self.inner.bytes()
        }
        fn size(&self) -> StoreResult<u64> {
            self.inner.size()
        }
        fn release(&self) {
            self.released.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.release();
        }
        fn is_released(&self) -> bool {
            self.inner.is_released()
        }
    }

    #[test]
    fn test_shared_source_releases_once_on_last_drop() {
        let released = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let handle = SharedSource::new(FlagSource {
            inner: MemorySource::new(&b"abc"[..]),
            released: Arc::clone(&released),
        });

        let clones: Vec<SharedSource> = (0..16).map(|_| handle.clone()).collect();
        drop(handle);
        std::thread::scope(|scope| {
            for clone in clones {
                scope.spawn(move || {
                    assert_eq!(clone.size().unwrap(), 3);
                    drop(clone);
                });
            }
        });
        assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_local_file_source_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalFileSource::open(dir.path().join("missing.bin"))
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Io(_)));
    }
}

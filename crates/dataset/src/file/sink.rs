//! Write-side content capability and its memory and local-file backends.

use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use datastore_common::{StoreError, StoreResult};

use super::source::MemorySource;

/// Streamed write access for a file's bytes.
pub trait DataFileSink: Send + Sync {
    /// Append `buf`, returning the number of bytes accepted.
    fn write(&self, buf: &[u8]) -> StoreResult<usize>;

    /// Flush and finish the content; later writes fail.
    fn close(&self) -> StoreResult<()>;

    fn is_closed(&self) -> bool;
}

fn closed_error() -> StoreError {
    StoreError::logic("sink has been closed")
}

#[derive(Default)]
struct MemorySinkState {
    data: Vec<u8>,
    closed: bool,
}

/// Collects written bytes in memory.
#[derive(Default)]
pub struct MemorySink {
    state: Mutex<MemorySinkState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn contents(&self) -> Bytes {
        Bytes::copy_from_slice(&self.state.lock().data)
    }

    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().data.is_empty()
    }

    /// A source over the written bytes.
    pub fn to_source(&self) -> MemorySource {
        MemorySource::new(self.contents())
    }
}

impl DataFileSink for MemorySink {
    fn write(&self, buf: &[u8]) -> StoreResult<usize> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(closed_error());
        }
        state.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&self) -> StoreResult<()> {
        self.state.lock().closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Writes content to a file on local disk, creating parent directories.
pub struct LocalFileSink {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl LocalFileSink {
    pub fn create(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        debug!(path = %path.display(), "Created local file sink");
        Ok(Self {
            path,
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataFileSink for LocalFileSink {
    fn write(&self, buf: &[u8]) -> StoreResult<usize> {
        let mut writer = self.writer.lock();
        let writer = writer.as_mut().ok_or_else(closed_error)?;
        writer.write_all(buf)?;
        Ok(buf.len())
    }

    fn close(&self) -> StoreResult<()> {
        if let Some(mut writer) = self.writer.lock().take() {
            writer.flush()?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.writer.lock().is_none()
    }
}

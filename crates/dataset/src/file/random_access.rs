//! Positioned read/write handles handed out by a dataset context.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use datastore_common::StoreResult;

/// Writes at arbitrary offsets.
pub trait RandomAccessWrite: Send {
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> StoreResult<()>;

    fn flush(&mut self) -> StoreResult<()>;
}

/// Reads at arbitrary offsets.
pub trait RandomAccessRead: Send {
    /// Read up to `buf.len()` bytes starting at `offset`; returns 0 past the end.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> StoreResult<usize>;

    fn size(&self) -> StoreResult<u64>;
}

/// Random access over a local file.
pub struct LocalRandomAccessFile {
    path: PathBuf,
    file: File,
}

impl LocalRandomAccessFile {
    /// Open (creating if needed) a file for positioned writes and reads.
    pub fn create(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self { path, file })
    }

    /// Open an existing file for positioned reads.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RandomAccessWrite for LocalRandomAccessFile {
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> StoreResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> StoreResult<()> {
        self.file.flush()?;
        Ok(())
    }
}

impl RandomAccessRead for LocalRandomAccessFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> StoreResult<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.file.metadata()?.len())
    }
}

//! File access capability used by the line log.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Whole-file read, append and overwrite.
///
/// Every write must be flushed before the call returns.
pub trait FileAccess: Send + Sync {
    /// Read the full contents of `path`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Append `bytes` to the end of `path`, creating it if needed.
    fn append(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Replace the contents of `path` with `bytes`.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;
}

/// Local filesystem access.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsAccess;

impl FileAccess for FsAccess {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn append(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(bytes)?;
        file.sync_data()
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(bytes)?;
        file.sync_all()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// In-memory files, keyed by path.
#[derive(Debug, Default)]
pub struct MemoryAccess {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file with initial contents.
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.lock().insert(path.into(), contents.into());
        self
    }

    /// Current contents of a file, if it exists.
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    /// Drop a file, as if it were removed from disk.
    pub fn remove(&self, path: &Path) {
        self.files.lock().remove(path);
    }
}

impl FileAccess for MemoryAccess {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.lock().get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }

    fn append(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.files
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.files.lock().insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }
}

impl<A: FileAccess + ?Sized> FileAccess for std::sync::Arc<A> {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        (**self).read(path)
    }

    fn append(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        (**self).append(path, bytes)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        (**self).write(path, bytes)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}

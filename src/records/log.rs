//! Line-oriented record log.

use crate::error::{Result, StoreError};
use crate::records::access::{FileAccess, FsAccess};
use crate::records::codec::{self, LINE_SEPARATOR};
use crate::types::{Document, LogRecord};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persistence behind a [`Store`](crate::Store).
///
/// The store only ever loads every record, appends one, or replaces the
/// full set, so an engine that indexes records can stand in for the line
/// log without the query side noticing.
pub trait StorageEngine: Send + Sync {
    /// Every record in log order, tombstones included.
    fn load(&self) -> Result<Vec<LogRecord>>;

    /// Append a new active record.
    fn append(&self, data: &Document) -> Result<()>;

    /// Replace the stored records with `records`.
    fn rewrite(&self, records: &[LogRecord]) -> Result<()>;
}

/// A log file of `E`/`D` tagged JSON lines.
pub struct RecordLog<F: FileAccess = FsAccess> {
    /// Path to the log file.
    path: PathBuf,

    access: F,
}

impl RecordLog<FsAccess> {
    /// Open a log on the local filesystem.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::with_access(path, FsAccess)
    }
}

impl<F: FileAccess> RecordLog<F> {
    pub fn with_access(path: impl AsRef<Path>, access: F) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            access,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.access.exists(&self.path)
    }

    /// Create an empty log file.
    pub fn create(&self) -> Result<()> {
        self.access.write(&self.path, b"")?;
        Ok(())
    }

    fn read_text(&self) -> Result<String> {
        let bytes = self.access.read(&self.path)?;
        String::from_utf8(bytes).map_err(|e| StoreError::MalformedRecord {
            line: 0,
            reason: format!("log is not valid UTF-8: {}", e),
        })
    }
}

impl<F: FileAccess> StorageEngine for RecordLog<F> {
    fn load(&self) -> Result<Vec<LogRecord>> {
        let raw = self.read_text()?;
        let records = codec::decode_all(&raw)?;
        debug!(path = %self.path.display(), records = records.len(), "loaded log");
        Ok(records)
    }

    fn append(&self, data: &Document) -> Result<()> {
        let line = codec::encode_one(data)?;
        let mut bytes = String::with_capacity(line.len() + 1);
        bytes.push(LINE_SEPARATOR);
        bytes.push_str(&line);

        self.access.append(&self.path, bytes.as_bytes())?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "appended record");
        Ok(())
    }

    fn rewrite(&self, records: &[LogRecord]) -> Result<()> {
        let raw = codec::encode_all(records)?;
        self.access.write(&self.path, raw.as_bytes())?;
        debug!(
            path = %self.path.display(),
            records = records.len(),
            bytes = raw.len(),
            "rewrote log"
        );
        Ok(())
    }
}

//! Record log implementation.
//!
//! Records are stored one per line in an append-only text log. Deletes
//! tombstone records in place and rewrite the whole file.

mod access;
pub mod codec;
mod log;

pub use access::{FileAccess, FsAccess, MemoryAccess};
pub use log::{RecordLog, StorageEngine};

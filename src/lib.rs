//! # linestore
//!
//! An embedded record store backed by a line-oriented, append-only text
//! log, with a small document query language.
//!
//! ## Core Concepts
//!
//! - **Records**: JSON objects, one per line, tagged `E` (active) or `D`
//!   (deleted)
//! - **Tombstones**: deletes flag records rather than removing them; the
//!   flag never goes back
//! - **Queries**: field comparisons (`$eq`, `$gt`, `$lt`, `$in`), `$text`
//!   token search, and `$and` / `$or` composition
//! - **Options**: projection and multi-key sort over the results
//!
//! ## Example
//!
//! ```ignore
//! use linestore::{FindOptions, Query, Sort, SortDirection, Store, StoreConfig};
//! use serde_json::json;
//!
//! let store: Store = Store::open(
//!     StoreConfig::builder().path("./people.log").text_field("bio").build(),
//! )?;
//!
//! store.insert(&json!({"id": 1, "name": "Ada", "bio": "Loves Go and Rust"}).as_object().unwrap().clone())?;
//!
//! let rustaceans = store.find(
//!     &Query::text("rust"),
//!     Some(&FindOptions::new().project(["name"]).sort(Sort::new().by("name", SortDirection::Ascending))),
//! )?;
//!
//! store.delete(&Query::eq("id", 1))?;
//! ```

pub mod error;
pub mod query;
pub mod records;
pub mod store;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use query::{
    compile, Criteria, FieldMatch, FindOptions, Predicate, Projection, Query, Sort, SortDirection,
};
pub use records::{FileAccess, FsAccess, MemoryAccess, RecordLog, StorageEngine};
pub use store::{Store, StoreConfig, StoreConfigBuilder};
pub use types::*;

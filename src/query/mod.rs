//! Query engine.
//!
//! A [`Query`] is compiled once into a [`Predicate`] and then run over
//! every record in a full scan. [`FindOptions`] sorts and projects the
//! surviving records.

mod model;
mod options;
mod predicate;
mod value;

pub use model::{Criteria, Query};
pub use options::{FindOptions, Projection, Sort, SortDirection};
pub use predicate::{compile, FieldMatch, Predicate};

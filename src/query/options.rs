//! Projection and sort applied to query results.

use crate::error::{Result, StoreError};
use crate::query::value::sort_cmp;
use crate::types::Document;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn from_json(value: &Value) -> Option<Self> {
        match value.as_i64()? {
            1 => Some(SortDirection::Ascending),
            -1 => Some(SortDirection::Descending),
            _ => None,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// The set of fields kept in each result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse `{"field": 1, ...}`. Fields whose flag is not `1` are left out.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            StoreError::InvalidQuery(format!("projection must be an object, got {}", value))
        })?;
        Ok(Self {
            fields: object
                .iter()
                .filter(|(_, flag)| flag.as_f64() == Some(1.0))
                .map(|(name, _)| name.clone())
                .collect(),
        })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Narrow a record to the projected fields. Fields the record lacks are
    /// omitted rather than nulled.
    pub fn apply(&self, record: &Document) -> Document {
        let mut projected = Document::new();
        for field in &self.fields {
            if let Some(value) = record.get(field) {
                projected.insert(field.clone(), value.clone());
            }
        }
        projected
    }
}

/// Multi-key sort order. Earlier keys take priority; later keys break ties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sort {
    keys: Vec<(String, SortDirection)>,
}

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push((field.into(), direction));
        self
    }

    /// Parse `{"field": 1 | -1, ...}` keeping key order.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            StoreError::InvalidQuery(format!("sort must be an object, got {}", value))
        })?;

        let mut keys = Vec::with_capacity(object.len());
        for (field, direction) in object {
            let direction = SortDirection::from_json(direction).ok_or_else(|| {
                StoreError::InvalidQuery(format!(
                    "sort direction for {:?} must be 1 or -1, got {}",
                    field, direction
                ))
            })?;
            keys.push((field.clone(), direction));
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (field, direction) in &self.keys {
            let ordering = sort_cmp(a.get(field), b.get(field));
            if ordering != Ordering::Equal {
                return direction.apply(ordering);
            }
        }
        Ordering::Equal
    }

    pub fn apply(&self, records: &mut [Document]) {
        if !self.keys.is_empty() {
            records.sort_by(|a, b| self.compare(a, b));
        }
    }
}

/// Post-filter options for `find`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub projection: Option<Projection>,
    pub sort: Option<Sort>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(Projection::new(fields));
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Parse `{"projection": {...}, "sort": {...}}`. Both keys are optional.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            StoreError::InvalidQuery(format!("options must be an object, got {}", value))
        })?;

        let mut options = FindOptions::default();
        for (key, value) in object {
            match key.as_str() {
                "projection" => options.projection = Some(Projection::from_json(value)?),
                "sort" => options.sort = Some(Sort::from_json(value)?),
                other => {
                    return Err(StoreError::InvalidQuery(format!(
                        "unknown option {:?}",
                        other
                    )))
                }
            }
        }
        Ok(options)
    }

    /// Sort full records, then project them.
    pub fn apply(&self, mut records: Vec<Document>) -> Vec<Document> {
        if let Some(sort) = &self.sort {
            sort.apply(&mut records);
        }
        match &self.projection {
            Some(projection) => records.iter().map(|r| projection.apply(r)).collect(),
            None => records,
        }
    }
}

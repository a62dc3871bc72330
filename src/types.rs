//! Core types for the record store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::fmt::Write;

/// A record's payload: field name to scalar value, in insertion order.
pub type Document = Map<String, Value>;

/// A single entry in the log.
///
/// The deleted flag only moves one way. Once [`LogRecord::tombstone`] has
/// been called the record stays deleted for the rest of its life.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    deleted: bool,
    data: Document,
}

impl LogRecord {
    /// A live record.
    pub fn active(data: Document) -> Self {
        Self {
            deleted: false,
            data,
        }
    }

    /// A record that is already tombstoned.
    pub fn deleted(data: Document) -> Self {
        Self {
            deleted: true,
            data,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn data(&self) -> &Document {
        &self.data
    }

    pub fn into_data(self) -> Document {
        self.data
    }

    /// Mark the record deleted.
    ///
    /// Returns `true` if this call flipped the flag, `false` if the record
    /// was already a tombstone.
    pub fn tombstone(&mut self) -> bool {
        let flipped = !self.deleted;
        self.deleted = true;
        flipped
    }
}

/// Which records are live, by position.
///
/// A record is live when it is active and no later tombstone carries an
/// identical payload. Key order does not matter for that comparison, and
/// numbers match by value (`1` and `1.0` are the same).
pub fn live_mask(records: &[LogRecord]) -> Vec<bool> {
    let mut mask = vec![false; records.len()];
    let mut tombstones: HashSet<String> = HashSet::new();

    for (idx, record) in records.iter().enumerate().rev() {
        if record.is_deleted() {
            tombstones.insert(shadow_key(record.data()));
        } else {
            mask[idx] = tombstones.is_empty() || !tombstones.contains(&shadow_key(record.data()));
        }
    }
    mask
}

/// Canonical text of a payload: object keys sorted, integral numbers
/// written without a fraction.
fn shadow_key(data: &Document) -> String {
    let mut key = String::new();
    write_object(data, &mut key);
    key
}

fn write_object(data: &Document, out: &mut String) {
    let mut fields: Vec<(&String, &Value)> = data.iter().collect();
    fields.sort_unstable_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (name, value)) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{:?}:", name);
        write_value(value, out);
    }
    out.push('}');
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Number(n) => write_number(n, out),
        Value::String(s) => {
            let _ = write!(out, "{:?}", s);
        }
        Value::Bool(_) | Value::Null => {
            let _ = write!(out, "{}", value);
        }
    }
}

fn write_number(n: &Number, out: &mut String) {
    let _ = if let Some(i) = n.as_i64() {
        write!(out, "{}", i)
    } else if let Some(u) = n.as_u64() {
        write!(out, "{}", u)
    } else {
        match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                write!(out, "{}", f as i64)
            }
            Some(f) => write!(out, "{:?}", f),
            None => write!(out, "{}", n),
        }
    };
}

/// Record counts for a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Records visible to `find`.
    pub active_records: usize,
    /// Tombstone lines still present in the log.
    pub deleted_records: usize,
    /// Every tagged line in the log.
    pub total_records: usize,
}

impl StoreStats {
    pub(crate) fn from_records(records: &[LogRecord]) -> Self {
        Self {
            active_records: live_mask(records).into_iter().filter(|live| *live).count(),
            deleted_records: records.iter().filter(|r| r.is_deleted()).count(),
            total_records: records.len(),
        }
    }
}

//! Tagged-line encoding of log records.
//!
//! Each record occupies one line: a one-character tag followed by the
//! record's JSON object.
//!
//! ```text
//! E{"id":1,"name":"x"}
//! D{"id":2,"name":"y"}
//! ```
//!
//! `E` marks an active entry and `D` a deleted one. Blank lines and lines
//! starting with any other character are skipped on read.

use crate::error::{Result, StoreError};
use crate::types::{Document, LogRecord};
use serde_json::Value;
use tracing::warn;

/// Tag for an active record.
pub const ACTIVE_TAG: char = 'E';

/// Tag for a tombstoned record.
pub const DELETED_TAG: char = 'D';

/// Line separator between records.
pub const LINE_SEPARATOR: char = '\n';

/// Decode one line.
///
/// Returns `Ok(None)` for blank or untagged lines. `line_no` is only used
/// in the error for a malformed payload.
pub fn decode_line(line: &str, line_no: usize) -> Result<Option<LogRecord>> {
    let line = line.trim();
    let mut chars = line.chars();
    let deleted = match chars.next() {
        Some(ACTIVE_TAG) => false,
        Some(DELETED_TAG) => true,
        _ => return Ok(None),
    };

    let data = parse_payload(chars.as_str(), line_no)?;
    Ok(Some(if deleted {
        LogRecord::deleted(data)
    } else {
        LogRecord::active(data)
    }))
}

/// Decode a whole log file, preserving line order.
pub fn decode_all(raw: &str) -> Result<Vec<LogRecord>> {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (idx, line) in raw.lines().enumerate() {
        match decode_line(line, idx + 1)? {
            Some(record) => records.push(record),
            None if line.trim().is_empty() => {}
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(skipped, "skipped untagged lines while decoding log");
    }

    Ok(records)
}

/// Encode a payload as a new active line.
pub fn encode_one(data: &Document) -> Result<String> {
    encode_tagged(ACTIVE_TAG, data)
}

/// Encode a record with the tag its deleted flag calls for.
pub fn encode_record(record: &LogRecord) -> Result<String> {
    let tag = if record.is_deleted() {
        DELETED_TAG
    } else {
        ACTIVE_TAG
    };
    encode_tagged(tag, record.data())
}

/// Encode every record, one per line, in the given order.
///
/// No trailing separator is written.
pub fn encode_all(records: &[LogRecord]) -> Result<String> {
    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push(LINE_SEPARATOR);
        }
        out.push_str(&encode_record(record)?);
    }
    Ok(out)
}

fn encode_tagged(tag: char, data: &Document) -> Result<String> {
    let json = serde_json::to_string(data)?;
    let mut line = String::with_capacity(json.len() + 1);
    line.push(tag);
    line.push_str(&json);
    Ok(line)
}

fn parse_payload(payload: &str, line_no: usize) -> Result<Document> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| StoreError::MalformedRecord {
            line: line_no,
            reason: e.to_string(),
        })?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::MalformedRecord {
            line: line_no,
            reason: format!("expected a JSON object, got {}", other),
        }),
    }
}

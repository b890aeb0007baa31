// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//! Documents and their reserved fields.
//!
//! A document is an untyped JSON object. Before it enters a WAL it gets an
//! `_id` (kept when given, otherwise a v4 UUID) and a `_timestamp`
//! normalized to epoch milliseconds (RFC 3339 or another supported date
//! string, an epoch-millisecond integer, or the ingestion time when absent).

use serde_json::{Map, Value};
use tidemark_mapping::{parse_date, MappingError, ID_FIELD, TIMESTAMP_FIELD};
use uuid::Uuid;

use crate::error::{IndexError, IndexResult};

pub type Document = Map<String, Value>;

/// Prepare a client document for ingestion.
pub fn prepare_document(value: Value, now_ms: i64) -> IndexResult<Document> {
    let doc = match value {
        Value::Object(map) => map,
        other => {
            return Err(IndexError::InvalidDocument(format!(
                "expected a JSON object, got {}",
                kind_name(&other)
            )))
        }
    };
    normalize(doc, || Uuid::new_v4().to_string(), now_ms)
}

/// Normalize the reserved fields of a document read back from a WAL.
///
/// Documents written through the producer already carry both fields;
/// `fallback_id` only covers records appended by other means, and must be
/// stable across replays of the same record.
pub fn normalize_replayed(
    doc: Document,
    fallback_id: impl FnOnce() -> String,
    now_ms: i64,
) -> IndexResult<Document> {
    normalize(doc, fallback_id, now_ms)
}

fn normalize(
    mut doc: Document,
    fallback_id: impl FnOnce() -> String,
    now_ms: i64,
) -> IndexResult<Document> {
    let id = match doc.remove(ID_FIELD) {
        None | Some(Value::Null) => fallback_id(),
        Some(Value::String(s)) if s.is_empty() => fallback_id(),
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(MappingError::InvalidField {
                field: ID_FIELD.to_string(),
                reason: format!("expected a string, got {}", kind_name(&other)),
            }
            .into())
        }
    };

    let timestamp = match doc.remove(TIMESTAMP_FIELD) {
        None | Some(Value::Null) => now_ms,
        Some(value) => parse_date(&value, None)
            .map(|dt| dt.timestamp_millis())
            .ok_or_else(|| MappingError::InvalidField {
                field: TIMESTAMP_FIELD.to_string(),
                reason: format!("cannot parse {value} as a date"),
            })?,
    };

    doc.insert(ID_FIELD.to_string(), Value::String(id));
    doc.insert(TIMESTAMP_FIELD.to_string(), Value::from(timestamp));
    Ok(doc)
}

/// The `_id` of a prepared document.
pub fn doc_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// The `_timestamp` of a prepared document, in epoch milliseconds.
pub fn doc_timestamp(doc: &Document) -> Option<i64> {
    doc.get(TIMESTAMP_FIELD).and_then(Value::as_i64)
}

/// Shard that owns the document with `id`.
pub fn route(id: &str, number_of_shards: u32) -> u32 {
    crc32fast::hash(id.as_bytes()) % number_of_shards.max(1)
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

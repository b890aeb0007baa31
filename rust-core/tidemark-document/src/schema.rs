// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tantivy schema shared by every segment.
//
// Field       Options                 Content
// id          STRING | STORED         document `_id`, the upsert key
// timestamp   INDEXED | FAST | STORED `_timestamp` in epoch ms
// source      STORED                  the document as a JSON string
// body        JSON, TEXT              user fields, searchable as `body.<path>`

use serde_json::{json, Value as JsonValue};
use tantivy::schema::{Field, Schema, FAST, INDEXED, STORED, STRING, TEXT};
use tantivy::TantivyDocument;
use tidemark_core::{doc_timestamp, Document};

use crate::error::DocumentError;

pub const ID: &str = "id";
pub const TIMESTAMP: &str = "timestamp";
pub const SOURCE: &str = "source";
pub const BODY: &str = "body";

#[derive(Clone)]
pub struct SegmentSchema {
    pub id: Field,
    pub timestamp: Field,
    pub source: Field,
    pub body: Field,
    pub schema: Schema,
}

impl SegmentSchema {
    pub fn new() -> Self {
        let mut builder = Schema::builder();
        let id = builder.add_text_field(ID, STRING | STORED);
        let timestamp = builder.add_i64_field(TIMESTAMP, INDEXED | FAST | STORED);
        let source = builder.add_text_field(SOURCE, STORED);
        let body = builder.add_json_field(BODY, TEXT);
        let schema = builder.build();

        Self {
            id,
            timestamp,
            source,
            body,
            schema,
        }
    }

    /// Resolve the fields of a schema read back from disk.
    pub fn from_schema(schema: Schema) -> Result<Self, DocumentError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| DocumentError::SchemaError(format!("segment has no '{name}' field")))
        };
        Ok(Self {
            id: field(ID)?,
            timestamp: field(TIMESTAMP)?,
            source: field(SOURCE)?,
            body: field(BODY)?,
            schema,
        })
    }

    /// Build the Tantivy document for `doc` stored under `id`.
    pub fn to_tantivy(&self, id: &str, doc: &Document) -> Result<TantivyDocument, DocumentError> {
        let body: serde_json::Map<String, JsonValue> = doc
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let row = json!({
            ID: id,
            TIMESTAMP: doc_timestamp(doc).unwrap_or_default(),
            SOURCE: serde_json::to_string(doc)?,
            BODY: body,
        });
        Ok(TantivyDocument::parse_json(&self.schema, &row.to_string())?)
    }
}

impl Default for SegmentSchema {
    fn default() -> Self {
        Self::new()
    }
}

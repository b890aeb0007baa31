// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Read side of segment storage. Queries use Tantivy's query-string syntax;
// bare terms search every user field, `body.<path>:term` a single one, and
// `timestamp:[a TO b]` restricts the time range.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::Value;
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument};

use crate::error::DocumentError;
use crate::schema::SegmentSchema;

/// One matching document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub timestamp: i64,
    /// The document as stored, reserved fields included.
    pub source: serde_json::Value,
}

/// Searcher over one segment's committed documents.
pub struct SegmentSearcher {
    schema: SegmentSchema,
    index: Index,
    reader: IndexReader,
}

impl SegmentSearcher {
    pub fn open(dir: &Path) -> Result<Self, DocumentError> {
        let index = Index::open_in_dir(dir)?;
        let schema = SegmentSchema::from_schema(index.schema())?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok(Self {
            schema,
            index,
            reader,
        })
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Top `limit` hits for `query`, best first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, DocumentError> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.schema.body]);
        let parsed = parser.parse_query(query)?;
        let top_docs = searcher.search(&parsed, &TopDocs::with_limit(limit.max(1)))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let id = doc
                .get_first(self.schema.id)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let timestamp = doc
                .get_first(self.schema.timestamp)
                .and_then(|v| v.as_i64())
                .unwrap_or_default();
            let source = match doc.get_first(self.schema.source).and_then(|v| v.as_str()) {
                Some(raw) => serde_json::from_str(raw)?,
                None => serde_json::Value::Null,
            };
            hits.push(SearchHit {
                id,
                score,
                timestamp,
                source,
            });
        }
        Ok(hits)
    }

    /// `search` restricted to documents stamped within `[start, end]`.
    pub fn search_range(
        &self,
        query: &str,
        start: i64,
        end: i64,
        limit: usize,
    ) -> Result<Vec<SearchHit>, DocumentError> {
        self.search(&range_query(query, start, end), limit)
    }
}

fn range_query(query: &str, start: i64, end: i64) -> String {
    let range = format!("timestamp:[{start} TO {end}]");
    if query.trim().is_empty() {
        range
    } else {
        format!("({query}) AND {range}")
    }
}

/// Merge per-segment hits into the overall top `limit`.
pub fn merge_hits(hits: impl IntoIterator<Item = SearchHit>, limit: usize) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = hits.into_iter().collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    hits.truncate(limit);
    hits
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Ingestion front half.
//
// Prepares client documents, rejects mapping violations synchronously, routes
// each document to its shard and appends per-shard batches to the WAL. A
// successful return means the documents are durable, not yet searchable.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::catalog::IndexCatalog;
use crate::document::{doc_id, prepare_document, Document};
use crate::error::IndexResult;
use crate::producer::WalProducer;

/// Outcome of one ingest call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub index: String,
    /// Document ids, in input order.
    pub ids: Vec<String>,
    /// Number of shards the batch was spread over.
    pub shards: usize,
}

#[derive(Clone)]
pub struct Ingestor {
    catalog: Arc<IndexCatalog>,
    producer: WalProducer,
}

impl Ingestor {
    pub fn new(catalog: Arc<IndexCatalog>) -> Self {
        let producer = WalProducer::new(Arc::clone(catalog.registry()));
        Self { catalog, producer }
    }

    /// Durably accept `docs` into `index`.
    ///
    /// A preparation or mapping error rejects the whole call before anything
    /// is appended. Each shard batch is atomic on its own, so a WAL failure
    /// part way leaves the batches of earlier shards in place.
    pub async fn ingest(&self, index: &str, docs: Vec<Value>) -> IndexResult<IngestReport> {
        let index = self.catalog.get_index(index)?;
        let now_ms = Utc::now().timestamp_millis();

        let prepared = docs
            .into_iter()
            .map(|doc| prepare_document(doc, now_ms))
            .collect::<IndexResult<Vec<Document>>>()?;
        index.check_documents(&prepared)?;

        let mut ids = Vec::with_capacity(prepared.len());
        let mut by_shard: BTreeMap<u32, Vec<Document>> = BTreeMap::new();
        for doc in prepared {
            let id = doc_id(&doc).unwrap_or_default().to_string();
            let shard = index.shard_for(&id).id();
            ids.push(id);
            by_shard.entry(shard).or_default().push(doc);
        }

        for (shard_id, batch) in &by_shard {
            let shard = index.get_shard(*shard_id)?;
            self.producer.produce(&shard, batch).await?;
        }

        debug!(index = %index.name(), docs = ids.len(), shards = by_shard.len(), "ingested batch");
        Ok(IngestReport {
            index: index.name().to_string(),
            ids,
            shards: by_shard.len(),
        })
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// WAL producer: the durability boundary of ingestion.
//
// Documents are serialized to JSON and appended to their shard's log in one
// batch. Once `produce` returns, they will be replayed into storage even if
// the process crashes before they become searchable.

use std::sync::Arc;

use tidemark_wal::WalLog;
use tracing::debug;

use crate::document::Document;
use crate::error::IndexResult;
use crate::shard::Shard;
use crate::wal::WalRegistry;

#[derive(Clone)]
pub struct WalProducer {
    registry: Arc<WalRegistry>,
}

impl WalProducer {
    pub fn new(registry: Arc<WalRegistry>) -> Self {
        Self { registry }
    }

    /// Open (creating if absent) the shard's log.
    pub fn open_wal(&self, shard: &Shard) -> IndexResult<Arc<dyn WalLog>> {
        self.registry.open_or_get(&shard.name())
    }

    /// Append `docs` to the shard's log as one atomic batch. Returns the
    /// index of the last record written.
    pub async fn produce(&self, shard: &Shard, docs: &[Document]) -> IndexResult<u64> {
        let log = self.open_wal(shard)?;
        let records = docs
            .iter()
            .map(serde_json::to_vec)
            .collect::<Result<Vec<_>, _>>()?;
        let count = records.len();

        let last = tokio::task::spawn_blocking(move || log.batch_write(&records)).await??;
        debug!(shard = %shard.name(), docs = count, last_index = last, "appended batch to WAL");
        Ok(last)
    }
}

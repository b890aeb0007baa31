// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//! Shared wiring for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tidemark_core::{
    IndexCatalog, IndexSettings, Ingestor, MemoryWriterFactory, WalConsumer, WalRegistry,
};
use tidemark_mapping::{DynamicMode, Mappings};
use tidemark_storage::{InMemoryBackend, StorageBackend};
use tidemark_wal::LogOptions;

pub struct Harness {
    pub store: InMemoryBackend,
    pub registry: Arc<WalRegistry>,
    pub writers: MemoryWriterFactory,
    pub catalog: Arc<IndexCatalog>,
    pub ingestor: Ingestor,
    pub consumer: WalConsumer,
}

impl Harness {
    pub fn memory() -> Self {
        Self::build(
            Arc::new(WalRegistry::memory()),
            InMemoryBackend::new(),
            MemoryWriterFactory::new(),
            500,
        )
    }

    /// File-backed WALs under `dir` with a metadata store that outlives the
    /// harness.
    pub fn file(dir: &Path, store: InMemoryBackend) -> Self {
        Self::build(
            Arc::new(WalRegistry::file(dir, LogOptions::default())),
            store,
            MemoryWriterFactory::new(),
            500,
        )
    }

    pub fn build(
        registry: Arc<WalRegistry>,
        store: InMemoryBackend,
        writers: MemoryWriterFactory,
        mature_threshold: u64,
    ) -> Self {
        let backend: Arc<dyn StorageBackend> = Arc::new(store.clone());
        let catalog = Arc::new(IndexCatalog::new(
            backend,
            Arc::clone(&registry),
            Arc::new(writers.clone()),
            mature_threshold,
        ));
        Self {
            store,
            ingestor: Ingestor::new(Arc::clone(&catalog)),
            consumer: WalConsumer::new(Arc::clone(&catalog), 4),
            registry,
            writers,
            catalog,
        }
    }

    pub async fn create(&self, name: &str, shards: u32, mappings: Mappings) {
        self.catalog
            .create_index(name, IndexSettings::new(shards, 1), mappings)
            .await
            .unwrap();
    }

    pub async fn create_dynamic(&self, name: &str, shards: u32) {
        self.create(name, shards, Mappings::new(DynamicMode::Dynamic))
            .await;
    }
}

/// `count` documents `doc-<start>..` one second apart.
pub fn docs(start: usize, count: usize) -> Vec<Value> {
    (start..start + count)
        .map(|i| {
            json!({
                "_id": format!("doc-{i}"),
                "_timestamp": 1_700_000_000_000i64 + i as i64 * 1000,
                "message": format!("event {i}"),
            })
        })
        .collect()
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//! Acknowledged documents survive a restart with file-backed WALs.

mod common;

use std::collections::BTreeSet;

use common::{docs, Harness};
use tempfile::TempDir;
use tidemark_storage::InMemoryBackend;

#[tokio::test]
async fn unconsumed_entries_are_replayed_after_restart() {
    let dir = TempDir::new().unwrap();
    let store = InMemoryBackend::new();

    let acknowledged: BTreeSet<String> = {
        let h = Harness::file(dir.path(), store.clone());
        h.create_dynamic("events", 2).await;
        let first = h.ingestor.ingest("events", docs(0, 15)).await.unwrap();
        let second = h.ingestor.ingest("events", docs(15, 10)).await.unwrap();
        // Dropped without consuming or closing.
        first.ids.into_iter().chain(second.ids).collect()
    };

    let h = Harness::file(dir.path(), store.clone());
    assert_eq!(h.catalog.load_all().await.unwrap(), 1);
    assert_eq!(h.registry.len(), 2);

    let report = h.consumer.tick().await;
    assert_eq!(report.records, 25);
    assert_eq!(report.failed, 0);

    let stored: BTreeSet<String> = h.writers.index_documents("events").into_keys().collect();
    assert_eq!(stored, acknowledged);

    let index = h.catalog.get_index("events").unwrap();
    let total: u64 = index.shards().iter().map(|s| s.stat().doc_num).sum();
    assert_eq!(total, 25);
}

#[tokio::test]
async fn consumed_entries_are_not_replayed_again() {
    let dir = TempDir::new().unwrap();
    let store = InMemoryBackend::new();

    {
        let h = Harness::file(dir.path(), store.clone());
        h.create_dynamic("events", 1).await;
        h.ingestor.ingest("events", docs(0, 8)).await.unwrap();
        assert_eq!(h.consumer.tick().await.records, 8);
        h.ingestor.ingest("events", docs(8, 2)).await.unwrap();
    }

    let h = Harness::file(dir.path(), store.clone());
    h.catalog.load_all().await.unwrap();

    let shard = h.catalog.get_index("events").unwrap().get_shard(0).unwrap();
    assert_eq!(shard.stat().wal_index, 8);
    assert_eq!(shard.segments().len(), 1);

    assert_eq!(h.consumer.tick().await.records, 2);
    let stored = h.writers.index_documents("events");
    assert_eq!(stored.len(), 2);
    assert!(stored.contains_key("doc-8") && stored.contains_key("doc-9"));
    assert_eq!(shard.stat().doc_num, 10);
}

#[tokio::test]
async fn promoted_fields_survive_restart() {
    let dir = TempDir::new().unwrap();
    let store = InMemoryBackend::new();

    {
        let h = Harness::file(dir.path(), store.clone());
        h.create_dynamic("events", 1).await;
        h.ingestor.ingest("events", docs(0, 1)).await.unwrap();
        h.consumer.tick().await;
    }

    let h = Harness::file(dir.path(), store);
    h.catalog.load_all().await.unwrap();
    let mappings = h.catalog.get_index("events").unwrap().mappings();
    assert!(mappings.properties.contains_key("message"));
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// A running Tidemark node: the WAL registry, index catalog, ingest path and
// consumer wired together from one `TidemarkConfig`.

use std::sync::Arc;

use tidemark_storage::StorageBackend;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::catalog::IndexCatalog;
use crate::config::TidemarkConfig;
use crate::consumer::WalConsumer;
use crate::error::IndexResult;
use crate::ingest::Ingestor;
use crate::wal::WalRegistry;
use crate::writer::WriterFactory;

pub struct TidemarkNode {
    config: TidemarkConfig,
    catalog: Arc<IndexCatalog>,
    ingestor: Ingestor,
    consumer: WalConsumer,
}

impl TidemarkNode {
    /// Open a node over file-backed WALs under `config.wal_dir()`, restoring
    /// every index already in `store`.
    pub async fn open(
        config: TidemarkConfig,
        store: Arc<dyn StorageBackend>,
        writers: Arc<dyn WriterFactory>,
    ) -> IndexResult<Self> {
        let registry = Arc::new(WalRegistry::file(config.wal_dir(), config.log_options()));
        Self::with_registry(config, registry, store, writers).await
    }

    pub async fn with_registry(
        config: TidemarkConfig,
        registry: Arc<WalRegistry>,
        store: Arc<dyn StorageBackend>,
        writers: Arc<dyn WriterFactory>,
    ) -> IndexResult<Self> {
        let catalog = Arc::new(IndexCatalog::new(
            store,
            registry,
            writers,
            config.segment.mature_threshold,
        ));
        let loaded = catalog.load_all().await?;
        info!(
            data_dir = %config.data_dir.display(),
            indexes = loaded,
            "tidemark node opened"
        );

        let ingestor = Ingestor::new(Arc::clone(&catalog));
        let consumer = WalConsumer::new(Arc::clone(&catalog), config.wal.parallel);
        Ok(Self {
            config,
            catalog,
            ingestor,
            consumer,
        })
    }

    pub fn config(&self) -> &TidemarkConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<IndexCatalog> {
        &self.catalog
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn consumer(&self) -> &WalConsumer {
        &self.consumer
    }

    /// Start the consumer loop on the runtime. Flip the returned sender to
    /// `true` to stop it.
    pub fn spawn_consumer(&self) -> (watch::Sender<bool>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(false);
        let consumer = self.consumer.clone();
        let handle = tokio::spawn(async move { consumer.run(rx).await });
        (tx, handle)
    }

    /// Consume until every shard WAL is empty or a tick stops making
    /// progress. Returns the number of records replayed.
    pub async fn drain(&self) -> u64 {
        let mut total = 0;
        loop {
            let report = self.consumer.tick().await;
            total += report.records;
            if report.records == 0 {
                if report.failed > 0 {
                    warn!(failed = report.failed, "drain stopped with failing shards");
                }
                return total;
            }
        }
    }

    /// Replay what is pending, then close every segment writer and WAL.
    pub async fn shutdown(self) -> IndexResult<()> {
        let replayed = self.drain().await;
        for index in self.catalog.list_indexes() {
            for shard in index.shards() {
                for segment in shard.segments() {
                    if let Err(e) = segment.close_writer().await {
                        warn!(segment = %segment.key(), error = %e, "failed to close segment writer");
                    }
                }
            }
        }
        self.catalog.registry().close_all()?;
        info!(replayed, "tidemark node shut down");
        Ok(())
    }
}

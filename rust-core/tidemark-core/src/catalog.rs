// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Index catalog.
//
// Owns the live indexes and their persisted definitions. Each index is one
// JSON record in the metadata store under `index:<name>`, rewritten after
// every successful replay so shard cursors and promoted fields survive a
// restart.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tidemark_mapping::Mappings;
use tidemark_storage::{StorageBackend, TypedStore};
use tracing::{info, warn};

use crate::error::{IndexError, IndexResult};
use crate::index::{Index, IndexMeta, IndexSettings};
use crate::wal::WalRegistry;
use crate::writer::WriterFactory;

const INDEX_NAMESPACE: &str = "index";

pub struct IndexCatalog {
    store: TypedStore<Arc<dyn StorageBackend>>,
    registry: Arc<WalRegistry>,
    writers: Arc<dyn WriterFactory>,
    mature_threshold: u64,
    indexes: RwLock<BTreeMap<String, Arc<Index>>>,
}

impl IndexCatalog {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        registry: Arc<WalRegistry>,
        writers: Arc<dyn WriterFactory>,
        mature_threshold: u64,
    ) -> Self {
        Self {
            store: TypedStore::new(store, INDEX_NAMESPACE),
            registry,
            writers,
            mature_threshold,
            indexes: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<WalRegistry> {
        &self.registry
    }

    pub fn writers(&self) -> &Arc<dyn WriterFactory> {
        &self.writers
    }

    /// Restore every persisted index and reopen its shard logs, so entries
    /// left unconsumed by a previous run are replayed. Returns the number
    /// of indexes loaded.
    pub async fn load_all(&self) -> IndexResult<usize> {
        let metas: Vec<(String, IndexMeta)> = self.store.scan_all().await?;
        let count = metas.len();

        for (_, meta) in metas {
            let index = Arc::new(Index::from_meta(meta, self.mature_threshold)?);
            for shard in index.shards() {
                self.registry.open_or_get(&shard.name())?;
            }
            info!(
                index = %index.name(),
                shards = index.shards().len(),
                "loaded index"
            );
            self.indexes
                .write()
                .insert(index.name().to_string(), index);
        }
        Ok(count)
    }

    /// Create, persist and open a new index.
    pub async fn create_index(
        &self,
        name: &str,
        settings: IndexSettings,
        mappings: Mappings,
    ) -> IndexResult<Arc<Index>> {
        validate_index_name(name)?;
        let index = Arc::new(Index::new(name, settings, mappings, self.mature_threshold)?);

        {
            let mut indexes = self.indexes.write();
            if indexes.contains_key(name) {
                return Err(IndexError::IndexExists(name.to_string()));
            }
            indexes.insert(name.to_string(), Arc::clone(&index));
        }

        if let Err(e) = self.open_new(&index).await {
            self.indexes.write().remove(name);
            return Err(e);
        }

        info!(
            index = %name,
            shards = settings.number_of_shards,
            replicas = settings.number_of_replicas,
            "created index"
        );
        Ok(index)
    }

    async fn open_new(&self, index: &Index) -> IndexResult<()> {
        self.store.put(index.name(), &index.meta()).await?;
        for shard in index.shards() {
            self.registry.open_or_get(&shard.name())?;
        }
        Ok(())
    }

    pub fn get_index(&self, name: &str) -> IndexResult<Arc<Index>> {
        self.indexes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))
    }

    pub fn list_indexes(&self) -> Vec<Arc<Index>> {
        self.indexes.read().values().cloned().collect()
    }

    /// Write the index's current definition and stats to the metadata
    /// store. Fails with `IndexNotFound` once the index has been dropped.
    pub async fn persist(&self, index: &Index) -> IndexResult<()> {
        let registered = self
            .indexes
            .read()
            .get(index.name())
            .is_some_and(|live| std::ptr::eq(live.as_ref(), index));
        if !registered {
            return Err(IndexError::IndexNotFound(index.name().to_string()));
        }
        self.store.put(index.name(), &index.meta()).await?;
        Ok(())
    }

    /// Drop an index with all its metadata, WALs and segment data.
    ///
    /// Waits for in-flight replays of its shards to finish first.
    pub async fn delete_index(&self, name: &str) -> IndexResult<()> {
        let index = self
            .indexes
            .write()
            .remove(name)
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))?;

        let mut permits = Vec::with_capacity(index.shards().len());
        for shard in index.shards() {
            permits.push(shard.begin_replay().await);
        }

        self.store.delete(name).await?;
        self.registry.remove_index(name)?;
        for shard in index.shards() {
            for segment in shard.segments() {
                if let Err(e) = segment.close_writer().await {
                    warn!(segment = %segment.key(), error = %e, "failed to close segment writer");
                }
            }
        }
        self.writers.remove_index(name).await?;
        drop(permits);

        info!(index = %name, "deleted index");
        Ok(())
    }
}

/// Index names are non-empty, contain no `/` and do not start with `_`.
pub fn validate_index_name(name: &str) -> IndexResult<()> {
    let reason = if name.is_empty() {
        "name must not be empty"
    } else if name.contains('/') {
        "name must not contain '/'"
    } else if name.starts_with('_') {
        "name must not start with '_'"
    } else {
        return Ok(());
    };
    Err(IndexError::InvalidSettings(format!(
        "invalid index name '{name}': {reason}"
    )))
}

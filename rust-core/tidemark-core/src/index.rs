// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Indexes: named sets of shards sharing one schema.
//
// The mappings sit behind a reader/writer lock. Resolution of a batch runs
// under the read lock; when it would promote fields, it is redone under the
// write lock before merging, so two shards replaying concurrently can never
// promote the same field to different types.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tidemark_mapping::{Mappings, Promotions};
use tracing::info;

use crate::document::{route, Document};
use crate::error::{IndexError, IndexResult};
use crate::segment::Segment;
use crate::shard::{Shard, ShardMeta};

/// Shard layout fixed at index creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Number of primary shards; documents are routed by `crc32(_id)`.
    pub number_of_shards: u32,
    /// Accepted and persisted for compatibility; replicas are not built.
    pub number_of_replicas: u32,
}

impl IndexSettings {
    /// Settings with the given shard and replica counts.
    pub fn new(number_of_shards: u32, number_of_replicas: u32) -> Self {
        Self {
            number_of_shards,
            number_of_replicas,
        }
    }

    /// Reject an index without shards.
    pub fn validate(&self) -> IndexResult<()> {
        if self.number_of_shards == 0 {
            return Err(IndexError::InvalidSettings(
                "number_of_shards must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Persisted form of an index, stored as JSON in the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Index name, also the metadata key.
    pub name: String,
    /// Shard layout.
    pub settings: IndexSettings,
    /// Mappings including every promoted field.
    pub mappings: Mappings,
    /// One entry per shard, ordered by id.
    pub shards: Vec<ShardMeta>,
}

/// A live index: its shards and the mutable mappings shared by all of
/// them.
pub struct Index {
    name: String,
    settings: IndexSettings,
    mappings: RwLock<Mappings>,
    shards: Vec<Arc<Shard>>,
}

impl Index {
    /// Build a new index with one empty shard per `number_of_shards`.
    pub fn new(
        name: &str,
        settings: IndexSettings,
        mappings: Mappings,
        mature_threshold: u64,
    ) -> IndexResult<Self> {
        settings.validate()?;
        mappings.validate()?;
        let shards = (0..settings.number_of_shards)
            .map(|id| Arc::new(Shard::new(name, id, mature_threshold)))
            .collect();
        Ok(Self {
            name: name.to_string(),
            settings,
            mappings: RwLock::new(mappings),
            shards,
        })
    }

    /// Rebuild an index from its persisted form. Fails with
    /// `NoSegmentFound` if a shard counts documents but lists no segment.
    pub fn from_meta(meta: IndexMeta, mature_threshold: u64) -> IndexResult<Self> {
        meta.settings.validate()?;
        let mut shards: Vec<Arc<Shard>> = meta
            .shards
            .iter()
            .map(|s| Arc::new(Shard::from_meta(&meta.name, s, mature_threshold)))
            .collect();
        shards.sort_by_key(|s| s.id());

        let dense = shards.iter().enumerate().all(|(i, s)| s.id() == i as u32);
        if shards.len() != meta.settings.number_of_shards as usize || !dense {
            return Err(IndexError::InvalidSettings(format!(
                "index '{}' metadata lists shards {:?}, expected 0..{}",
                meta.name,
                shards.iter().map(|s| s.id()).collect::<Vec<_>>(),
                meta.settings.number_of_shards
            )));
        }

        // Documents were counted, so their segments must have been listed.
        if let Some(shard) = shards
            .iter()
            .find(|s| s.stat().doc_num > 0 && s.latest_segment().is_none())
        {
            return Err(IndexError::NoSegmentFound(shard.name()));
        }

        Ok(Self {
            name: meta.name,
            settings: meta.settings,
            mappings: RwLock::new(meta.mappings),
            shards,
        })
    }

    /// Name of the index.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Settings the index was created with.
    pub fn settings(&self) -> IndexSettings {
        self.settings
    }

    /// Snapshot of the current mappings.
    pub fn mappings(&self) -> Mappings {
        self.mappings.read().clone()
    }

    /// Every shard, ordered by id.
    pub fn shards(&self) -> &[Arc<Shard>] {
        &self.shards
    }

    /// Shard `id`, or `ShardNotFound`.
    pub fn get_shard(&self, id: u32) -> IndexResult<Arc<Shard>> {
        self.shards
            .get(id as usize)
            .cloned()
            .ok_or_else(|| IndexError::ShardNotFound {
                index: self.name.clone(),
                shard: id,
            })
    }

    /// Shard owning the document with `id`.
    pub fn shard_for(&self, id: &str) -> Arc<Shard> {
        let shard = route(id, self.settings.number_of_shards) as usize;
        Arc::clone(&self.shards[shard])
    }

    /// Check documents against the mappings without promoting anything.
    pub fn check_documents(&self, docs: &[Document]) -> IndexResult<()> {
        self.mappings.read().resolve_batch(docs)?;
        Ok(())
    }

    /// Resolve a batch and merge its promotions. Returns the promoted
    /// field names. Nothing is merged if any document is invalid.
    pub fn resolve_batch(&self, docs: &[Document]) -> IndexResult<Vec<String>> {
        let promotions = self.mappings.read().resolve_batch(docs)?;
        if promotions.is_empty() {
            return Ok(Vec::new());
        }

        let mut mappings = self.mappings.write();
        let promotions: Promotions = mappings.resolve_batch(docs)?;
        let added = mappings.merge(promotions);
        if !added.is_empty() {
            info!(index = %self.name, fields = ?added, "promoted dynamic fields");
        }
        Ok(added)
    }

    /// Segments of every shard that may hold documents in `[start, end]`.
    pub fn segments_by_time(&self, start: i64, end: i64) -> Vec<Arc<Segment>> {
        self.shards
            .iter()
            .flat_map(|shard| shard.segments_by_time(start, end))
            .collect()
    }

    /// Snapshot of the persisted form.
    pub fn meta(&self) -> IndexMeta {
        IndexMeta {
            name: self.name.clone(),
            settings: self.settings,
            mappings: self.mappings(),
            shards: self.shards.iter().map(|s| s.meta()).collect(),
        }
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("shards", &self.shards)
            .finish()
    }
}

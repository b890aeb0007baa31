// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Shards: logical partitions of an index.
//
// A shard owns an append-only list of segments (ids dense from 0, the last
// one is the write target), its aggregate stats, and the WAL replay cursor
// `wal_index`.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::segment::{Segment, SegmentMeta, SegmentStat};

/// Aggregate shard statistics plus the replay cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStat {
    /// Earliest `_timestamp` stored, epoch ms.
    pub min_time: i64,
    /// Latest `_timestamp` stored, epoch ms.
    pub max_time: i64,
    /// Documents written across all segments.
    pub doc_num: u64,
    /// Last WAL index fully persisted into storage.
    pub wal_index: u64,
}

/// Persisted form of a shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMeta {
    pub id: u32,
    pub stat: ShardStat,
    /// Oldest first; the last one is the active segment.
    pub segments: Vec<SegmentMeta>,
}

/// One partition of an index: an append-only list of segments, of which
/// only the latest accepts writes.
pub struct Shard {
    index: String,
    id: u32,
    mature_threshold: u64,
    segments: RwLock<Vec<Arc<Segment>>>,
    stat: RwLock<ShardStat>,
    replay: Mutex<()>,
}

impl Shard {
    /// An empty shard with its first segment.
    pub fn new(index: &str, id: u32, mature_threshold: u64) -> Self {
        Self {
            index: index.to_string(),
            id,
            mature_threshold,
            segments: RwLock::new(Vec::new()),
            stat: RwLock::new(ShardStat::default()),
            replay: Mutex::new(()),
        }
    }

    /// Rebuild a shard from its persisted form.
    pub fn from_meta(index: &str, meta: &ShardMeta, mature_threshold: u64) -> Self {
        let mut segments: Vec<_> = meta
            .segments
            .iter()
            .map(|s| Arc::new(Segment::with_stat(index, meta.id, s.id, s.stat)))
            .collect();
        segments.sort_by_key(|s| s.id());

        let shard = Self::new(index, meta.id, mature_threshold);
        *shard.segments.write() = segments;
        *shard.stat.write() = meta.stat;
        shard
    }

    /// Shard id within the index.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Name of the owning index.
    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// `"<index>/<shard id>"`, also the key of the shard's WAL.
    pub fn name(&self) -> String {
        shard_name(&self.index, self.id)
    }

    /// Snapshot of the shard statistics and replay cursor.
    pub fn stat(&self) -> ShardStat {
        *self.stat.read()
    }

    /// Document count past which a segment is rotated out.
    pub fn mature_threshold(&self) -> u64 {
        self.mature_threshold
    }

    /// Every segment, oldest first.
    pub fn segments(&self) -> Vec<Arc<Segment>> {
        self.segments.read().clone()
    }

    /// The segment currently accepting writes.
    pub fn latest_segment(&self) -> Option<Arc<Segment>> {
        self.segments.read().last().cloned()
    }

    /// Return the active segment, rotating in a new one when the shard has
    /// none or the latest is mature.
    ///
    /// The common case only takes the read lock. Rotation re-checks under
    /// the write lock, so concurrent callers create at most one segment per
    /// maturity event.
    pub fn check_segments(&self) -> Arc<Segment> {
        if let Some(segment) = self.latest_segment() {
            if !segment.is_mature(self.mature_threshold) {
                return segment;
            }
        }

        let mut segments = self.segments.write();
        if let Some(segment) = segments.last() {
            if !segment.is_mature(self.mature_threshold) {
                return Arc::clone(segment);
            }
        }

        let id = segments.len() as u32;
        let segment = Arc::new(Segment::new(&self.index, self.id, id));
        segments.push(Arc::clone(&segment));
        info!(shard = %self.name(), segment = id, "rotated to new segment");
        segment
    }

    /// Account a persisted batch on `segment` and advance the replay cursor
    /// to `wal_index`.
    pub(crate) fn record_persist(
        &self,
        segment: &Segment,
        docs: u64,
        min_time: i64,
        max_time: i64,
        wal_index: u64,
    ) {
        segment.record_batch(docs, min_time, max_time);

        let mut stat = self.stat.write();
        if docs > 0 {
            if stat.doc_num == 0 {
                stat.min_time = min_time;
                stat.max_time = max_time;
            } else {
                stat.min_time = stat.min_time.min(min_time);
                stat.max_time = stat.max_time.max(max_time);
            }
            stat.doc_num += docs;
        }
        stat.wal_index = stat.wal_index.max(wal_index);
    }

    /// Segments that may hold documents in `[start, end]`.
    pub fn segments_by_time(&self, start: i64, end: i64) -> Vec<Arc<Segment>> {
        self.segments
            .read()
            .iter()
            .filter(|s| s.overlaps(start, end))
            .cloned()
            .collect()
    }

    /// Exclusive replay permit, or `None` if a replay is already running.
    pub fn try_begin_replay(&self) -> Option<MutexGuard<'_, ()>> {
        self.replay.try_lock().ok()
    }

    /// Wait until no replay is running and hold further replays off.
    pub async fn begin_replay(&self) -> MutexGuard<'_, ()> {
        self.replay.lock().await
    }

    /// Snapshot of the persisted form.
    pub fn meta(&self) -> ShardMeta {
        ShardMeta {
            id: self.id,
            stat: self.stat(),
            segments: self.segments.read().iter().map(|s| s.meta()).collect(),
        }
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("name", &self.name())
            .field("stat", &self.stat())
            .field("segments", &self.segments.read().len())
            .finish()
    }
}

/// `"<index>/<shard>"`.
pub fn shard_name(index: &str, shard: u32) -> String {
    format!("{index}/{shard}")
}

/// Split a shard name back into index name and shard id.
pub fn parse_shard_name(name: &str) -> Option<(&str, u32)> {
    let (index, shard) = name.rsplit_once('/')?;
    Some((index, shard.parse().ok()?))
}

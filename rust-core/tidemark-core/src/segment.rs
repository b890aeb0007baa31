// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Segments: the physical, independently written slices of a shard.
//
// A segment counts its documents and tracks their time range. Past the
// maturity threshold it stops receiving writes and the shard rotates to a
// new one. Its storage writer is opened on first use and cached.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::writer::{SegmentKey, SegmentWriter, WriterError, WriterFactory};

/// Document count and time range (epoch ms) of a segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentStat {
    /// Earliest `_timestamp` written.
    pub min_time: i64,
    /// Latest `_timestamp` written.
    pub max_time: i64,
    /// Documents written, counting a replayed duplicate again.
    pub doc_num: u64,
}

impl SegmentStat {
    /// Fold in a batch of `docs` documents spanning `[min_time, max_time]`.
    pub fn observe(&mut self, docs: u64, min_time: i64, max_time: i64) {
        if docs == 0 {
            return;
        }
        if self.doc_num == 0 {
            self.min_time = min_time;
            self.max_time = max_time;
        } else {
            self.min_time = self.min_time.min(min_time);
            self.max_time = self.max_time.max(max_time);
        }
        self.doc_num += docs;
    }

    /// Whether any document may fall in `[start, end]`.
    /// Whether the segment may hold documents in `[start, end]`.
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.doc_num > 0 && self.min_time <= end && self.max_time >= start
    }
}

/// Persisted form of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: u32,
    pub stat: SegmentStat,
}

/// A physical slice of a shard, written through its own storage writer.
pub struct Segment {
    key: SegmentKey,
    stat: RwLock<SegmentStat>,
    writer: OnceCell<Arc<dyn SegmentWriter>>,
}

impl Segment {
    /// An empty segment.
    pub fn new(index: &str, shard: u32, id: u32) -> Self {
        Self::with_stat(index, shard, id, SegmentStat::default())
    }

    /// A segment restored with persisted statistics.
    pub fn with_stat(index: &str, shard: u32, id: u32, stat: SegmentStat) -> Self {
        Self {
            key: SegmentKey {
                index: index.to_string(),
                shard,
                segment: id,
            },
            stat: RwLock::new(stat),
            writer: OnceCell::new(),
        }
    }

    /// Segment id within the shard.
    pub fn id(&self) -> u32 {
        self.key.segment
    }

    /// Index, shard and segment ids used to open its writer.
    pub fn key(&self) -> &SegmentKey {
        &self.key
    }

    /// Snapshot of the document count and time range.
    pub fn stat(&self) -> SegmentStat {
        *self.stat.read()
    }

    /// Mature once it holds more than `threshold` documents.
    pub fn is_mature(&self, threshold: u64) -> bool {
        self.stat.read().doc_num > threshold
    }

    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.stat.read().overlaps(start, end)
    }

    pub(crate) fn record_batch(&self, docs: u64, min_time: i64, max_time: i64) {
        self.stat.write().observe(docs, min_time, max_time);
    }

    /// The cached writer, opened through `factory` on first call.
    pub async fn writer(
        &self,
        factory: &dyn WriterFactory,
    ) -> Result<Arc<dyn SegmentWriter>, WriterError> {
        self.writer
            .get_or_try_init(|| factory.open(&self.key))
            .await
            .cloned()
    }

    /// Close the writer if one was opened.
    pub async fn close_writer(&self) -> Result<(), WriterError> {
        match self.writer.get() {
            Some(writer) => writer.close().await,
            None => Ok(()),
        }
    }

    /// Snapshot of the persisted form.
    pub fn meta(&self) -> SegmentMeta {
        SegmentMeta {
            id: self.id(),
            stat: self.stat(),
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("key", &self.key)
            .field("stat", &self.stat())
            .field("writer_open", &self.writer.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MemoryWriterFactory;

    #[test]
    fn test_stat_tracks_time_range() {
        let mut stat = SegmentStat::default();
        stat.observe(0, 5, 5);
        assert_eq!(stat, SegmentStat::default());

        stat.observe(2, 100, 200);
        stat.observe(1, 50, 150);
        assert_eq!(
            stat,
            SegmentStat {
                min_time: 50,
                max_time: 200,
                doc_num: 3
            }
        );
        assert!(stat.overlaps(0, 50));
        assert!(stat.overlaps(180, 1_000));
        assert!(!stat.overlaps(201, 300));
        assert!(!SegmentStat::default().overlaps(i64::MIN, i64::MAX));
    }

    #[test]
    fn test_maturity_is_strictly_greater() {
        let segment = Segment::new("logs", 0, 0);
        segment.record_batch(500, 1, 1);
        assert!(!segment.is_mature(500));
        segment.record_batch(1, 1, 1);
        assert!(segment.is_mature(500));
    }

    #[tokio::test]
    async fn test_writer_is_opened_once() {
        let factory = MemoryWriterFactory::new();
        let segment = Segment::new("logs", 2, 3);

        let a = segment.writer(&factory).await.unwrap();
        let b = segment.writer(&factory).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.segment_keys(), vec![segment.key().clone()]);

        segment.close_writer().await.unwrap();
    }
}

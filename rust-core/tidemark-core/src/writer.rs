// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Storage writer contract.
//
// Each physical segment is written through its own `SegmentWriter`, opened
// lazily from a `WriterFactory`. Writers must treat a batch as an upsert by
// document id: WAL replay after a crash may deliver the same documents
// again.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::document::Document;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("segment writer for {0} is closed")]
    Closed(SegmentKey),

    #[error("storage engine error: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Address of one physical segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey {
    pub index: String,
    pub shard: u32,
    pub segment: u32,
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.index, self.shard, self.segment)
    }
}

/// Writes batches of documents into one physical segment.
#[async_trait]
pub trait SegmentWriter: Send + Sync {
    /// Upsert `docs`, keyed by `_id`. Durable once this returns.
    async fn batch(&self, docs: BTreeMap<String, Document>) -> Result<(), WriterError>;

    /// Release the writer. Later batches fail.
    async fn close(&self) -> Result<(), WriterError>;
}

/// Opens segment writers and drops whole indexes from storage.
#[async_trait]
pub trait WriterFactory: Send + Sync {
    async fn open(&self, key: &SegmentKey) -> Result<Arc<dyn SegmentWriter>, WriterError>;

    /// Delete every segment of `index`.
    async fn remove_index(&self, index: &str) -> Result<(), WriterError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

type ShardKey = (String, u32);

#[derive(Default)]
struct MemoryShared {
    segments: Mutex<BTreeMap<SegmentKey, BTreeMap<String, Document>>>,
    /// Batches currently executing, and the highest count observed, per shard.
    active: Mutex<HashMap<ShardKey, (usize, usize)>>,
    batch_calls: Mutex<HashMap<ShardKey, usize>>,
    failing: AtomicBool,
    batch_delay: Mutex<Option<Duration>>,
}

/// Writer factory keeping every segment in memory.
///
/// Also records how many batches ran concurrently against each shard and
/// can be switched into a failing mode, which makes it the test double for
/// the consumer.
#[derive(Clone, Default)]
pub struct MemoryWriterFactory {
    shared: Arc<MemoryShared>,
}

impl MemoryWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every batch call.
    pub fn with_batch_delay(self, delay: Duration) -> Self {
        *self.shared.batch_delay.lock() = Some(delay);
        self
    }

    /// Make every subsequent batch fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.shared.failing.store(failing, Ordering::SeqCst);
    }

    pub fn documents(&self, key: &SegmentKey) -> BTreeMap<String, Document> {
        self.shared
            .segments
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Documents stored across every segment of `index`, by id.
    pub fn index_documents(&self, index: &str) -> BTreeMap<String, Document> {
        self.shared
            .segments
            .lock()
            .iter()
            .filter(|(key, _)| key.index == index)
            .flat_map(|(_, docs)| docs.clone())
            .collect()
    }

    /// Keys of every segment a writer was opened for.
    pub fn segment_keys(&self) -> Vec<SegmentKey> {
        self.shared.segments.lock().keys().cloned().collect()
    }

    /// Highest number of batches that ran at once against one shard.
    pub fn max_concurrent_batches(&self, index: &str, shard: u32) -> usize {
        self.shared
            .active
            .lock()
            .get(&(index.to_string(), shard))
            .map_or(0, |(_, max)| *max)
    }

    pub fn batch_calls(&self, index: &str, shard: u32) -> usize {
        self.shared
            .batch_calls
            .lock()
            .get(&(index.to_string(), shard))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl WriterFactory for MemoryWriterFactory {
    async fn open(&self, key: &SegmentKey) -> Result<Arc<dyn SegmentWriter>, WriterError> {
        self.shared.segments.lock().entry(key.clone()).or_default();
        Ok(Arc::new(MemorySegmentWriter {
            key: key.clone(),
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }

    async fn remove_index(&self, index: &str) -> Result<(), WriterError> {
        self.shared
            .segments
            .lock()
            .retain(|key, _| key.index != index);
        Ok(())
    }
}

struct MemorySegmentWriter {
    key: SegmentKey,
    shared: Arc<MemoryShared>,
    closed: AtomicBool,
}

impl MemorySegmentWriter {
    fn shard_key(&self) -> ShardKey {
        (self.key.index.clone(), self.key.shard)
    }
}

#[async_trait]
impl SegmentWriter for MemorySegmentWriter {
    async fn batch(&self, docs: BTreeMap<String, Document>) -> Result<(), WriterError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WriterError::Closed(self.key.clone()));
        }

        let shard = self.shard_key();
        *self.shared.batch_calls.lock().entry(shard.clone()).or_default() += 1;
        {
            let mut active = self.shared.active.lock();
            let entry = active.entry(shard.clone()).or_default();
            entry.0 += 1;
            entry.1 = entry.1.max(entry.0);
        }

        let delay = *self.shared.batch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.shared.failing.load(Ordering::SeqCst) {
            Err(WriterError::Engine("injected failure".to_string()))
        } else {
            self.shared
                .segments
                .lock()
                .entry(self.key.clone())
                .or_default()
                .extend(docs);
            Ok(())
        };

        if let Some(entry) = self.shared.active.lock().get_mut(&shard) {
            entry.0 -= 1;
        }
        result
    }

    async fn close(&self) -> Result<(), WriterError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

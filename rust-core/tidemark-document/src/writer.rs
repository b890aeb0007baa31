// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tantivy segment writers.
//
// Every segment is its own Tantivy index at `<root>/<index>/<shard>/<segment>`.
// A batch is applied as delete-by-id plus add for each document, then
// committed, so replaying a window that was already stored leaves one copy
// of each document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tantivy::directory::MmapDirectory;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Term};
use tidemark_core::{Document, SegmentKey, SegmentWriter, WriterError, WriterFactory};
use tracing::{debug, info};

use crate::error::DocumentError;
use crate::schema::SegmentSchema;
use crate::searcher::SegmentSearcher;

/// Smallest heap Tantivy accepts for one indexing thread.
pub const DEFAULT_WRITER_HEAP: usize = 15_000_000;

/// Opens one Tantivy index per segment under a root directory.
#[derive(Debug, Clone)]
pub struct TantivyWriterFactory {
    root: PathBuf,
}

impl TantivyWriterFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the data of `key`.
    pub fn segment_dir(&self, key: &SegmentKey) -> PathBuf {
        self.root
            .join(&key.index)
            .join(key.shard.to_string())
            .join(key.segment.to_string())
    }

    /// Open a searcher over a segment, or `None` if nothing was ever
    /// written to it.
    pub fn searcher(&self, key: &SegmentKey) -> Result<Option<SegmentSearcher>, DocumentError> {
        let dir = self.segment_dir(key);
        if !dir.join("meta.json").exists() {
            return Ok(None);
        }
        SegmentSearcher::open(&dir).map(Some)
    }
}

#[async_trait]
impl WriterFactory for TantivyWriterFactory {
    async fn open(&self, key: &SegmentKey) -> Result<Arc<dyn SegmentWriter>, WriterError> {
        let dir = self.segment_dir(key);
        let key = key.clone();
        let writer = tokio::task::spawn_blocking(move || {
            TantivySegmentWriter::open(&dir, key, DEFAULT_WRITER_HEAP)
        })
        .await
        .map_err(|e| WriterError::Engine(e.to_string()))??;
        Ok(Arc::new(writer))
    }

    async fn remove_index(&self, index: &str) -> Result<(), WriterError> {
        let dir = self.root.join(index);
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
            info!(index = %index, dir = %dir.display(), "removed segment data");
        }
        Ok(())
    }
}

struct WriterInner {
    key: SegmentKey,
    schema: SegmentSchema,
    writer: Mutex<Option<IndexWriter>>,
    reader: IndexReader,
}

/// Writer over one segment's Tantivy index.
pub struct TantivySegmentWriter {
    inner: Arc<WriterInner>,
}

impl TantivySegmentWriter {
    /// Open or create the segment index in `dir`.
    pub fn open(dir: &Path, key: SegmentKey, heap_size: usize) -> Result<Self, DocumentError> {
        let schema = SegmentSchema::new();
        std::fs::create_dir_all(dir)?;
        let directory = MmapDirectory::open(dir)?;
        let index = Index::open_or_create(directory, schema.schema.clone())?;
        let writer = index.writer_with_num_threads(1, heap_size)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        debug!(segment = %key, dir = %dir.display(), "opened segment writer");
        Ok(Self {
            inner: Arc::new(WriterInner {
                key,
                schema,
                writer: Mutex::new(Some(writer)),
                reader,
            }),
        })
    }

    /// Documents visible since the last commit.
    pub fn num_docs(&self) -> u64 {
        self.inner.reader.searcher().num_docs()
    }
}

impl WriterInner {
    fn write_batch(&self, docs: BTreeMap<String, Document>) -> Result<(), DocumentError> {
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| DocumentError::Closed(self.key.to_string()))?;

        for (id, doc) in &docs {
            let row = self.schema.to_tantivy(id, doc)?;
            writer.delete_term(Term::from_field_text(self.schema.id, id));
            writer.add_document(row)?;
        }
        writer.commit()?;
        drop(guard);

        self.reader.reload()?;
        debug!(segment = %self.key, docs = docs.len(), "committed segment batch");
        Ok(())
    }

    fn close(&self) -> Result<(), DocumentError> {
        if let Some(writer) = self.writer.lock().take() {
            writer.wait_merging_threads()?;
            debug!(segment = %self.key, "closed segment writer");
        }
        Ok(())
    }
}

#[async_trait]
impl SegmentWriter for TantivySegmentWriter {
    async fn batch(&self, docs: BTreeMap<String, Document>) -> Result<(), WriterError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.write_batch(docs))
            .await
            .map_err(|e| WriterError::Engine(e.to_string()))??;
        Ok(())
    }

    async fn close(&self) -> Result<(), WriterError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.close())
            .await
            .map_err(|e| WriterError::Engine(e.to_string()))??;
        Ok(())
    }
}

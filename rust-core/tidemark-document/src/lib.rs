// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//! Tidemark segment storage
//!
//! Full-text segment storage via Tantivy. Each segment of each shard is a
//! separate Tantivy index, written by the WAL consumer through
//! [`TantivyWriterFactory`] and read back with [`SegmentSearcher`].

pub mod error;
pub mod schema;
pub mod searcher;
pub mod writer;

pub use error::DocumentError;
pub use schema::SegmentSchema;
pub use searcher::{merge_hits, SearchHit, SegmentSearcher};
pub use writer::{TantivySegmentWriter, TantivyWriterFactory, DEFAULT_WRITER_HEAP};

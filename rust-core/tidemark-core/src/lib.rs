// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tidemark Core
//
// The durable ingestion path of a time-aware document store.
//
// ```text
//   ingest ──► Ingestor ──► WalProducer ──► shard WAL (acknowledged)
//                                              │
//                         WalConsumer (every second, bounded workers)
//                                              │
//            mappings resolved ◄───────────────┤
//            active segment written ◄──────────┤  rotate when mature
//            index metadata persisted ◄────────┤
//            WAL truncated ◄───────────────────┘
// ```
//
// An index is split into a fixed number of shards by a hash of the document
// id. Every shard owns one WAL and an ordered list of segments; the last
// segment receives writes until it holds more than the configured number of
// documents, at which point a new one is started. Segment and shard stats
// track the time range and document count so queries can skip segments
// outside a time window.

pub mod catalog;
pub mod config;
pub mod consumer;
pub mod document;
pub mod error;
pub mod index;
pub mod ingest;
pub mod node;
pub mod producer;
pub mod segment;
pub mod shard;
pub mod wal;
pub mod writer;

pub use catalog::{validate_index_name, IndexCatalog};
pub use config::{ConfigError, LogFormat, TidemarkConfig, WalSyncPolicy};
pub use consumer::{replay_window, ReplayOutcome, ShardHealth, TickReport, WalConsumer};
pub use document::{doc_id, doc_timestamp, route, Document};
pub use error::{IndexError, IndexResult};
pub use index::{Index, IndexMeta, IndexSettings};
pub use ingest::{IngestReport, Ingestor};
pub use node::TidemarkNode;
pub use producer::WalProducer;
pub use segment::{Segment, SegmentMeta, SegmentStat};
pub use shard::{parse_shard_name, shard_name, Shard, ShardMeta, ShardStat};
pub use wal::WalRegistry;
pub use writer::{MemoryWriterFactory, SegmentKey, SegmentWriter, WriterError, WriterFactory};

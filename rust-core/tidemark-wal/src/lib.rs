// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tidemark Write-Ahead Log (WAL) crate
//
// Provides the durability boundary for document ingestion. Every shard owns
// one indexed log; a write is acknowledged once its batch is appended here,
// and the asynchronous consumer later replays the log into segment storage
// and truncates the replayed prefix.
//
// # Architecture
//
// A log is a directory of **segment files**. Each segment is an append-only
// binary file of length-prefixed, CRC32-protected frames, named after the
// index of its first frame. Segments are rotated when they exceed a
// configurable maximum size (default 64 MiB).
//
// ## On-disk frame format (all integers little-endian)
//
// ```text
// [4 bytes: frame_length (u32)]   -- length of everything after this field
// [4 bytes: crc32 checksum]       -- CRC32 of all bytes after this field
// [8 bytes: index (u64)]
// [N bytes: payload]
// ```
//
// ## Usage
//
// ```no_run
// use tidemark_wal::{FileLog, LogOptions, SyncMode, WalLog};
//
// let log = FileLog::open(
//     "/tmp/tidemark-wal/products/0",
//     LogOptions { sync_mode: SyncMode::Fsync, ..Default::default() },
// ).unwrap();
//
// let last = log.batch_write(&[b"{}".to_vec(), b"{}".to_vec()]).unwrap();
// for index in log.first_index().unwrap()..=last {
//     println!("{index}: {:?}", log.read(index).unwrap());
// }
// log.truncate_front(last).unwrap();
// ```

pub mod error;
pub mod file;
pub mod frame;
pub mod log;
pub mod memory;
pub mod segment;

// Re-export the primary public API for ergonomic imports.
pub use error::{WalError, WalResult};
pub use file::FileLog;
pub use log::{LogOptions, SyncMode, WalLog};
pub use memory::MemoryLog;
pub use segment::DEFAULT_MAX_SEGMENT_SIZE;

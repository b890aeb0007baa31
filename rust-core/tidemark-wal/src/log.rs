// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tidemark Write-Ahead Log - The log contract
//
// A `WalLog` is an append-only sequence of opaque records addressed by a
// dense, 1-based index. Entries below a front truncation point are gone for
// good; the index sequence never restarts.

use std::time::Duration;

use crate::error::WalResult;
use crate::segment::DEFAULT_MAX_SEGMENT_SIZE;

// ---------------------------------------------------------------------------
// WalLog
// ---------------------------------------------------------------------------

/// An indexed, append-only log.
///
/// Invariant: `first_index() <= last_index() + 1`, with equality exactly when
/// the log holds no records. All methods are safe to call concurrently;
/// writers are serialized internally so reading `last_index()` and appending
/// after it is atomic.
pub trait WalLog: Send + Sync {
    /// Append one record at `last_index() + 1`, returning its index.
    fn write(&self, data: &[u8]) -> WalResult<u64> {
        self.batch_write(&[data.to_vec()])
    }

    /// Append a contiguous batch starting at `last_index() + 1`.
    ///
    /// Either every record becomes visible or none does. Returns the index
    /// of the last record written (or the unchanged last index for an empty
    /// batch).
    fn batch_write(&self, batch: &[Vec<u8>]) -> WalResult<u64>;

    /// Read the record at `index`. Fails with `NotFound` outside
    /// `[first_index(), last_index()]`.
    fn read(&self, index: u64) -> WalResult<Vec<u8>>;

    /// Read every record in `[from, to]`, in index order.
    fn read_range(&self, from: u64, to: u64) -> WalResult<Vec<Vec<u8>>> {
        (from..=to).map(|index| self.read(index)).collect()
    }

    /// Index of the oldest record still held.
    fn first_index(&self) -> WalResult<u64>;

    /// Index of the newest record, or `first_index() - 1` when empty.
    fn last_index(&self) -> WalResult<u64>;

    /// Discard every record with an index `<= index`.
    ///
    /// `index` must not exceed `last_index()`. Indices already discarded are
    /// a no-op.
    fn truncate_front(&self, index: u64) -> WalResult<()>;

    /// Discard every record with an index `> index`.
    fn truncate_back(&self, index: u64) -> WalResult<()>;

    /// Flush and release underlying resources. Later calls fail with
    /// `WalError::Closed`.
    fn close(&self) -> WalResult<()>;
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Controls how aggressively the log calls `fsync` to flush data to
/// stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Call `fsync` after every batch. Acknowledged writes survive a crash.
    #[default]
    Fsync,

    /// Call `fsync` at most once per the specified duration. Writes between
    /// syncs may be lost on crash.
    Periodic(Duration),

    /// Never explicitly call `fsync`; rely on the OS page cache.
    Async,
}

/// Tuning for a file-backed log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// When to fsync appended data.
    pub sync_mode: SyncMode,
    /// Segment size in bytes past which a new segment file is started.
    pub max_segment_size: u64,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::Fsync,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }
}

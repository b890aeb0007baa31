// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tidemark Write-Ahead Log - Error types
//
// Defines all error conditions that can arise during WAL operations including
// I/O failures, data corruption, out-of-range access and use after close.

use thiserror::Error;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An I/O error occurred while reading or writing a WAL segment file.
    #[error("WAL I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CRC32 checksum mismatch detected while reading a record back.
    /// This indicates data corruption, either from disk failure or
    /// an incomplete write (crash mid-flush).
    #[error("CRC mismatch at index {index}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        /// The log index of the corrupted record.
        index: u64,
        /// The CRC32 value stored in the frame header.
        expected: u32,
        /// The CRC32 value computed from the frame content.
        actual: u32,
    },

    /// The frame header declares a length that exceeds the maximum allowed
    /// record size, indicating corruption or a malformed write.
    #[error("record declares length {length} bytes, exceeding maximum {max_length}")]
    RecordTooLarge {
        /// The declared length in the frame header.
        length: u32,
        /// The maximum allowed frame length.
        max_length: u32,
    },

    /// The requested index is outside `[first_index, last_index]`.
    #[error("index {index} not found (log holds {first}..={last})")]
    NotFound {
        /// The index that was requested.
        index: u64,
        /// First index currently held by the log.
        first: u64,
        /// Last index currently held by the log.
        last: u64,
    },

    /// A truncation point lies outside the range the log can truncate to.
    #[error("truncation index {index} out of range (log holds {first}..={last})")]
    OutOfRange {
        /// The requested truncation index.
        index: u64,
        /// First index currently held by the log.
        first: u64,
        /// Last index currently held by the log.
        last: u64,
    },

    /// A segment file is structurally inconsistent with its neighbours or
    /// with its own name (missing indices, wrong record index).
    #[error("corrupt segment {segment}: {reason}")]
    Corrupt {
        /// The segment file name.
        segment: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The log has been closed and no longer accepts operations.
    #[error("WAL is closed")]
    Closed,
}

/// Convenience type alias for WAL results.
pub type WalResult<T> = Result<T, WalError>;

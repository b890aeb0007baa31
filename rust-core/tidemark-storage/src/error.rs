// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Storage error types.

use thiserror::Error;

/// Errors raised by a storage backend or the typed wrapper above it.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred in the underlying storage layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize a value.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The stored data is corrupted or in an unexpected format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// The backend cannot serve requests (database not opened, worker gone).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

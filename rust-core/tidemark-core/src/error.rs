// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Error types for the ingestion core.

use thiserror::Error;
use tidemark_mapping::MappingError;
use tidemark_storage::StorageError;
use tidemark_wal::WalError;

use crate::writer::WriterError;

/// Errors raised by index, shard and segment operations, ingestion and WAL
/// replay.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no segment found for shard {0}")]
    NoSegmentFound(String),

    #[error("shard {shard} not found in index '{index}'")]
    ShardNotFound { index: String, shard: u32 },

    #[error("index '{0}' not found")]
    IndexNotFound(String),

    #[error("index '{0}' already exists")]
    IndexExists(String),

    #[error("invalid index settings: {0}")]
    InvalidSettings(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("metadata store error: {0}")]
    Storage(#[from] StorageError),

    #[error("segment writer error: {0}")]
    Writer(#[from] WriterError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type IndexResult<T> = Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_errors_pass_through() {
        let err: IndexError = MappingError::Unsupported("dynamic mode 'runtime'".to_string()).into();
        assert_eq!(err.to_string(), "unsupported dynamic mode 'runtime'");
    }

    #[test]
    fn test_shard_not_found_display() {
        let err = IndexError::ShardNotFound {
            index: "logs".to_string(),
            shard: 7,
        };
        assert_eq!(err.to_string(), "shard 7 not found in index 'logs'");
    }
}

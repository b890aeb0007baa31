// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers

use thiserror::Error;
use tidemark_core::WriterError;

/// Segment storage errors
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Query parse error: {0}")]
    QueryError(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Segment writer for {0} is closed")]
    Closed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<tantivy::TantivyError> for DocumentError {
    fn from(e: tantivy::TantivyError) -> Self {
        DocumentError::IndexError(e.to_string())
    }
}

impl From<tantivy::query::QueryParserError> for DocumentError {
    fn from(e: tantivy::query::QueryParserError) -> Self {
        DocumentError::QueryError(e.to_string())
    }
}

impl From<tantivy::directory::error::OpenDirectoryError> for DocumentError {
    fn from(e: tantivy::directory::error::OpenDirectoryError) -> Self {
        DocumentError::IoError(std::io::Error::other(e.to_string()))
    }
}

impl From<tantivy::schema::DocParsingError> for DocumentError {
    fn from(e: tantivy::schema::DocParsingError) -> Self {
        DocumentError::SchemaError(e.to_string())
    }
}

impl From<DocumentError> for WriterError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::IoError(e) => WriterError::Io(e),
            other => WriterError::Engine(other.to_string()),
        }
    }
}

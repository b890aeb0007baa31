// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Core storage backend trait.
//
// Keys and values are opaque bytes. Backends are shared between the catalog,
// the ingest path and the consumer, so they must be `Send + Sync` and fully
// asynchronous; blocking engines push their work onto the blocking pool.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;

/// A pluggable key-value storage backend.
///
/// Typed access lives in [`crate::typed::TypedStore`].
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieve the value stored under `key`, or `Ok(None)` when absent.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key-value pair, overwriting any previous value. The write is
    /// durable once this returns for persistent backends.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Delete `key`. Returns whether it existed.
    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError>;

    /// Up to `limit` (key, value) pairs whose key starts with `prefix`, in
    /// lexicographic key order.
    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Flush buffered writes to durable storage.
    async fn flush(&self) -> Result<(), StorageError>;

    /// A short name for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        (**self).put(key, value).await
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        (**self).delete(key).await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        (**self).scan_prefix(prefix, limit).await
    }

    async fn flush(&self) -> Result<(), StorageError> {
        (**self).flush().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;

    #[tokio::test]
    async fn test_trait_object_behind_arc() {
        let backend: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
        let shared = Arc::clone(&backend);

        shared.put(b"index:logs", b"{}").await.unwrap();
        assert_eq!(backend.get(b"index:logs").await.unwrap(), Some(b"{}".to_vec()));
        assert_eq!(shared.name(), "in-memory");
    }
}

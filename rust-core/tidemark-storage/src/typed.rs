// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Typed storage wrapper.
//
// Serializes values as JSON and prefixes every key with `"{namespace}:"`, so
// several logical stores can share one physical backend.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// A typed, namespaced view over a [`StorageBackend`].
///
/// # Example
///
/// ```rust
/// use tidemark_storage::{InMemoryBackend, TypedStore};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize, PartialEq)]
/// struct Checkpoint { wal_index: u64 }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = TypedStore::new(InMemoryBackend::new(), "checkpoint");
/// store.put("logs/0", &Checkpoint { wal_index: 42 }).await.unwrap();
///
/// let cp: Checkpoint = store.get("logs/0").await.unwrap().unwrap();
/// assert_eq!(cp.wal_index, 42);
/// # });
/// ```
pub struct TypedStore<B: StorageBackend> {
    backend: B,
    namespace: String,
}

impl<B: StorageBackend> TypedStore<B> {
    /// Wrap `backend`; all keys get the `"{namespace}:"` prefix.
    pub fn new(backend: B, namespace: &str) -> Self {
        Self {
            backend,
            namespace: namespace.to_string(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn prefixed_key(&self, key: &str) -> Vec<u8> {
        format!("{}:{}", self.namespace, key).into_bytes()
    }

    /// Retrieve and deserialize a value. `Ok(None)` if the key is absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.backend.get(&self.prefixed_key(key)).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|err| {
                StorageError::SerializationError(format!(
                    "failed to deserialize value for key '{}': {}",
                    key, err
                ))
            }),
            None => Ok(None),
        }
    }

    /// Serialize and store `value` under `key`.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value).map_err(|err| {
            StorageError::SerializationError(format!(
                "failed to serialize value for key '{}': {}",
                key, err
            ))
        })?;
        self.backend.put(&self.prefixed_key(key), &bytes).await
    }

    /// Delete `key`. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.backend.delete(&self.prefixed_key(key)).await
    }

    /// Up to `limit` entries of this namespace whose logical key starts with
    /// `key_prefix`, as (logical key, value) pairs in key order.
    pub async fn scan_prefix<T: DeserializeOwned>(
        &self,
        key_prefix: &str,
        limit: usize,
    ) -> Result<Vec<(String, T)>, StorageError> {
        let ns_len = self.namespace.len() + 1;
        let raw = self
            .backend
            .scan_prefix(&self.prefixed_key(key_prefix), limit)
            .await?;

        raw.into_iter()
            .map(|(raw_key, raw_value)| {
                let logical_key = String::from_utf8_lossy(&raw_key[ns_len..]).into_owned();
                let value = serde_json::from_slice(&raw_value).map_err(|err| {
                    StorageError::SerializationError(format!(
                        "failed to deserialize scanned value for key '{}': {}",
                        logical_key, err
                    ))
                })?;
                Ok((logical_key, value))
            })
            .collect()
    }

    /// Every entry in the namespace.
    pub async fn scan_all<T: DeserializeOwned>(&self) -> Result<Vec<(String, T)>, StorageError> {
        self.scan_prefix("", usize::MAX).await
    }

    /// Flush the underlying backend.
    pub async fn flush(&self) -> Result<(), StorageError> {
        self.backend.flush().await
    }
}

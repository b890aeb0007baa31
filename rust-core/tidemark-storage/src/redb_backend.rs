// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// redb-backed persistent storage backend.
//
// One database file with a single byte-keyed table. Every put and delete is
// its own write transaction, durable on commit. redb is a blocking engine, so
// each operation runs on tokio's blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, TableDefinition};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::StorageError;

const MAIN_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("main");

/// A persistent backend over a single redb file.
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbBackend {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path).map_err(|e| {
            StorageError::BackendUnavailable(format!(
                "failed to open redb at {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "opened redb backend");
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
    }
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_vec();
        self.blocking(move |db| {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;
            let table = match txn.open_table(MAIN_TABLE) {
                Ok(t) => t,
                // Nothing has been written yet.
                Err(_) => return Ok(None),
            };
            table
                .get(key.as_slice())
                .map(|v| v.map(|v| v.value().to_vec()))
                .map_err(|e| StorageError::CorruptedData(format!("get: {e}")))
        })
        .await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let key = key.to_vec();
        let value = value.to_vec();
        self.blocking(move |db| {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
            {
                let mut table = txn
                    .open_table(MAIN_TABLE)
                    .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(|e| StorageError::CorruptedData(format!("insert: {e}")))?;
            }
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))
        })
        .await
    }

    async fn delete(&self, key: &[u8]) -> Result<bool, StorageError> {
        let key = key.to_vec();
        self.blocking(move |db| {
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
            let existed = {
                let mut table = txn
                    .open_table(MAIN_TABLE)
                    .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;
                let removed = table
                    .remove(key.as_slice())
                    .map_err(|e| StorageError::CorruptedData(format!("remove: {e}")))?;
                removed.is_some()
            };
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
            Ok(existed)
        })
        .await
    }

    async fn scan_prefix(
        &self,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let prefix = prefix.to_vec();
        self.blocking(move |db| {
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;
            let table = match txn.open_table(MAIN_TABLE) {
                Ok(t) => t,
                Err(_) => return Ok(Vec::new()),
            };

            let iter = table
                .range(prefix.as_slice()..)
                .map_err(|e| StorageError::CorruptedData(format!("range scan: {e}")))?;

            let mut results = Vec::new();
            for entry in iter {
                let entry =
                    entry.map_err(|e| StorageError::CorruptedData(format!("scan entry: {e}")))?;
                let k = entry.0.value().to_vec();
                if !k.starts_with(&prefix) || results.len() >= limit {
                    break;
                }
                results.push((k, entry.1.value().to_vec()));
            }
            Ok(results)
        })
        .await
    }

    async fn flush(&self) -> Result<(), StorageError> {
        // Commits are already durable.
        Ok(())
    }

    fn name(&self) -> &str {
        "redb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn temp_backend() -> (RedbBackend, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("catalog.redb")).unwrap();
        (backend, dir)
    }

    #[tokio::test]
    async fn test_crud_on_fresh_file() {
        let (backend, _dir) = temp_backend();

        assert_eq!(backend.get(b"index:logs").await.unwrap(), None);
        assert!(backend.scan_prefix(b"index:", 10).await.unwrap().is_empty());

        backend.put(b"index:logs", b"v1").await.unwrap();
        backend.put(b"index:logs", b"v2").await.unwrap();
        assert_eq!(backend.get(b"index:logs").await.unwrap(), Some(b"v2".to_vec()));

        assert!(backend.delete(b"index:logs").await.unwrap());
        assert!(!backend.delete(b"index:logs").await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_prefix_ordering_and_limit() {
        let (backend, _dir) = temp_backend();
        backend.put(b"index:b", b"2").await.unwrap();
        backend.put(b"index:a", b"1").await.unwrap();
        backend.put(b"indexes", b"x").await.unwrap();

        let hits = backend.scan_prefix(b"index:", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, b"index:a".to_vec());
        assert_eq!(hits[1].0, b"index:b".to_vec());

        assert_eq!(backend.scan_prefix(b"index:", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta").join("catalog.redb");

        {
            let backend = RedbBackend::open(&path).unwrap();
            backend.put(b"index:logs", b"{\"wal_index\":7}").await.unwrap();
        }

        let backend = RedbBackend::open(&path).unwrap();
        assert_eq!(
            backend.get(b"index:logs").await.unwrap(),
            Some(b"{\"wal_index\":7}".to_vec())
        );
        assert_eq!(backend.name(), "redb");
    }
}

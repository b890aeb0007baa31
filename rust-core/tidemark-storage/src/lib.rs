// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tidemark Metadata Storage
//
// Byte-oriented key-value storage used to persist index catalogs (settings,
// mappings, shard statistics and WAL checkpoints). The engine only talks to
// the `StorageBackend` trait, so an ephemeral node can run on the in-memory
// backend while a server keeps its catalog in a redb file.
//
// # Modules
//
// - [`backend`] -- The `StorageBackend` trait.
// - [`error`] -- The `StorageError` enum.
// - [`memory`] -- An ordered in-memory backend.
// - [`typed`] -- JSON values under a namespace prefix.
// - `redb_backend` -- Persistent backend (feature `redb-backend`).
//
// # Example
//
// ```rust
// use tidemark_storage::{InMemoryBackend, TypedStore};
//
// # tokio::runtime::Runtime::new().unwrap().block_on(async {
// let store = TypedStore::new(InMemoryBackend::new(), "index");
// store.put("products", &serde_json::json!({"shards": 3})).await.unwrap();
//
// let meta: serde_json::Value = store.get("products").await.unwrap().unwrap();
// assert_eq!(meta["shards"], 3);
// # });
// ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod typed;

#[cfg(feature = "redb-backend")]
pub mod redb_backend;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use memory::InMemoryBackend;
pub use typed::TypedStore;

#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;

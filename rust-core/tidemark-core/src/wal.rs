// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// WAL registry.
//
// One log per shard, keyed by shard name (`"<index>/<shard>"`), opened on
// first use and kept open for the life of the node. The registry is built
// once at startup and shared by handle with the producer, the consumer and
// the catalog.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tidemark_wal::{FileLog, LogOptions, MemoryLog, WalLog};
use tracing::{debug, info, warn};

use crate::error::IndexResult;

enum WalBackend {
    File { root: PathBuf, options: LogOptions },
    Memory,
}

pub struct WalRegistry {
    backend: WalBackend,
    logs: RwLock<HashMap<String, Arc<dyn WalLog>>>,
}

impl WalRegistry {
    /// Registry of file logs under `root/<index>/<shard>`.
    pub fn file(root: impl Into<PathBuf>, options: LogOptions) -> Self {
        Self {
            backend: WalBackend::File {
                root: root.into(),
                options,
            },
            logs: RwLock::new(HashMap::new()),
        }
    }

    /// Registry of in-memory logs. Nothing survives the process.
    pub fn memory() -> Self {
        Self {
            backend: WalBackend::Memory,
            logs: RwLock::new(HashMap::new()),
        }
    }

    /// The shard's log, opening (and creating) it if needed.
    pub fn open_or_get(&self, shard_name: &str) -> IndexResult<Arc<dyn WalLog>> {
        if let Some(log) = self.get(shard_name) {
            return Ok(log);
        }

        let mut logs = self.logs.write();
        if let Some(log) = logs.get(shard_name) {
            return Ok(Arc::clone(log));
        }

        let log: Arc<dyn WalLog> = match &self.backend {
            WalBackend::File { root, options } => {
                Arc::new(FileLog::open(root.join(shard_name), *options)?)
            }
            WalBackend::Memory => Arc::new(MemoryLog::new()),
        };
        info!(
            shard = %shard_name,
            first_index = log.first_index()?,
            last_index = log.last_index()?,
            "opened shard WAL"
        );
        logs.insert(shard_name.to_string(), Arc::clone(&log));
        Ok(log)
    }

    pub fn get(&self, shard_name: &str) -> Option<Arc<dyn WalLog>> {
        self.logs.read().get(shard_name).cloned()
    }

    /// Snapshot of every open log, sorted by shard name.
    pub fn entries(&self) -> Vec<(String, Arc<dyn WalLog>)> {
        let mut entries: Vec<_> = self
            .logs
            .read()
            .iter()
            .map(|(name, log)| (name.clone(), Arc::clone(log)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.logs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.read().is_empty()
    }

    /// Close and forget one shard's log. Its files stay on disk.
    pub fn remove(&self, shard_name: &str) -> IndexResult<bool> {
        match self.logs.write().remove(shard_name) {
            Some(log) => {
                log.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close every log of `index` and delete its WAL directory.
    pub fn remove_index(&self, index: &str) -> IndexResult<()> {
        let prefix = format!("{index}/");
        let removed: Vec<_> = {
            let mut logs = self.logs.write();
            let names: Vec<String> = logs
                .keys()
                .filter(|name| name.starts_with(&prefix))
                .cloned()
                .collect();
            names
                .into_iter()
                .filter_map(|name| logs.remove(&name).map(|log| (name, log)))
                .collect()
        };

        for (name, log) in removed {
            if let Err(e) = log.close() {
                warn!(shard = %name, error = %e, "failed to close WAL of dropped index");
            }
        }

        if let WalBackend::File { root, .. } = &self.backend {
            let dir = root.join(index);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
                debug!(dir = %dir.display(), "removed index WAL directory");
            }
        }
        Ok(())
    }

    /// Close every open log. The registry stays usable; logs are reopened
    /// on demand.
    pub fn close_all(&self) -> IndexResult<()> {
        let logs: Vec<_> = self.logs.write().drain().collect();
        let count = logs.len();
        for (_, log) in logs {
            log.close()?;
        }
        info!(logs = count, "closed all shard WALs");
        Ok(())
    }
}

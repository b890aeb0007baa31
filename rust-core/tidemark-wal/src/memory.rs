// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tidemark Write-Ahead Log - In-memory log
//
// Same contract as `FileLog` without touching disk. Used by tests and by
// ephemeral deployments where durability across restarts is not required.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{WalError, WalResult};
use crate::log::WalLog;

#[derive(Debug)]
struct MemoryState {
    first_index: u64,
    records: VecDeque<Vec<u8>>,
    closed: bool,
}

impl MemoryState {
    fn last_index(&self) -> u64 {
        self.first_index + self.records.len() as u64 - 1
    }

    fn ensure_open(&self) -> WalResult<()> {
        if self.closed {
            return Err(WalError::Closed);
        }
        Ok(())
    }
}

/// A `WalLog` held entirely in process memory.
#[derive(Debug)]
pub struct MemoryLog {
    state: Mutex<MemoryState>,
}

impl MemoryLog {
    /// Create an empty log starting at index 1.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                first_index: 1,
                records: VecDeque::new(),
                closed: false,
            }),
        }
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl WalLog for MemoryLog {
    fn batch_write(&self, batch: &[Vec<u8>]) -> WalResult<u64> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.records.extend(batch.iter().cloned());
        Ok(state.last_index())
    }

    fn read(&self, index: u64) -> WalResult<Vec<u8>> {
        let state = self.state.lock();
        state.ensure_open()?;
        index
            .checked_sub(state.first_index)
            .and_then(|offset| state.records.get(offset as usize))
            .cloned()
            .ok_or_else(|| WalError::NotFound {
                index,
                first: state.first_index,
                last: state.last_index(),
            })
    }

    fn first_index(&self) -> WalResult<u64> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.first_index)
    }

    fn last_index(&self) -> WalResult<u64> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.last_index())
    }

    fn truncate_front(&self, index: u64) -> WalResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if index < state.first_index {
            return Ok(());
        }
        if index > state.last_index() {
            return Err(WalError::OutOfRange {
                index,
                first: state.first_index,
                last: state.last_index(),
            });
        }
        let drop_count = (index + 1 - state.first_index) as usize;
        state.records.drain(..drop_count);
        state.first_index = index + 1;
        Ok(())
    }

    fn truncate_back(&self, index: u64) -> WalResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if index >= state.last_index() {
            return Ok(());
        }
        if index + 1 < state.first_index {
            return Err(WalError::OutOfRange {
                index,
                first: state.first_index,
                last: state.last_index(),
            });
        }
        let keep = (index + 1 - state.first_index) as usize;
        state.records.truncate(keep);
        Ok(())
    }

    fn close(&self) -> WalResult<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_log_invariant() {
        let log = MemoryLog::new();
        assert_eq!(log.first_index().unwrap(), log.last_index().unwrap() + 1);
    }

    #[test]
    fn test_truncate_front_leaves_log_starting_after_cut() {
        let log = MemoryLog::new();
        let batch: Vec<Vec<u8>> = (1..=10).map(|i: u32| i.to_le_bytes().to_vec()).collect();
        assert_eq!(log.batch_write(&batch).unwrap(), 10);

        log.truncate_front(10).unwrap();
        assert_eq!(log.first_index().unwrap(), 11);
        assert_eq!(log.last_index().unwrap(), 10);
        assert_eq!(log.write(b"next").unwrap(), 11);
    }

    #[test]
    fn test_truncate_back_and_rewrite() {
        let log = MemoryLog::new();
        for i in 0..5u8 {
            log.write(&[i]).unwrap();
        }
        log.truncate_back(2).unwrap();
        assert_eq!(log.last_index().unwrap(), 2);
        assert_eq!(log.write(b"x").unwrap(), 3);
        assert!(log.truncate_back(0).is_ok());
        assert_eq!(log.last_index().unwrap(), 0);
    }

    #[test]
    fn test_closed_log_rejects_operations() {
        let log = MemoryLog::new();
        log.close().unwrap();
        assert!(matches!(log.write(b"a"), Err(WalError::Closed)));
        assert!(matches!(log.first_index(), Err(WalError::Closed)));
    }
}

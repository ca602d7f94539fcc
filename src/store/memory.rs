//! Ephemeral in-memory cache store
//!
//! Selected when the run has no identifier: nothing outlives the process,
//! so entries live in a process-local map. Independent instances never
//! share state.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{validate_key, CacheError, CacheResult, CacheStats, CacheStore, StoreKind};
use crate::timeout::{validate_task_timeout, TaskDeadline};

/// In-process map store for unidentified runs.
pub struct MemoryCacheStore {
    /// Entries keyed by the caller's cache key
    entries: Mutex<BTreeMap<String, Vec<u8>>>,

    /// Bound applied to every operation
    task_timeout: Duration,
}

impl MemoryCacheStore {
    /// Create an empty store. Fails only on an invalid task timeout.
    pub fn new(task_timeout: Duration) -> CacheResult<Self> {
        validate_task_timeout(task_timeout)?;
        Ok(Self {
            entries: Mutex::new(BTreeMap::new()),
            task_timeout,
        })
    }

    fn deadline(&self) -> TaskDeadline {
        TaskDeadline::start(self.task_timeout)
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned lock still holds a structurally sound map.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CacheStore for MemoryCacheStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }

    fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    fn put(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        validate_key(key)?;
        self.deadline().check("put")?;
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> CacheResult<Vec<u8>> {
        validate_key(key)?;
        self.deadline().check("get")?;
        self.entries()
            .get(key)
            .cloned()
            .ok_or_else(|| CacheError::not_found(key))
    }

    fn exists(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        self.deadline().check("exists")?;
        Ok(self.entries().contains_key(key))
    }

    fn remove(&self, key: &str) -> CacheResult<bool> {
        validate_key(key)?;
        self.deadline().check("remove")?;
        Ok(self.entries().remove(key).is_some())
    }

    fn keys(&self) -> CacheResult<Vec<String>> {
        self.deadline().check("keys")?;
        Ok(self.entries().keys().cloned().collect())
    }

    fn clear(&self) -> CacheResult<()> {
        self.deadline().check("clear")?;
        self.entries().clear();
        Ok(())
    }

    fn stats(&self) -> CacheResult<CacheStats> {
        self.deadline().check("stats")?;
        let entries = self.entries();
        Ok(CacheStats {
            entries: entries.len(),
            total_bytes: entries.values().map(|v| v.len() as u64).sum(),
        })
    }
}

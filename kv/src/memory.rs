//! In-memory key-value store implementation for testing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::{KVError, KVResult, KVStore, Op};

/// An in-memory key-value store backed by a BTreeMap.
///
/// Clones share the same data. [`MemoryStore::set_offline`] makes every
/// call fail with [`KVError::Unavailable`], which lets callers exercise
/// their degraded paths without a real outage.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated unavailability.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> KVResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(KVError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

impl KVStore for MemoryStore {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        self.check_online()?;
        let data = self
            .data
            .lock()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        self.check_online()?;
        let data = self
            .data
            .lock()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&self, ops: &[Op]) -> KVResult<()> {
        self.check_online()?;
        let mut data = self
            .data
            .lock()
            .map_err(|e| KVError::Storage(e.to_string()))?;
        for op in ops {
            match op {
                Op::Put { key, value } => {
                    data.insert(key.clone(), value.clone());
                }
                Op::Delete { key } => {
                    data.remove(key);
                }
            }
        }
        Ok(())
    }
}

//! Key-value store interface and implementations.
//!
//! The cluster store keeps every record in a flat, ordered key space and
//! relies on one primitive for consistency: [`KVStore::apply`] commits a
//! batch of puts and deletes atomically. An in-memory implementation backs
//! the tests; [`RedbStore`] persists to a single redb file.

pub mod memory;
pub mod redb;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur in KV store operations.
#[derive(Error, Debug)]
pub enum KVError {
    #[error("kv: storage error: {0}")]
    Storage(String),

    #[error("kv: store is unavailable: {0}")]
    Unavailable(String),
}

/// Result type for KV operations.
pub type KVResult<T> = Result<T, KVError>;

/// A single mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl Op {
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Op::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Op::Delete { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            Op::Put { key, .. } | Op::Delete { key } => key,
        }
    }
}

/// Ordered key-value store with atomic batches.
///
/// Keys are UTF-8 strings compared bytewise; values are opaque bytes.
pub trait KVStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>>;

    /// Return every entry whose key starts with `prefix`, in key order.
    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>>;

    /// Apply all operations in one transaction. Either every op is visible
    /// afterwards or none is. Later ops on the same key win.
    fn apply(&self, ops: &[Op]) -> KVResult<()>;

    /// Set a single key.
    fn put(&self, key: &str, value: &[u8]) -> KVResult<()> {
        self.apply(&[Op::put(key, value)])
    }

    /// Delete a single key. Missing keys are not an error.
    fn delete(&self, key: &str) -> KVResult<()> {
        self.apply(&[Op::delete(key)])
    }
}

impl<T: KVStore + ?Sized> KVStore for Arc<T> {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        (**self).scan(prefix)
    }

    fn apply(&self, ops: &[Op]) -> KVResult<()> {
        (**self).apply(ops)
    }
}

impl fmt::Debug for dyn KVStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KVStore {{ ... }}")
    }
}

pub use memory::MemoryStore;
pub use redb::RedbStore;

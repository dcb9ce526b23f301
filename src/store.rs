// src/store.rs
//! Narrow interfaces to the persisted store, plus an in-memory
//! implementation used for embedding and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{Error, Result};

/// Durable source of one entity type.
pub trait EntityStore<V: Entity>: Send + Sync {
    /// Every persisted row. Only called during bootstrap.
    fn load_all(&self) -> Result<Vec<V>>;

    fn save(&self, value: &V) -> Result<()>;

    fn delete(&self, keys: &[V::Key]) -> Result<()>;
}

/// One hourly usage sample for a server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub server_id: u64,
    pub inbound: u64,
    pub outbound: u64,
    /// Unix seconds, truncated to the hour.
    pub created_at: u64,
}

/// Destination for aggregates computed by the background refresher.
pub trait TransferSink: Send + Sync {
    fn record_transfers(&self, batch: &[TransferRecord]) -> Result<()>;
}

/// Keyed in-memory [`EntityStore`] whose writes can be made to fail.
pub struct MemoryStore<V: Entity> {
    rows: Mutex<BTreeMap<V::Key, V>>,
    fail_writes: AtomicBool,
}

impl<V: Entity + Clone> MemoryStore<V> {
    pub fn new(rows: impl IntoIterator<Item = V>) -> Self {
        Self {
            rows: Mutex::new(rows.into_iter().map(|v| (v.key(), v)).collect()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent `save`/`delete` calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: V::Key) -> Option<V> {
        self.rows.lock().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Store("writes disabled".to_string()));
        }
        Ok(())
    }
}

impl<V: Entity + Clone> EntityStore<V> for MemoryStore<V> {
    fn load_all(&self) -> Result<Vec<V>> {
        Ok(self.rows.lock().values().cloned().collect())
    }

    fn save(&self, value: &V) -> Result<()> {
        self.check_writable()?;
        self.rows.lock().insert(value.key(), value.clone());
        Ok(())
    }

    fn delete(&self, keys: &[V::Key]) -> Result<()> {
        self.check_writable()?;
        let mut rows = self.rows.lock();
        for key in keys {
            rows.remove(key);
        }
        Ok(())
    }
}

/// [`TransferSink`] collecting batches in memory.
#[derive(Default)]
pub struct MemoryTransferSink {
    records: Mutex<Vec<TransferRecord>>,
    fail: AtomicBool,
}

impl MemoryTransferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<TransferRecord> {
        self.records.lock().clone()
    }
}

impl TransferSink for MemoryTransferSink {
    fn record_transfers(&self, batch: &[TransferRecord]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Store("transfer sink unavailable".to_string()));
        }
        self.records.lock().extend_from_slice(batch);
        Ok(())
    }
}

//! Per-entity job locks.
//!
//! A slot lives in the map only while some job holds or awaits it; the last
//! holder to release removes it.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Something two jobs must not work on at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKey {
    /// Payment window and watermark of a tracked address.
    Address(String),
    /// The draw finalization chain. Bonus carry links adjacent draws, so
    /// finalizations share one key.
    Draws,
    /// A forwarding deposit address.
    Forwarding(u32),
}

#[derive(Debug, Default, Clone)]
pub struct EntityLocks {
    locks: Slots,
}

type Slots = Arc<DashMap<EntityKey, Arc<Mutex<()>>>>;

/// Guards held for the duration of a job.
#[derive(Debug)]
pub struct HeldLocks {
    guards: Vec<OwnedMutexGuard<()>>,
    keys: Vec<EntityKey>,
    slots: Slots,
}

impl Drop for HeldLocks {
    fn drop(&mut self) {
        self.guards.clear();
        for key in &self.keys {
            // Waiters hold a clone of the slot, so a count of one means idle.
            self.slots.remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
        }
    }
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &EntityKey) -> Arc<Mutex<()>> {
        // Clone out of the map so no shard lock is held across an await.
        Arc::clone(self.locks.entry(key.clone()).or_default().value())
    }

    /// Wait for every key. Keys are taken in sorted order so two jobs
    /// sharing keys cannot deadlock.
    pub async fn acquire(&self, mut keys: Vec<EntityKey>) -> HeldLocks {
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.slot(key).lock_owned().await);
        }
        HeldLocks {
            guards,
            keys,
            slots: Arc::clone(&self.locks),
        }
    }

    /// Keys currently held or awaited.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }

    pub fn is_locked(&self, key: &EntityKey) -> bool {
        self.locks
            .get(key)
            .map(|slot| slot.try_lock().is_err())
            .unwrap_or(false)
    }
}

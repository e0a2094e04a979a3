//! Per-key mutual exclusion for captures.
//!
//! At most one capture per [`ResourceKey`] runs its miss path at a time.
//! Entries are created on demand and dropped when the last holder or
//! waiter lets go, so the table only ever holds keys with work in flight.

use std::sync::Arc;

use dashmap::DashMap;
use loader_core::ResourceKey;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Table = DashMap<ResourceKey, Arc<Mutex<()>>>;

/// Table of async mutexes keyed by resource.
#[derive(Debug, Default, Clone)]
pub struct KeyLocks {
    table: Arc<Table>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder owns `key`, then own it.
    ///
    /// Dropping the returned future while it waits gives up the place in
    /// the queue and removes the entry if nobody else references it.
    pub async fn acquire(&self, key: &ResourceKey) -> KeyGuard {
        let mut waiter = Waiter { table: &self.table, key, waiting: true };
        // Clone the Arc and release the shard lock before awaiting.
        let lock = self.table.entry(key.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        waiter.waiting = false;
        KeyGuard { table: Arc::clone(&self.table), key: key.clone(), _guard: guard }
    }

    /// Number of keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Cleans up after an `acquire` that was cancelled mid-wait.
struct Waiter<'a> {
    table: &'a Table,
    key: &'a ResourceKey,
    waiting: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        // The pending lock future, and its Arc, is dropped before this
        // guard, so only the table's own reference is left when unused.
        if self.waiting {
            self.table.remove_if(self.key, |_, lock| Arc::strong_count(lock) <= 1);
        }
    }
}

/// Exclusive hold on one key; released on drop.
#[derive(Debug)]
pub struct KeyGuard {
    table: Arc<Table>,
    key: ResourceKey,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Table entry plus our own guard account for two references; any
        // more means someone is queued behind us.
        self.table.remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

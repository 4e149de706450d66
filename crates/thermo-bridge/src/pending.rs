//! # Pending Correlation Table
//!
//! Tracks registry requests that are waiting for a response, keyed by
//! correlation id. Concurrent callers for the same key share one entry, so
//! only the caller that created it writes to the wire.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   key "786777"  ──►  PendingEntry { expires_at, waiters: [w1, w2, w3] } │
//! │                                                                         │
//! │   attach()   first caller creates the entry (created = true)            │
//! │              later callers append a waiter (created = false)            │
//! │              an expired entry is re-armed (created = true)              │
//! │   resolve()  removes the entry, try_send to every waiter                │
//! │   detach()   drops one waiter, removes the entry when none are left     │
//! │   abandon()  request never sent: detach, hand the expiry back           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, warn};

struct WaiterSlot<T> {
    id: u64,
    tx: mpsc::Sender<T>,
}

struct PendingEntry<T> {
    expires_at: Instant,
    waiters: Vec<WaiterSlot<T>>,
}

/// Concurrency-safe map of correlation key to waiting callers.
pub struct PendingTable<T> {
    entries: Mutex<HashMap<String, PendingEntry<T>>>,
    next_id: AtomicU64,
    waiter_capacity: usize,
}

impl<T: Clone> PendingTable<T> {
    /// Creates an empty table. Each waiter gets a queue of `waiter_capacity`.
    pub fn new(waiter_capacity: usize) -> Arc<Self> {
        Arc::new(PendingTable {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            waiter_capacity: waiter_capacity.max(1),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingEntry<T>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a waiter for `key`.
    ///
    /// Returns true when the caller must send the wire request: the entry
    /// was just created, or the existing one outlived `ttl` without a
    /// response.
    pub fn attach(self: &Arc<Self>, key: &str, ttl: Duration) -> (Waiter<T>, bool) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.waiter_capacity);
        let now = Instant::now();

        let mut entries = self.lock();
        // Expiry to restore if this caller armed the entry but never sends.
        let armed_from = match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.waiters.push(WaiterSlot { id, tx });
                None
            }
            Some(entry) => {
                debug!(key, waiters = entry.waiters.len(), "Re-arming expired pending entry");
                let previous = entry.expires_at;
                entry.expires_at = now + ttl;
                entry.waiters.push(WaiterSlot { id, tx });
                Some(previous)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    PendingEntry {
                        expires_at: now + ttl,
                        waiters: vec![WaiterSlot { id, tx }],
                    },
                );
                Some(now)
            }
        };
        drop(entries);

        let created = armed_from.is_some();
        let waiter = Waiter {
            key: key.to_string(),
            id,
            rx,
            armed_from,
            table: Arc::clone(self),
        };
        (waiter, created)
    }

    /// Delivers `value` to every waiter on `key` and removes the entry.
    ///
    /// Returns how many waiters received it. A waiter whose queue is full
    /// is skipped.
    pub fn resolve(&self, key: &str, value: T) -> usize {
        let Some(entry) = self.lock().remove(key) else {
            debug!(key, "Response for unknown correlation key");
            return 0;
        };

        let mut delivered = 0;
        for slot in entry.waiters {
            match slot.tx.try_send(value.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(key, waiter = slot.id, "Waiter queue full, response skipped");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Removes one waiter, and the entry once it has none left.
    pub fn detach(&self, key: &str, id: u64) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.waiters.retain(|slot| slot.id != id);
            if entry.waiters.is_empty() {
                entries.remove(key);
            }
        }
    }

    /// Removes one waiter and marks the entry as expired at `expires_at`,
    /// so the next caller sends the request again.
    fn disarm(&self, key: &str, id: u64, expires_at: Instant) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.waiters.retain(|slot| slot.id != id);
            entry.expires_at = expires_at;
            if entry.waiters.is_empty() {
                entries.remove(key);
            }
        }
    }

    /// Number of keys waiting for a response.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of waiters attached to `key`.
    pub fn waiters(&self, key: &str) -> usize {
        self.lock().get(key).map(|e| e.waiters.len()).unwrap_or(0)
    }
}

// =============================================================================
// Waiter
// =============================================================================

/// One caller's handle on a pending entry. Detaches itself on drop.
pub struct Waiter<T: Clone> {
    key: String,
    id: u64,
    rx: mpsc::Receiver<T>,
    armed_from: Option<Instant>,
    table: Arc<PendingTable<T>>,
}

impl<T: Clone> Waiter<T> {
    /// Waits for the response. `None` if the entry was dropped without one.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Gives up on a request this waiter was meant to send.
    ///
    /// Other waiters on the key stay attached; the entry reverts to expired
    /// so the next caller re-sends.
    pub fn abandon(self) {
        if let Some(expires_at) = self.armed_from {
            self.table.disarm(&self.key, self.id, expires_at);
        }
    }
}

impl<T: Clone> Drop for Waiter<T> {
    fn drop(&mut self) {
        self.table.detach(&self.key, self.id);
    }
}

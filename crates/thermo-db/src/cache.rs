//! # Identity Cache
//!
//! Keeps recently read identities in memory so a queue of people at one
//! kiosk does not turn into a queue of SQLite reads.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  get(card)                                                              │
//! │     │                                                                   │
//! │     ├── hit, younger than ttl  ──► return copy                          │
//! │     └── miss / expired         ──► caller reads SQL, then insert()      │
//! │                                                                         │
//! │  upsert always goes to SQL first and then replaces the cached copy,     │
//! │  so the cache never holds a record newer than the table.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entry age is measured from insertion, not from `updated_at`. Staleness
//! against the registry is still decided from `updated_at` by the caller.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use thermo_core::{CardNumber, IdentityRecord};

/// TTL map of identity records, safe to share between tasks.
#[derive(Debug)]
pub struct IdentityCache {
    ttl: Duration,
    entries: RwLock<HashMap<CardNumber, (IdentityRecord, Instant)>>,
}

impl IdentityCache {
    /// Creates an empty cache.
    pub fn new(ttl: Duration) -> Self {
        IdentityCache {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a copy of a live entry.
    pub async fn get(&self, card: CardNumber) -> Option<IdentityRecord> {
        let entries = self.entries.read().await;
        entries
            .get(&card)
            .filter(|(_, inserted)| inserted.elapsed() < self.ttl)
            .map(|(record, _)| record.clone())
    }

    /// Stores or replaces an entry. Expired entries are dropped on the way.
    pub async fn insert(&self, record: IdentityRecord) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, (_, inserted)| inserted.elapsed() < ttl);
        entries.insert(record.card, (record, Instant::now()));
    }

    /// Removes an entry.
    pub async fn invalidate(&self, card: CardNumber) {
        self.entries.write().await.remove(&card);
    }

    /// Number of entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true when nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_get_invalidate() {
        let cache = IdentityCache::new(Duration::from_secs(60));
        let card = CardNumber::from_raw(42);

        assert!(cache.get(card).await.is_none());
        cache.insert(IdentityRecord::new(card, "Orlova", "Maria")).await;

        let hit = cache.get(card).await.unwrap();
        assert_eq!(hit.family_name, "Orlova");
        assert_eq!(cache.len().await, 1);

        cache.invalidate(card).await;
        assert!(cache.get(card).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = IdentityCache::new(Duration::ZERO);
        let card = CardNumber::from_raw(7);
        cache.insert(IdentityRecord::new(card, "Orlova", "Maria")).await;
        assert!(cache.get(card).await.is_none());
    }
}

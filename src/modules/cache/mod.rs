//! Time-bounded result cache.
//!
//! Maps a normalized identifier to the last successful registry payload.
//! Expiry is lazy: an entry past its deadline is dropped the next time it is
//! read, there is no background sweeper. The keyspace is a finite population
//! of real IDs, so no capacity bound is enforced.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::identifier::Identifier;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn deadline(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub identifier: Identifier,
    pub payload: Value,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe TTL cache. Cloning shares the underlying map.
#[derive(Clone, Debug)]
pub struct ResultCache {
    ttl: Duration,
    inner: Arc<Mutex<HashMap<Identifier, CacheEntry>>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, identifier: &Identifier) -> Option<CacheEntry> {
        self.get_at(identifier, Utc::now())
    }

    pub fn get_at(&self, identifier: &Identifier, now: DateTime<Utc>) -> Option<CacheEntry> {
        let mut guard = self.lock();
        match guard.get(identifier) {
            Some(entry) if entry.is_expired_at(now) => {
                log::debug!("cache entry for {identifier} expired at {}", entry.expires_at);
                guard.remove(identifier);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    pub fn put(&self, identifier: Identifier, payload: Value) -> CacheEntry {
        self.put_at(identifier, payload, Utc::now())
    }

    pub fn put_at(&self, identifier: Identifier, payload: Value, now: DateTime<Utc>) -> CacheEntry {
        let entry = CacheEntry {
            identifier: identifier.clone(),
            payload,
            expires_at: deadline(now, self.ttl),
        };
        self.lock().insert(identifier, entry.clone());
        entry
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // Entries are replaced whole, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<Identifier, CacheEntry>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

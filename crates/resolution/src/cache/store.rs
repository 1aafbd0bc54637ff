use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::clock::{Clock, SystemClock};

/// A stored value with its expiration metadata.
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: DateTime<Utc>,
    pub ttl: Duration,
}

/// Validity of an entry relative to the current time.
#[derive(Debug, PartialEq, Eq)]
enum EntryState {
    Valid,
    Expired,
    Corrupt,
}

impl<V> CacheEntry<V> {
    /// An entry is valid iff `now - stored_at < ttl`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == EntryState::Valid
    }

    fn state_at(&self, now: DateTime<Utc>) -> EntryState {
        // A stored_at in the future means the clock went backwards
        match (now - self.stored_at).to_std() {
            Ok(age) if age < self.ttl => EntryState::Valid,
            Ok(_) => EntryState::Expired,
            Err(_) => EntryState::Corrupt,
        }
    }
}

/// Optional consistency check run on every read.
pub type EntryValidator<V> = fn(key: &str, value: &V) -> bool;

/// Key-value store with per-entry TTL.
///
/// Expired entries are treated as absent and removed lazily on the next read;
/// [`purge_expired`](Self::purge_expired) is available for an explicit sweep.
/// Entries that fail validation (see [`with_validator`](Self::with_validator))
/// or whose timestamp lies ahead of the clock are discarded and reported as a
/// miss.
///
/// Writes are serialized through a single mutex; `set` is last-writer-wins.
pub struct CacheStore<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
    validator: Option<EntryValidator<V>>,
}

impl<V: Clone> CacheStore<V> {
    /// Create a store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            validator: None,
        }
    }

    /// Discard entries for which `validator` returns false.
    pub fn with_validator(mut self, validator: EntryValidator<V>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Lock the entries mutex, recovering from poison if necessary.
    ///
    /// A poisoned cache is at worst missing a write, which the next
    /// resolution repairs.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Cache store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Return the value for `key` if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.lock_entries();

        let entry = entries.get(key)?;
        let state = match entry.state_at(now) {
            EntryState::Valid => match self.validator {
                Some(validate) if !validate(key, &entry.value) => EntryState::Corrupt,
                _ => EntryState::Valid,
            },
            other => other,
        };

        match state {
            EntryState::Valid => Some(entry.value.clone()),
            EntryState::Expired => {
                debug!("Cache entry '{}' expired, evicting", key);
                entries.remove(key);
                None
            }
            EntryState::Corrupt => {
                warn!("Cache entry '{}' is inconsistent, discarding", key);
                entries.remove(key);
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: self.clock.now(),
            ttl,
        };
        self.lock_entries().insert(key.to_string(), entry);
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock_entries().remove(key).is_some()
    }

    /// Remove every key starting with `prefix`. Returns how many were removed.
    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Drop every entry that is no longer valid. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid_at(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    pub fn clear(&self) {
        self.lock_entries().clear();
    }
}

impl<V: Clone> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

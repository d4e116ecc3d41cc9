//! Thread-scoped result cache.
//!
//! Maps a chat thread key to the last result set fetched in that thread so a
//! follow-up label command can act on it. Entries expire a fixed TTL after
//! their last write and the map never holds more than `max_entries`; the
//! least recently used key goes first.
//!
//! Expiry is evaluated lazily on read, so an expired entry is never returned
//! even if it has not been purged yet. Writes also purge expired entries
//! before enforcing capacity.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tracing::debug;

use crate::domain::entity::{EntityKind, Row};

pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MAX_ENTRIES: usize = 512;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Snapshot handed to readers. Rows are shared, so a reader holds the exact
/// set written by one `put` regardless of later writes to the same key.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub kind: EntityKind,
    pub rows: Arc<Vec<Row>>,
}

struct Slot {
    entry: CacheEntry,
    written_at: Instant,
}

pub struct ResultCache {
    slots: Mutex<IndexMap<String, Slot>>,
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self::with_clock(ttl, max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self { slots: Mutex::new(IndexMap::new()), ttl, max_entries: max_entries.max(1), clock }
    }

    /// Stores `rows` under `thread_key`, replacing any previous entry and
    /// restarting its expiry clock.
    pub fn put(&self, thread_key: &str, kind: EntityKind, rows: Vec<Row>) {
        let now = self.clock.now();
        let row_count = rows.len();
        let mut slots = self.lock();

        slots.shift_remove(thread_key);
        slots.insert(
            thread_key.to_owned(),
            Slot { entry: CacheEntry { kind, rows: Arc::new(rows) }, written_at: now },
        );

        let ttl = self.ttl;
        slots.retain(|_, slot| now.saturating_duration_since(slot.written_at) < ttl);

        let mut evicted = 0_usize;
        while slots.len() > self.max_entries {
            slots.shift_remove_index(0);
            evicted += 1;
        }

        debug!(
            event_name = "cache.put",
            thread_id = thread_key,
            entity = kind.plural(),
            row_count,
            live_entries = slots.len(),
            evicted,
            "cached result set"
        );
    }

    pub fn get(&self, thread_key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut slots = self.lock();

        let index = slots.get_index_of(thread_key)?;
        let expired = slots
            .get_index(index)
            .map(|(_, slot)| now.saturating_duration_since(slot.written_at) >= self.ttl)
            .unwrap_or(true);
        if expired {
            slots.shift_remove_index(index);
            return None;
        }

        let last = slots.len() - 1;
        slots.move_index(index, last);
        slots.get_index(last).map(|(_, slot)| slot.entry.clone())
    }

    /// Number of entries that have not yet expired.
    pub fn live_entries(&self) -> usize {
        let now = self.clock.now();
        self.lock()
            .values()
            .filter(|slot| now.saturating_duration_since(slot.written_at) < self.ttl)
            .count()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

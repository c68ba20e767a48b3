//! Authoritative in-memory blocklist store.
//!
//! One module owns the three structures that must agree with each other:
//!
//! - the primary map `CountryCode → BlockEntry`
//! - the [`NameIndex`] derived from display names
//! - the cached unfiltered total count
//!
//! ## Concurrency
//!
//! State lives in an immutable [`Snapshot`] behind an [`ArcSwap`]. Readers load the
//! current snapshot (lock-free, wait-free) and never observe a half-applied
//! mutation. Writers serialize on a single mutex, build the next snapshot
//! (map + index together), swap it in and drop the cached count, all before
//! releasing the mutex. The store holds at most a few hundred countries, so the
//! copy-on-write clone per mutation is cheap.
//!
//! The count cache is tagged with the snapshot generation it was computed from, so
//! a reader that races a writer can never re-install a pre-mutation count.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use countryguard_blocklist::{BlockEntry, CountryCode};
use countryguard_core::{Clock, DomainError, DomainResult};

use crate::name_index::NameIndex;

/// How long an unfiltered total count is served from cache.
pub const DEFAULT_COUNT_TTL: Duration = Duration::seconds(30);

#[derive(Debug, Clone)]
struct Slot {
    /// Insertion order, used to break `blocked_at` ties.
    seq: u64,
    entry: BlockEntry,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    generation: u64,
    next_seq: u64,
    entries: HashMap<CountryCode, Slot>,
    names: NameIndex,
}

impl Snapshot {
    fn insert(&mut self, entry: BlockEntry) {
        self.names.insert(entry.country_name(), entry.country_code());
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries
            .insert(entry.country_code().clone(), Slot { seq, entry });
    }

    fn remove(&mut self, code: &CountryCode) -> Option<BlockEntry> {
        let slot = self.entries.remove(code)?;
        self.names.remove(slot.entry.country_name(), code);
        Some(slot.entry)
    }

    /// Entries matching `term` by code substring or by name words (set union).
    fn matching(&self, term: Option<&str>) -> Vec<&Slot> {
        let Some(term) = term else {
            return self.entries.values().collect();
        };

        let needle = term.to_uppercase();
        let by_name = self.names.matching(term);

        self.entries
            .iter()
            .filter(|(code, _)| code.as_str().contains(&needle) || by_name.contains(*code))
            .map(|(_, slot)| slot)
            .collect()
    }
}

#[derive(Debug, Copy, Clone)]
struct CachedCount {
    generation: u64,
    value: usize,
    computed_at: DateTime<Utc>,
}

/// Counters for observing cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub entries: usize,
    pub generation: u64,
    pub count_cache_hits: u64,
    pub count_cache_misses: u64,
}

pub struct BlockStore {
    snapshot: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    count_cache: ArcSwapOption<CachedCount>,
    count_ttl: Duration,
    clock: Arc<dyn Clock>,
    count_cache_hits: AtomicU64,
    count_cache_misses: AtomicU64,
}

impl core::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockStore")
            .field("stats", &self.stats())
            .field("count_ttl", &self.count_ttl)
            .finish_non_exhaustive()
    }
}

/// Trimmed search term, or `None` when blank.
fn normalize_search(search: Option<&str>) -> Option<&str> {
    search.map(str::trim).filter(|s| !s.is_empty())
}

impl BlockStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            writer: Mutex::new(()),
            count_cache: ArcSwapOption::empty(),
            count_ttl: DEFAULT_COUNT_TTL,
            clock,
            count_cache_hits: AtomicU64::new(0),
            count_cache_misses: AtomicU64::new(0),
        }
    }

    pub fn with_count_ttl(mut self, ttl: Duration) -> Self {
        self.count_ttl = ttl;
        self
    }

    pub fn exists(&self, code: &CountryCode) -> bool {
        self.snapshot.load().entries.contains_key(code)
    }

    pub fn get(&self, code: &CountryCode) -> Option<BlockEntry> {
        self.snapshot
            .load()
            .entries
            .get(code)
            .map(|slot| slot.entry.clone())
    }

    /// Insert a new entry; fails with `DuplicateBlock` if the code is present.
    pub fn add(&self, entry: BlockEntry) -> DomainResult<()> {
        let _writer = self.lock_writer();
        let current = self.snapshot.load_full();

        if current.entries.contains_key(entry.country_code()) {
            return Err(DomainError::duplicate_block(entry.country_code().as_str()));
        }

        let mut next = Snapshot::clone(&current);
        debug!(country_code = %entry.country_code(), "adding block entry");
        next.insert(entry);
        self.commit(next);
        Ok(())
    }

    /// Remove whatever is stored under `code`. Absent codes are a no-op.
    pub fn remove(&self, code: &CountryCode) -> Option<BlockEntry> {
        self.remove_where(code, |_| true)
    }

    /// Remove `entry` only if the store still holds that very entry (same id).
    ///
    /// A code that was unblocked and blocked again since `entry` was read is left
    /// alone.
    pub fn remove_entry(&self, entry: &BlockEntry) -> Option<BlockEntry> {
        self.remove_where(entry.country_code(), |stored| {
            stored.id_typed() == entry.id_typed()
        })
    }

    fn remove_where(
        &self,
        code: &CountryCode,
        predicate: impl FnOnce(&BlockEntry) -> bool,
    ) -> Option<BlockEntry> {
        let _writer = self.lock_writer();
        let current = self.snapshot.load_full();

        let stored = current.entries.get(code)?;
        if !predicate(&stored.entry) {
            return None;
        }

        let mut next = Snapshot::clone(&current);
        let removed = next.remove(code);
        debug!(country_code = %code, "removed block entry");
        self.commit(next);
        removed
    }

    /// Drop every entry, the whole index and the cached count.
    pub fn clear(&self) {
        let _writer = self.lock_writer();
        let current = self.snapshot.load();
        let next = Snapshot {
            generation: current.generation,
            next_seq: current.next_seq,
            ..Snapshot::default()
        };
        self.commit(next);
    }

    /// Temporary entries whose expiry is at or before `now`, soonest first.
    pub fn list_expired(&self, now: DateTime<Utc>) -> Vec<BlockEntry> {
        let snapshot = self.snapshot.load();
        let mut expired: Vec<BlockEntry> = snapshot
            .entries
            .values()
            .filter(|slot| slot.entry.is_expired_at(now))
            .map(|slot| slot.entry.clone())
            .collect();
        expired.sort_by_key(|e| e.expires_at());
        expired
    }

    /// One page (1-based) of entries, newest block first.
    ///
    /// Equal `blocked_at` values keep insertion order. Page 0 is read as page 1 and
    /// a zero page size yields an empty page.
    pub fn page(
        &self,
        page_number: usize,
        page_size: usize,
        search: Option<&str>,
    ) -> Vec<BlockEntry> {
        if page_size == 0 {
            return Vec::new();
        }

        let snapshot = self.snapshot.load();
        let mut slots = snapshot.matching(normalize_search(search));
        slots.sort_by(|a, b| {
            b.entry
                .blocked_at()
                .cmp(&a.entry.blocked_at())
                .then(a.seq.cmp(&b.seq))
        });

        let skip = page_number.max(1).saturating_sub(1).saturating_mul(page_size);
        slots
            .into_iter()
            .skip(skip)
            .take(page_size)
            .map(|slot| slot.entry.clone())
            .collect()
    }

    /// Number of entries, optionally filtered.
    ///
    /// The unfiltered count is cached for the configured TTL; any mutation
    /// invalidates it immediately. Filtered counts are always recomputed.
    pub fn total_count(&self, search: Option<&str>) -> usize {
        let snapshot = self.snapshot.load();

        if let Some(term) = normalize_search(search) {
            return snapshot.matching(Some(term)).len();
        }

        let now = self.clock.now();
        if let Some(cached) = self.count_cache.load().as_deref() {
            if cached.generation == snapshot.generation && now - cached.computed_at < self.count_ttl
            {
                self.count_cache_hits.fetch_add(1, Ordering::Relaxed);
                return cached.value;
            }
        }

        self.count_cache_misses.fetch_add(1, Ordering::Relaxed);
        let value = snapshot.entries.len();
        self.count_cache.store(Some(Arc::new(CachedCount {
            generation: snapshot.generation,
            value,
            computed_at: now,
        })));
        value
    }

    pub fn stats(&self) -> StoreStats {
        let snapshot = self.snapshot.load();
        StoreStats {
            entries: snapshot.entries.len(),
            generation: snapshot.generation,
            count_cache_hits: self.count_cache_hits.load(Ordering::Relaxed),
            count_cache_misses: self.count_cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Words currently held by the name index.
    pub fn indexed_word_count(&self) -> usize {
        self.snapshot.load().names.word_count()
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        // The guarded value is `()`, so a poisoned lock carries no broken state.
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `next` and invalidate the cached count. Caller holds the writer lock.
    fn commit(&self, mut next: Snapshot) {
        next.generation += 1;
        self.snapshot.store(Arc::new(next));
        self.count_cache.store(None);
    }
}

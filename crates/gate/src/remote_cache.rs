//! Consumer-side copy of the blocklist.
//!
//! Built purely from propagated events. Temporary blocks carry their absolute
//! expiry, so an entry stops counting as blocked at that instant even if the
//! matching unblock event is late or lost.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use countryguard_blocklist::CountryCode;
use countryguard_core::{Clock, DomainResult};
use countryguard_events::{
    CountryBlockedIntegrationEvent, CountryUnblockedIntegrationEvent, IntegrationEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBlock {
    pub country_name: String,
    pub blocked_at: DateTime<Utc>,
    /// `None` means blocked until an unblock arrives.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedBlock {
    fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

pub struct RemoteBlockCache {
    entries: RwLock<HashMap<CountryCode, CachedBlock>>,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for RemoteBlockCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RemoteBlockCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl RemoteBlockCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Upsert; the most recently applied event wins.
    ///
    /// Only a temporary block with an expiry is bounded. A permanent block stays
    /// until an unblock arrives, whatever `expires_at` says.
    pub fn on_blocked(&self, event: &CountryBlockedIntegrationEvent) -> DomainResult<()> {
        let code = CountryCode::parse(&event.country_code)?;
        let block = CachedBlock {
            country_name: event.country_name.clone(),
            blocked_at: event.blocked_at,
            expires_at: event.expires_at.filter(|_| event.is_temporary),
        };

        debug!(country_code = %code, expires_at = ?block.expires_at, "caching block");
        self.write().insert(code, block);
        Ok(())
    }

    /// Drop the entry. Unknown codes are a no-op.
    pub fn on_unblocked(&self, event: &CountryUnblockedIntegrationEvent) -> DomainResult<()> {
        let code = CountryCode::parse(&event.country_code)?;
        if self.write().remove(&code).is_some() {
            debug!(country_code = %code, "evicted unblocked country");
        }
        Ok(())
    }

    /// Apply any integration event; events that do not affect blocks are ignored.
    pub fn apply(&self, event: &IntegrationEvent) -> DomainResult<()> {
        match event {
            IntegrationEvent::CountryBlocked(e) => self.on_blocked(e),
            IntegrationEvent::CountryUnblocked(e) => self.on_unblocked(e),
            IntegrationEvent::AccessAttempted(_) => Ok(()),
        }
    }

    /// Blocked right now; expiry is evaluated at read time.
    pub fn is_blocked(&self, code: &CountryCode) -> bool {
        let now = self.clock.now();
        self.read()
            .get(code)
            .is_some_and(|block| block.is_active_at(now))
    }

    pub fn get(&self, code: &CountryCode) -> Option<CachedBlock> {
        self.read().get(code).cloned()
    }

    /// Remove entries whose expiry has passed. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, block| block.is_active_at(now));
        before - entries.len()
    }

    /// Entries held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<CountryCode, CachedBlock>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<CountryCode, CachedBlock>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

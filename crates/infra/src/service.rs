//! Command and query entry points of the authoritative blocklist.
//!
//! Every command follows the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Normalize + validate the country code
//!   ↓
//! 2. Existence check against the store
//!   ↓
//! 3. Domain transition (pure, produces events)
//!   ↓
//! 4. Commit to the BlockStore (atomic check-then-act)
//!   ↓
//! 5. Route the transition's events (local subscribers, then transport)
//! ```
//!
//! State is committed before anything is published. If routing fails the caller
//! gets [`CommandError::Propagation`] carrying the committed view: the local
//! mutation stands and only downstream caches lag behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use countryguard_blocklist::{BlockEntry, BlockEvent, CountryCode};
use countryguard_core::{Clock, DomainError, DomainResult, Entity};
use countryguard_events::{EventBus, IntegrationEvent};

use crate::block_store::BlockStore;
use crate::event_router::{EventRouter, PropagationError};

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCountry {
    pub country_code: String,
    pub country_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCountryTemporarily {
    pub country_code: String,
    pub country_name: String,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnblockCountry {
    pub country_code: String,
}

/// Query for one page of blocked countries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListBlocked {
    /// 1-based; 0 is read as 1.
    pub page_number: usize,
    pub page_size: usize,
    pub search: Option<String>,
}

impl Default for ListBlocked {
    fn default() -> Self {
        Self {
            page_number: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search: None,
        }
    }
}

/// Public projection of a [`BlockEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedCountryView {
    pub id: String,
    pub country_code: String,
    pub country_name: String,
    pub blocked_at: DateTime<Utc>,
    pub is_temporary: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
}

impl BlockedCountryView {
    pub fn from_entry(entry: &BlockEntry, now: DateTime<Utc>) -> Self {
        Self {
            id: entry.id().to_string(),
            country_code: entry.country_code().to_string(),
            country_name: entry.country_name().to_string(),
            blocked_at: entry.blocked_at(),
            is_temporary: entry.is_temporary(),
            expires_at: entry.expires_at(),
            is_expired: entry.is_expired_at(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub page_number: usize,
    pub page_size: usize,
    pub total_count: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnblockOutcome {
    Unblocked(BlockedCountryView),
    /// The code was not blocked. Not an error.
    NotFound,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The mutation was committed but some of its events were not published.
    #[error("{country_code} committed but not fully propagated: {source}")]
    Propagation {
        country_code: String,
        view: Box<BlockedCountryView>,
        #[source]
        source: PropagationError,
    },
}

impl CommandError {
    /// The committed view, when the mutation itself succeeded.
    pub fn committed_view(&self) -> Option<&BlockedCountryView> {
        match self {
            CommandError::Propagation { view, .. } => Some(&**view),
            CommandError::Domain(_) => None,
        }
    }
}

pub struct BlocklistService<B> {
    store: Arc<BlockStore>,
    router: Arc<EventRouter<B>>,
    clock: Arc<dyn Clock>,
}

impl<B> Clone for BlocklistService<B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            router: self.router.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<B> BlocklistService<B>
where
    B: EventBus<IntegrationEvent>,
{
    pub fn new(store: Arc<BlockStore>, router: Arc<EventRouter<B>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            router,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<BlockStore> {
        &self.store
    }

    pub fn block(&self, cmd: BlockCountry) -> Result<BlockedCountryView, CommandError> {
        let code = self.absent_code(&cmd.country_code)?;
        let transition = BlockEntry::block(code, &cmd.country_name, self.clock.now())?;
        self.commit_block(transition.into_parts())
    }

    pub fn block_temporarily(
        &self,
        cmd: BlockCountryTemporarily,
    ) -> Result<BlockedCountryView, CommandError> {
        let code = self.absent_code(&cmd.country_code)?;
        let transition = BlockEntry::block_temporarily(
            code,
            &cmd.country_name,
            cmd.duration_minutes,
            self.clock.now(),
        )?;
        self.commit_block(transition.into_parts())
    }

    pub fn unblock(&self, cmd: UnblockCountry) -> Result<UnblockOutcome, CommandError> {
        let code = CountryCode::parse(&cmd.country_code)?;
        let Some(entry) = self.store.get(&code) else {
            return Ok(UnblockOutcome::NotFound);
        };

        let now = self.clock.now();
        let (entry, events) = entry.unblock(now).into_parts();

        // A concurrent unblock (or the reconciler) may have won the race.
        if self.store.remove_entry(&entry).is_none() {
            return Ok(UnblockOutcome::NotFound);
        }

        let view = BlockedCountryView::from_entry(&entry, now);
        info!(country_code = %code, "country unblocked");

        self.route(events, view).map(UnblockOutcome::Unblocked)
    }

    pub fn get_by_code(&self, country_code: &str) -> DomainResult<Option<BlockedCountryView>> {
        let code = CountryCode::parse(country_code)?;
        let now = self.clock.now();
        Ok(self
            .store
            .get(&code)
            .map(|entry| BlockedCountryView::from_entry(&entry, now)))
    }

    pub fn list(&self, query: ListBlocked) -> PagedResult<BlockedCountryView> {
        let page_number = query.page_number.max(1);
        let search = query.search.as_deref();
        let now = self.clock.now();

        let items = self
            .store
            .page(page_number, query.page_size, search)
            .iter()
            .map(|entry| BlockedCountryView::from_entry(entry, now))
            .collect();
        let total_count = self.store.total_count(search);
        let total_pages = if query.page_size == 0 {
            0
        } else {
            total_count.div_ceil(query.page_size)
        };

        PagedResult {
            items,
            page_number,
            page_size: query.page_size,
            total_count,
            total_pages,
        }
    }

    fn absent_code(&self, raw: &str) -> DomainResult<CountryCode> {
        let code = CountryCode::parse(raw)?;
        if self.store.exists(&code) {
            return Err(DomainError::duplicate_block(code.as_str()));
        }
        Ok(code)
    }

    fn commit_block(
        &self,
        (entry, events): (BlockEntry, Vec<BlockEvent>),
    ) -> Result<BlockedCountryView, CommandError> {
        let view = BlockedCountryView::from_entry(&entry, self.clock.now());
        self.store.add(entry)?;

        info!(
            country_code = %view.country_code,
            is_temporary = view.is_temporary,
            expires_at = ?view.expires_at,
            "country blocked"
        );

        self.route(events, view)
    }

    fn route(
        &self,
        events: Vec<BlockEvent>,
        view: BlockedCountryView,
    ) -> Result<BlockedCountryView, CommandError> {
        match self.router.route(&events) {
            Ok(()) => Ok(view),
            Err(source) => Err(CommandError::Propagation {
                country_code: view.country_code.clone(),
                view: Box::new(view),
                source,
            }),
        }
    }
}

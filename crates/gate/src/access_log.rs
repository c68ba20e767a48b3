//! In-memory audit trail of access decisions.

use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use countryguard_events::{AccessAttempted, IntegrationEvent};

pub const DEFAULT_LOG_PAGE_SIZE: usize = 50;

/// One page of attempts, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogPage {
    pub items: Vec<AccessAttempted>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
pub struct AccessLog {
    entries: RwLock<Vec<AccessAttempted>>,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, attempt: AccessAttempted) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(attempt);
    }

    /// Record access attempts; other events are ignored.
    pub fn apply(&self, event: &IntegrationEvent) {
        if let IntegrationEvent::AccessAttempted(attempt) = event {
            self.record(attempt.clone());
        }
    }

    /// 1-based page ordered by `attempted_at` descending, plus the overall total.
    ///
    /// A `page_size` of zero falls back to [`DEFAULT_LOG_PAGE_SIZE`].
    pub fn page(&self, page: usize, page_size: usize) -> AccessLogPage {
        let page = page.max(1);
        let page_size = if page_size == 0 {
            DEFAULT_LOG_PAGE_SIZE
        } else {
            page_size
        };
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        let mut sorted: Vec<&AccessAttempted> = entries.iter().collect();
        // Stable sort: equal timestamps keep arrival order.
        sorted.sort_by(|a, b| b.attempted_at.cmp(&a.attempted_at));

        let items = sorted
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect();

        AccessLogPage {
            items,
            page,
            page_size,
            total: entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

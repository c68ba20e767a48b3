//! Integration events meant for external consumers / message brokers.
//!
//! These are the only messages that leave the authoritative process. They are
//! flat, carry plain strings for country codes, and contain no identity internal
//! to the authority, so its domain model can change without breaking consumers.
//!
//! Wire format is JSON with camelCase fields and a `type` tag:
//!
//! ```json
//! {"type":"CountryBlocked","countryCode":"US","countryName":"United States",
//!  "blockedAt":"2024-01-01T00:00:00Z","isTemporary":false,"expiresAt":null}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Event;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryBlockedIntegrationEvent {
    pub country_code: String,
    pub country_name: String,
    pub blocked_at: DateTime<Utc>,
    pub is_temporary: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryUnblockedIntegrationEvent {
    pub country_code: String,
    pub country_name: String,
    pub unblocked_at: DateTime<Utc>,
}

/// An IP gate decision, recorded for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessAttempted {
    pub ip: String,
    pub country_code: String,
    pub attempted_at: DateTime<Utc>,
    #[serde(default)]
    pub user_agent: Option<String>,
    pub is_blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntegrationEvent {
    CountryBlocked(CountryBlockedIntegrationEvent),
    CountryUnblocked(CountryUnblockedIntegrationEvent),
    AccessAttempted(AccessAttempted),
}

impl IntegrationEvent {
    pub fn country_code(&self) -> &str {
        match self {
            IntegrationEvent::CountryBlocked(e) => &e.country_code,
            IntegrationEvent::CountryUnblocked(e) => &e.country_code,
            IntegrationEvent::AccessAttempted(e) => &e.country_code,
        }
    }
}

impl Event for IntegrationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            IntegrationEvent::CountryBlocked(_) => "integration.country.blocked",
            IntegrationEvent::CountryUnblocked(_) => "integration.country.unblocked",
            IntegrationEvent::AccessAttempted(_) => "integration.access.attempted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            IntegrationEvent::CountryBlocked(e) => e.blocked_at,
            IntegrationEvent::CountryUnblocked(e) => e.unblocked_at,
            IntegrationEvent::AccessAttempted(e) => e.attempted_at,
        }
    }
}

impl From<CountryBlockedIntegrationEvent> for IntegrationEvent {
    fn from(value: CountryBlockedIntegrationEvent) -> Self {
        Self::CountryBlocked(value)
    }
}

impl From<CountryUnblockedIntegrationEvent> for IntegrationEvent {
    fn from(value: CountryUnblockedIntegrationEvent) -> Self {
        Self::CountryUnblocked(value)
    }
}

impl From<AccessAttempted> for IntegrationEvent {
    fn from(value: AccessAttempted) -> Self {
        Self::AccessAttempted(value)
    }
}

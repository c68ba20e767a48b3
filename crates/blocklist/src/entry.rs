use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use countryguard_core::{BlockId, DomainError, DomainResult, Entity};
use countryguard_events::{
    CountryBlockedIntegrationEvent, CountryUnblockedIntegrationEvent, Event, IntegrationEvent,
};

use crate::CountryCode;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 100;

/// Longest temporary block, in minutes (24h).
pub const MAX_BLOCK_MINUTES: i64 = 1440;

/// Aggregate root: one country's block.
///
/// `expires_at` is the single source of the "temporary" flag, so an entry can
/// never be temporary without an expiry or permanent with one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    id: BlockId,
    country_code: CountryCode,
    country_name: String,
    blocked_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

/// Result of a state transition: the resulting state plus the events it produced.
///
/// Events live only here, never inside the aggregate, so they cannot be forgotten
/// in a buffer or delivered twice from it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "the events of a transition must be routed"]
pub struct Transition<S> {
    state: S,
    events: Vec<BlockEvent>,
}

impl<S> Transition<S> {
    fn new(state: S, events: Vec<BlockEvent>) -> Self {
        Self { state, events }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn events(&self) -> &[BlockEvent] {
        &self.events
    }

    pub fn into_parts(self) -> (S, Vec<BlockEvent>) {
        (self.state, self.events)
    }
}

impl BlockEntry {
    /// Block a country indefinitely.
    pub fn block(
        country_code: CountryCode,
        country_name: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Transition<BlockEntry>> {
        let country_name = validate_name(country_name)?;
        Ok(Self::create(country_code, country_name, now, None))
    }

    /// Block a country for `duration_minutes` (1..=1440).
    pub fn block_temporarily(
        country_code: CountryCode,
        country_name: &str,
        duration_minutes: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Transition<BlockEntry>> {
        if !(1..=MAX_BLOCK_MINUTES).contains(&duration_minutes) {
            return Err(DomainError::InvalidDuration(duration_minutes));
        }
        let country_name = validate_name(country_name)?;
        let expires_at = now + Duration::minutes(duration_minutes);
        Ok(Self::create(country_code, country_name, now, Some(expires_at)))
    }

    /// Lift the block.
    ///
    /// Stored fields are left untouched; the caller removes the entry from the
    /// store and routes the returned unblock event.
    pub fn unblock(self, now: DateTime<Utc>) -> Transition<BlockEntry> {
        let event = BlockEvent::CountryUnblocked(CountryUnblocked {
            block_id: self.id,
            country_code: self.country_code.clone(),
            country_name: self.country_name.clone(),
            unblocked_at: now,
        });
        Transition::new(self, vec![event])
    }

    fn create(
        country_code: CountryCode,
        country_name: String,
        blocked_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Transition<BlockEntry> {
        let entry = BlockEntry {
            id: BlockId::new(),
            country_code,
            country_name,
            blocked_at,
            expires_at,
        };
        let event = BlockEvent::CountryBlocked(CountryBlocked {
            block_id: entry.id,
            country_code: entry.country_code.clone(),
            country_name: entry.country_name.clone(),
            blocked_at: entry.blocked_at,
            expires_at: entry.expires_at,
        });
        Transition::new(entry, vec![event])
    }

    pub fn id_typed(&self) -> BlockId {
        self.id
    }

    pub fn country_code(&self) -> &CountryCode {
        &self.country_code
    }

    pub fn country_name(&self) -> &str {
        &self.country_name
    }

    pub fn blocked_at(&self) -> DateTime<Utc> {
        self.blocked_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_temporary(&self) -> bool {
        self.expires_at.is_some()
    }

    /// A temporary block whose expiry is at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl Entity for BlockEntry {
    type Id = BlockId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn validate_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::invalid_name("country name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::invalid_name(format!(
            "country name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Event: CountryBlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryBlocked {
    pub block_id: BlockId,
    pub country_code: CountryCode,
    pub country_name: String,
    pub blocked_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Event: CountryUnblocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryUnblocked {
    pub block_id: BlockId,
    pub country_code: CountryCode,
    pub country_name: String,
    pub unblocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockEvent {
    CountryBlocked(CountryBlocked),
    CountryUnblocked(CountryUnblocked),
}

impl BlockEvent {
    pub fn country_code(&self) -> &CountryCode {
        match self {
            BlockEvent::CountryBlocked(e) => &e.country_code,
            BlockEvent::CountryUnblocked(e) => &e.country_code,
        }
    }

    /// Project onto the consumer-facing contract (drops `block_id`).
    pub fn to_integration_event(&self) -> IntegrationEvent {
        match self {
            BlockEvent::CountryBlocked(e) => {
                IntegrationEvent::CountryBlocked(CountryBlockedIntegrationEvent {
                    country_code: e.country_code.to_string(),
                    country_name: e.country_name.clone(),
                    blocked_at: e.blocked_at,
                    is_temporary: e.expires_at.is_some(),
                    expires_at: e.expires_at,
                })
            }
            BlockEvent::CountryUnblocked(e) => {
                IntegrationEvent::CountryUnblocked(CountryUnblockedIntegrationEvent {
                    country_code: e.country_code.to_string(),
                    country_name: e.country_name.clone(),
                    unblocked_at: e.unblocked_at,
                })
            }
        }
    }
}

impl Event for BlockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BlockEvent::CountryBlocked(_) => "blocklist.country.blocked",
            BlockEvent::CountryUnblocked(_) => "blocklist.country.unblocked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BlockEvent::CountryBlocked(e) => e.blocked_at,
            BlockEvent::CountryUnblocked(e) => e.unblocked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn us() -> CountryCode {
        CountryCode::parse("US").unwrap()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn block_emits_country_blocked_event() {
        let now = test_time();
        let (entry, events) = BlockEntry::block(us(), "United States", now).unwrap().into_parts();

        assert!(!entry.is_temporary());
        assert_eq!(entry.expires_at(), None);
        assert_eq!(entry.blocked_at(), now);
        assert_eq!(events.len(), 1);

        match &events[0] {
            BlockEvent::CountryBlocked(e) => {
                assert_eq!(e.block_id, entry.id_typed());
                assert_eq!(e.country_code, us());
                assert_eq!(e.country_name, "United States");
                assert_eq!(e.expires_at, None);
            }
            _ => panic!("Expected CountryBlocked event"),
        }
    }

    #[test]
    fn block_rejects_empty_name() {
        let err = BlockEntry::block(us(), "   ", test_time()).unwrap_err();
        match err {
            DomainError::InvalidName(_) => {}
            _ => panic!("Expected InvalidName error for empty name"),
        }
    }

    #[test]
    fn block_rejects_overlong_name() {
        let name = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            BlockEntry::block(us(), &name, test_time()),
            Err(DomainError::InvalidName(_))
        ));

        let name = "x".repeat(MAX_NAME_LEN);
        assert!(BlockEntry::block(us(), &name, test_time()).is_ok());
    }

    #[test]
    fn temporary_block_duration_bounds() {
        let now = test_time();

        for bad in [0, 1441, -5] {
            match BlockEntry::block_temporarily(us(), "United States", bad, now) {
                Err(DomainError::InvalidDuration(d)) => assert_eq!(d, bad),
                other => panic!("Expected InvalidDuration for {bad}, got {other:?}"),
            }
        }

        let t = BlockEntry::block_temporarily(us(), "United States", 1440, now).unwrap();
        assert!(t.state().is_temporary());
        assert_eq!(t.state().expires_at(), Some(now + Duration::minutes(1440)));
    }

    #[test]
    fn temporary_block_event_carries_expiry() {
        let now = test_time();
        let (entry, events) = BlockEntry::block_temporarily(us(), "United States", 30, now)
            .unwrap()
            .into_parts();

        match &events[0] {
            BlockEvent::CountryBlocked(e) => assert_eq!(e.expires_at, entry.expires_at()),
            _ => panic!("Expected CountryBlocked event"),
        }
    }

    #[test]
    fn unblock_keeps_fields_and_emits_unblocked_event() {
        let now = test_time();
        let (entry, _) = BlockEntry::block(us(), "United States", now).unwrap().into_parts();
        let before = entry.clone();

        let later = now + Duration::minutes(5);
        let (after, events) = entry.unblock(later).into_parts();

        assert_eq!(after, before);
        assert_eq!(events.len(), 1);
        match &events[0] {
            BlockEvent::CountryUnblocked(e) => {
                assert_eq!(e.block_id, before.id_typed());
                assert_eq!(e.unblocked_at, later);
            }
            _ => panic!("Expected CountryUnblocked event"),
        }
    }

    #[test]
    fn expiry_is_inclusive_and_never_applies_to_permanent_blocks() {
        let now = test_time();
        let temp = BlockEntry::block_temporarily(us(), "United States", 10, now)
            .unwrap()
            .into_parts()
            .0;
        assert!(!temp.is_expired_at(now + Duration::minutes(9)));
        assert!(temp.is_expired_at(now + Duration::minutes(10)));

        let perm = BlockEntry::block(us(), "United States", now).unwrap().into_parts().0;
        assert!(!perm.is_expired_at(now + Duration::days(365)));
    }

    #[test]
    fn integration_projection_drops_internal_identity() {
        let now = test_time();
        let (_, events) = BlockEntry::block_temporarily(us(), "United States", 60, now)
            .unwrap()
            .into_parts();

        match events[0].to_integration_event() {
            IntegrationEvent::CountryBlocked(e) => {
                assert_eq!(e.country_code, "US");
                assert!(e.is_temporary);
                assert_eq!(e.expires_at, Some(now + Duration::minutes(60)));
            }
            other => panic!("Expected CountryBlocked integration event, got {other:?}"),
        }
    }

    proptest! {
        /// Property: every accepted duration yields expires_at strictly after blocked_at,
        /// exactly `minutes` later.
        #[test]
        fn accepted_durations_expire_after_blocking(minutes in 1i64..=MAX_BLOCK_MINUTES) {
            let now = test_time();
            let entry = BlockEntry::block_temporarily(us(), "United States", minutes, now)
                .unwrap()
                .into_parts()
                .0;
            let expires_at = entry.expires_at().unwrap();
            prop_assert!(expires_at > entry.blocked_at());
            prop_assert_eq!(expires_at - entry.blocked_at(), Duration::minutes(minutes));
        }

        #[test]
        fn out_of_range_durations_are_rejected(
            minutes in prop_oneof![i64::MIN..=0i64, (MAX_BLOCK_MINUTES + 1)..=i64::MAX]
        ) {
            prop_assert!(matches!(
                BlockEntry::block_temporarily(us(), "United States", minutes, test_time()),
                Err(DomainError::InvalidDuration(_))
            ));
        }
    }
}

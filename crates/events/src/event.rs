use chrono::{DateTime, Utc};

/// Common surface of every event, domain or integration.
///
/// An event is an immutable fact produced by exactly one state transition.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name, e.g. `"blocklist.country.blocked"`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version.
    fn version(&self) -> u32;

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;
}

//! Consumer side of the blocklist: the gate that turns IP addresses into
//! allow/deny decisions.
//!
//! - [`RemoteBlockCache`]: eventually consistent copy of the blocklist, fed by
//!   propagated events
//! - [`EventConsumer`]: background worker applying bus events to the cache and
//!   the access log
//! - [`AccessGate`]: geolocate, decide, audit
//! - [`AccessLog`]: newest-first audit trail of decisions

pub mod access;
pub mod access_log;
pub mod consumer;
pub mod geo;
pub mod remote_cache;

pub use access::{AccessDecision, AccessGate};
pub use access_log::{AccessLog, AccessLogPage};
pub use consumer::{ConsumerStats, EventConsumer, WorkerHandle};
pub use geo::{GeoError, GeoLocation, GeoLookup, StaticGeoLookup};
pub use remote_cache::{CachedBlock, RemoteBlockCache};

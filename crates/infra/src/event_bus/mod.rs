//! Transport implementations for integration events.
//!
//! The bus abstraction lives in `countryguard-events`. The in-memory bus there
//! covers single-process deployments and tests; this module adds network-backed
//! transports behind cargo features.

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisBusError, RedisPubSubEventBus};

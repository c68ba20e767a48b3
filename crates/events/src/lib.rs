//! Domain & integration event mechanics.
//!
//! - [`Event`]: contract every domain event implements.
//! - [`EventBus`] / [`Subscription`]: transport-agnostic pub/sub used to carry
//!   integration events across process boundaries.
//! - [`integration`]: the serialization-stable events consumers see.

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod integration;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use integration::{
    AccessAttempted, CountryBlockedIntegrationEvent, CountryUnblockedIntegrationEvent,
    IntegrationEvent,
};

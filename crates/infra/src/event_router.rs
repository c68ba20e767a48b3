//! Fan-out of committed domain events.
//!
//! Every event a committed mutation produced goes two ways:
//!
//! ```text
//! BlockEvent ─┬─ local subscribers (in-process, synchronous)
//!             └─ integration event → RetryingPublisher → EventBus
//! ```
//!
//! Local dispatch and transport publication are separate steps: a broken local
//! subscriber is logged and never blocks publication, and publication failures
//! are collected per event instead of aborting the remaining events.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, warn};

use countryguard_blocklist::BlockEvent;
use countryguard_events::{Event, EventBus, IntegrationEvent};

use crate::publisher::{PublishError, RetryingPublisher};

/// In-process consumer of domain events.
pub trait LocalSubscriber: Send + Sync {
    fn name(&self) -> &str;

    fn handle(&self, event: &BlockEvent) -> anyhow::Result<()>;
}

/// Adapts a closure into a [`LocalSubscriber`].
pub struct FnSubscriber<F> {
    name: String,
    f: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&BlockEvent) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> LocalSubscriber for FnSubscriber<F>
where
    F: Fn(&BlockEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &BlockEvent) -> anyhow::Result<()> {
        (self.f)(event)
    }
}

/// An event that never reached the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct UndeliveredEvent {
    pub event: IntegrationEvent,
    pub error: PublishError,
}

/// Some committed events could not be published.
///
/// The mutation that produced them has already been applied; only downstream
/// caches are stale.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{} of {total} event(s) could not be published", .failures.len())]
pub struct PropagationError {
    pub failures: Vec<UndeliveredEvent>,
    pub total: usize,
}

pub struct EventRouter<B> {
    subscribers: Vec<Arc<dyn LocalSubscriber>>,
    publisher: RetryingPublisher<B>,
}

impl<B> EventRouter<B>
where
    B: EventBus<IntegrationEvent>,
{
    pub fn new(publisher: RetryingPublisher<B>) -> Self {
        Self {
            subscribers: Vec::new(),
            publisher,
        }
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn LocalSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    pub fn publisher(&self) -> &RetryingPublisher<B> {
        &self.publisher
    }

    /// Deliver `events` in order to local subscribers, then to the transport.
    pub fn route(&self, events: &[BlockEvent]) -> Result<(), PropagationError> {
        let mut failures = Vec::new();

        for event in events {
            self.dispatch_local(event);

            let integration = event.to_integration_event();
            if let Err(e) = self.publisher.publish(&integration) {
                error!(
                    event_type = integration.event_type(),
                    country_code = integration.country_code(),
                    error = %e,
                    "integration event not published"
                );
                failures.push(UndeliveredEvent {
                    event: integration,
                    error: e,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PropagationError {
                failures,
                total: events.len(),
            })
        }
    }

    fn dispatch_local(&self, event: &BlockEvent) {
        for sub in &self.subscribers {
            match catch_unwind(AssertUnwindSafe(|| sub.handle(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    subscriber = sub.name(),
                    event_type = event.event_type(),
                    country_code = %event.country_code(),
                    error = %e,
                    "local subscriber failed"
                ),
                Err(_) => error!(
                    subscriber = sub.name(),
                    event_type = event.event_type(),
                    country_code = %event.country_code(),
                    "local subscriber panicked"
                ),
            }
        }
    }
}

//! Publishing integration events with retry.

use thiserror::Error;
use tracing::{debug, warn};

use countryguard_events::{Event, EventBus, IntegrationEvent};

use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("publish failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    /// Shutdown was requested while waiting to retry.
    #[error("publish cancelled by shutdown after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

/// Wraps a bus so transient transport failures are retried with backoff.
///
/// The backoff wait is interruptible: once the shutdown signal fires, pending
/// retries give up instead of delaying process exit.
pub struct RetryingPublisher<B> {
    bus: B,
    policy: RetryPolicy,
    shutdown: ShutdownSignal,
}

impl<B> RetryingPublisher<B>
where
    B: EventBus<IntegrationEvent>,
{
    pub fn new(bus: B, policy: RetryPolicy) -> Self {
        Self {
            bus,
            policy,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Publish `event`, returning the number of attempts it took.
    pub fn publish(&self, event: &IntegrationEvent) -> Result<u32, PublishError> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            let last_error = match self.bus.publish(event.clone()) {
                Ok(()) => {
                    debug!(
                        event_type = event.event_type(),
                        country_code = event.country_code(),
                        attempts,
                        "published integration event"
                    );
                    return Ok(attempts);
                }
                Err(e) => format!("{e:?}"),
            };

            if !self.policy.should_retry(attempts) {
                return Err(PublishError::Exhausted {
                    attempts,
                    last_error,
                });
            }

            let delay = self.policy.delay_for_attempt(attempts);
            warn!(
                event_type = event.event_type(),
                country_code = event.country_code(),
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "publish failed, retrying"
            );

            if self.shutdown.wait_timeout(delay) {
                return Err(PublishError::Cancelled { attempts });
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicU32, Ordering};

    use countryguard_events::{EventBus, InMemoryEventBus, IntegrationEvent, Subscription};

    /// Bus that fails the first `failures` publishes, then forwards to an in-memory bus.
    pub struct FlakyBus {
        remaining_failures: AtomicU32,
        attempts: AtomicU32,
        pub inner: InMemoryEventBus<IntegrationEvent>,
    }

    impl FlakyBus {
        pub fn failing(failures: u32) -> Self {
            Self {
                remaining_failures: AtomicU32::new(failures),
                attempts: AtomicU32::new(0),
                inner: InMemoryEventBus::new(),
            }
        }

        pub fn always_failing() -> Self {
            Self::failing(u32::MAX)
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl EventBus<IntegrationEvent> for FlakyBus {
        type Error = String;

        fn publish(&self, message: IntegrationEvent) -> Result<(), Self::Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failed = self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err("connection refused".to_string());
            }
            self.inner.publish(message).map_err(|e| e.to_string())
        }

        fn subscribe(&self) -> Subscription<IntegrationEvent> {
            self.inner.subscribe()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use countryguard_events::CountryUnblockedIntegrationEvent;

    use super::test_support::FlakyBus;
    use super::*;

    fn event() -> IntegrationEvent {
        CountryUnblockedIntegrationEvent {
            country_code: "US".to_string(),
            country_name: "United States".to_string(),
            unblocked_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
        .into()
    }

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn transient_failures_are_retried() {
        let publisher = RetryingPublisher::new(FlakyBus::failing(2), quick(5));
        let sub = publisher.bus().subscribe();

        assert_eq!(publisher.publish(&event()).unwrap(), 3);
        assert_eq!(sub.try_recv().unwrap(), event());
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let publisher = RetryingPublisher::new(FlakyBus::always_failing(), quick(3));

        match publisher.publish(&event()).unwrap_err() {
            PublishError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("connection refused"));
            }
            other => panic!("Expected Exhausted, got {other:?}"),
        }
        assert_eq!(publisher.bus().attempts(), 3);
    }

    #[test]
    fn shutdown_cancels_pending_retries() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let publisher = RetryingPublisher::new(
            FlakyBus::always_failing(),
            RetryPolicy::fixed(10, Duration::from_secs(60)),
        )
        .with_shutdown(shutdown);

        assert_eq!(
            publisher.publish(&event()).unwrap_err(),
            PublishError::Cancelled { attempts: 1 }
        );
    }
}

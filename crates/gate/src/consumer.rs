use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use countryguard_events::{Event, EventBus, IntegrationEvent, Subscription};

use crate::access_log::AccessLog;
use crate::remote_cache::RemoteBlockCache;

/// Counters shared between a worker and its handle.
#[derive(Debug, Default)]
struct Counters {
    applied: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ConsumerStats {
    pub applied: u64,
    pub failed: u64,
}

/// Handle to control and join a background consumer.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        ConsumerStats {
            applied: self.counters.applied.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

/// Background loop applying integration events from a bus.
///
/// - Subscribes before the thread starts, so nothing published after `spawn`
///   returns is missed
/// - The handler must be idempotent (delivery is at-least-once)
/// - A failing handler is logged and the loop moves on
#[derive(Debug)]
pub struct EventConsumer;

impl EventConsumer {
    pub fn spawn<B, H, E>(name: &str, bus: &B, mut handler: H) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<IntegrationEvent>,
        H: FnMut(&IntegrationEvent) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();
        let counters = Arc::new(Counters::default());
        let worker_counters = counters.clone();
        let worker_name = name.to_string();

        let join = thread::Builder::new().name(name.to_string()).spawn(move || {
            consume_loop(&worker_name, sub, shutdown_rx, &worker_counters, &mut handler)
        })?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            counters,
        })
    }

    /// Keep `cache` and `log` in sync with the bus.
    pub fn spawn_gate_consumer<B>(
        bus: &B,
        cache: Arc<RemoteBlockCache>,
        log: Arc<AccessLog>,
    ) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<IntegrationEvent>,
    {
        Self::spawn("gate-consumer", bus, move |event| {
            log.apply(event);
            cache.apply(event)
        })
    }
}

fn consume_loop<H, E>(
    name: &str,
    sub: Subscription<IntegrationEvent>,
    shutdown_rx: mpsc::Receiver<()>,
    counters: &Counters,
    handler: &mut H,
) where
    H: FnMut(&IntegrationEvent) -> Result<(), E>,
    E: core::fmt::Display,
{
    let tick = Duration::from_millis(250);
    info!(worker = name, "consumer started");

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(event) => match handler(&event) {
                Ok(()) => {
                    counters.applied.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        worker = name,
                        event_type = event.event_type(),
                        country_code = event.country_code(),
                        "event applied"
                    );
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        worker = name,
                        event_type = event.event_type(),
                        error = %err,
                        "consumer handler failed"
                    );
                }
            },
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(worker = name, "consumer stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use chrono::{DateTime, Utc};
    use countryguard_blocklist::CountryCode;
    use countryguard_core::{Clock, ManualClock};
    use countryguard_events::{
        AccessAttempted, CountryBlockedIntegrationEvent, CountryUnblockedIntegrationEvent,
        InMemoryEventBus,
    };

    use super::*;

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn blocked(code: &str, at: DateTime<Utc>) -> IntegrationEvent {
        CountryBlockedIntegrationEvent {
            country_code: code.to_string(),
            country_name: "Somewhere".to_string(),
            blocked_at: at,
            is_temporary: false,
            expires_at: None,
        }
        .into()
    }

    #[test]
    fn gate_consumer_applies_blocks_unblocks_and_attempts() {
        let clock = Arc::new(ManualClock::default());
        let bus = Arc::new(InMemoryEventBus::<IntegrationEvent>::new());
        let cache = Arc::new(RemoteBlockCache::new(clock.clone()));
        let log = Arc::new(AccessLog::new());
        let handle = EventConsumer::spawn_gate_consumer(&bus, cache.clone(), log.clone()).unwrap();
        let now = clock.now();
        let us = CountryCode::parse("US").unwrap();

        bus.publish(blocked("US", now)).unwrap();
        assert!(wait_until(|| cache.is_blocked(&us)));

        bus.publish(
            AccessAttempted {
                ip: "203.0.113.7".to_string(),
                country_code: "US".to_string(),
                attempted_at: now,
                user_agent: None,
                is_blocked: true,
            }
            .into(),
        )
        .unwrap();
        bus.publish(
            CountryUnblockedIntegrationEvent {
                country_code: "US".to_string(),
                country_name: "Somewhere".to_string(),
                unblocked_at: now,
            }
            .into(),
        )
        .unwrap();

        assert!(wait_until(|| handle.stats().applied == 3));
        assert!(!cache.is_blocked(&us));
        assert_eq!(log.len(), 1);
        handle.shutdown();
    }

    #[test]
    fn handler_failures_are_counted_and_the_loop_continues() {
        let clock = Arc::new(ManualClock::default());
        let bus = Arc::new(InMemoryEventBus::<IntegrationEvent>::new());
        let cache = Arc::new(RemoteBlockCache::new(clock.clone()));
        let handle =
            EventConsumer::spawn_gate_consumer(&bus, cache.clone(), Arc::new(AccessLog::new()))
                .unwrap();

        bus.publish(blocked("USA", clock.now())).unwrap();
        bus.publish(blocked("DE", clock.now())).unwrap();

        assert!(wait_until(|| handle.stats().applied == 1));
        assert_eq!(handle.stats().failed, 1);
        assert!(cache.is_blocked(&CountryCode::parse("DE").unwrap()));
        handle.shutdown();
    }
}

//! Background expiry of temporary blocks.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use countryguard_core::Clock;
use countryguard_events::{EventBus, IntegrationEvent};

use crate::block_store::BlockStore;
use crate::event_router::EventRouter;
use crate::shutdown::ShutdownSignal;

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Pause between two passes
    pub interval: Duration,
    /// Thread name, also used in logs
    pub name: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            name: "expiry-reconciler".to_string(),
        }
    }
}

impl ReconcilerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Outcome of a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Expired entries seen by the scan
    pub expired: usize,
    /// Entries this pass actually removed
    pub removed: usize,
    /// Removed entries whose events were not fully published
    pub propagation_failures: usize,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReconcilerStats {
    pub passes: u64,
    pub removed: u64,
    pub failed_passes: u64,
    pub uptime_secs: u64,
}

/// Handle to control a running reconciler.
#[derive(Debug)]
pub struct ReconcilerHandle {
    shutdown: ShutdownSignal,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ReconcilerStats>>,
    started: Instant,
}

impl ReconcilerHandle {
    /// Signal the loop to stop and wait for the thread to exit.
    pub fn shutdown(mut self) {
        self.shutdown.trigger();
        if let Some(j) = self.join.take() {
            if j.join().is_err() {
                error!("reconciler thread panicked during shutdown");
            }
        }
    }

    pub fn stats(&self) -> ReconcilerStats {
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        stats.uptime_secs = self.started.elapsed().as_secs();
        stats
    }
}

/// Removes temporary blocks once they expire and propagates the unblock.
pub struct ExpiryReconciler<B> {
    store: Arc<BlockStore>,
    router: Arc<EventRouter<B>>,
    clock: Arc<dyn Clock>,
}

impl<B> ExpiryReconciler<B>
where
    B: EventBus<IntegrationEvent> + 'static,
{
    pub fn new(store: Arc<BlockStore>, router: Arc<EventRouter<B>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            router,
            clock,
        }
    }

    /// Run one pass against `now`.
    ///
    /// An entry is only removed while the store still holds that exact entry, so
    /// a concurrent unblock or re-block is never undone here.
    pub fn run_once(&self, now: DateTime<Utc>) -> ReconcileReport {
        let expired = self.store.list_expired(now);
        let mut report = ReconcileReport {
            expired: expired.len(),
            ..ReconcileReport::default()
        };

        for entry in expired {
            let (entry, events) = entry.unblock(now).into_parts();
            if self.store.remove_entry(&entry).is_none() {
                debug!(country_code = %entry.country_code(), "expired entry already gone");
                continue;
            }
            report.removed += 1;

            match self.router.route(&events) {
                Ok(()) => info!(
                    country_code = %entry.country_code(),
                    expired_at = ?entry.expires_at(),
                    "temporary block expired"
                ),
                Err(e) => {
                    report.propagation_failures += 1;
                    warn!(
                        country_code = %entry.country_code(),
                        error = %e,
                        "expired block removed but unblock not propagated"
                    );
                }
            }
        }

        report
    }

    /// Spawn the reconciler loop on its own thread.
    ///
    /// A pass runs immediately, then once per `interval` until `shutdown` fires.
    pub fn spawn(
        self,
        config: ReconcilerConfig,
        shutdown: ShutdownSignal,
    ) -> std::io::Result<ReconcilerHandle> {
        let stats = Arc::new(Mutex::new(ReconcilerStats::default()));
        let stats_clone = stats.clone();
        let signal = shutdown.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || reconcile_loop(self, config, signal, stats_clone))?;

        Ok(ReconcilerHandle {
            shutdown,
            join: Some(join),
            stats,
            started: Instant::now(),
        })
    }
}

fn reconcile_loop<B>(
    reconciler: ExpiryReconciler<B>,
    config: ReconcilerConfig,
    shutdown: ShutdownSignal,
    stats: Arc<Mutex<ReconcilerStats>>,
) where
    B: EventBus<IntegrationEvent> + 'static,
{
    info!(
        name = %config.name,
        interval_secs = config.interval.as_secs(),
        "reconciler started"
    );

    while !shutdown.is_triggered() {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            reconciler.run_once(reconciler.clock.now())
        }));

        {
            let mut s = stats.lock().unwrap_or_else(PoisonError::into_inner);
            s.passes += 1;
            match &outcome {
                Ok(report) => s.removed += report.removed as u64,
                Err(_) => s.failed_passes += 1,
            }
        }

        match outcome {
            Ok(report) if report.expired > 0 => info!(
                name = %config.name,
                expired = report.expired,
                removed = report.removed,
                propagation_failures = report.propagation_failures,
                "reconcile pass finished"
            ),
            Ok(_) => debug!(name = %config.name, "reconcile pass found nothing"),
            Err(_) => error!(
                name = %config.name,
                "reconcile pass panicked; retrying next interval"
            ),
        }

        if shutdown.wait_timeout(config.interval) {
            break;
        }
    }

    info!(name = %config.name, "reconciler stopped");
}

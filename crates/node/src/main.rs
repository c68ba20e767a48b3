use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use countryguard_core::{Clock, SystemClock};
use countryguard_events::{EventBus, InMemoryEventBus, IntegrationEvent};
use countryguard_gate::{AccessLog, EventConsumer, RemoteBlockCache};
use countryguard_infra::block_store::BlockStore;
use countryguard_infra::config::Config;
use countryguard_infra::event_router::EventRouter;
use countryguard_infra::publisher::RetryingPublisher;
use countryguard_infra::reconciler::{ExpiryReconciler, ReconcilerConfig};
use countryguard_infra::service::BlocklistService;
use countryguard_infra::shutdown::ShutdownSignal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    countryguard_observability::init();

    let config = Config::from_env();
    tracing::info!(
        reconcile_interval_secs = config.reconcile_interval.as_secs(),
        count_cache_ttl_secs = config.count_cache_ttl.as_secs(),
        channel = %config.channel,
        "starting countryguard node"
    );

    match config.redis_url.clone() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let bus = countryguard_infra::event_bus::RedisPubSubEventBus::new(&url, &config.channel)
                .context("failed to open redis transport")?;
            run(bus, config).await
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!(
                "COUNTRYGUARD_REDIS_URL set but built without the redis feature; \
                 using in-memory transport"
            );
            run(Arc::new(InMemoryEventBus::new()), config).await
        }
        None => run(Arc::new(InMemoryEventBus::new()), config).await,
    }
}

async fn run<B>(bus: B, config: Config) -> anyhow::Result<()>
where
    B: EventBus<IntegrationEvent> + Clone + 'static,
{
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let shutdown = ShutdownSignal::new();

    // Authoritative side.
    let store = Arc::new(
        BlockStore::new(clock.clone()).with_count_ttl(config.count_cache_ttl_chrono()),
    );
    let publisher = RetryingPublisher::new(bus.clone(), config.publish_retry.clone())
        .with_shutdown(shutdown.clone());
    let router = Arc::new(EventRouter::new(publisher));
    let service = BlocklistService::new(store.clone(), router.clone(), clock.clone());

    let reconciler = ExpiryReconciler::new(store, router, clock.clone())
        .spawn(
            ReconcilerConfig::default().with_interval(config.reconcile_interval),
            shutdown.clone(),
        )
        .context("failed to spawn reconciler")?;

    // Consumer side.
    let cache = Arc::new(RemoteBlockCache::new(clock));
    let access_log = Arc::new(AccessLog::new());
    let consumer = EventConsumer::spawn_gate_consumer(&bus, cache.clone(), access_log.clone())
        .context("failed to spawn gate consumer")?;

    let sweeper = {
        let cache = cache.clone();
        let interval = config.reconcile_interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = cache.evict_expired();
                if evicted > 0 {
                    tracing::debug!(evicted, "swept expired cache entries");
                }
            }
        })
    };

    tracing::info!(
        blocked = service.list(Default::default()).total_count,
        "node ready; press ctrl-c to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");

    shutdown.trigger();
    sweeper.abort();

    let reconcile_stats = reconciler.stats();
    let consume_stats = consumer.stats();
    tokio::task::spawn_blocking(move || {
        reconciler.shutdown();
        consumer.shutdown();
    })
    .await
    .context("worker shutdown panicked")?;

    tracing::info!(
        reconcile_passes = reconcile_stats.passes,
        expired_removed = reconcile_stats.removed,
        events_applied = consume_stats.applied,
        access_attempts = access_log.len(),
        "countryguard node stopped"
    );
    Ok(())
}

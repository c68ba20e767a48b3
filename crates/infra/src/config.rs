//! Process configuration from environment variables.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::retry::RetryPolicy;

pub const DEFAULT_CHANNEL: &str = "countryguard.blocklist";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub reconcile_interval: Duration,
    pub count_cache_ttl: Duration,
    pub publish_retry: RetryPolicy,
    /// `None` selects the in-memory transport.
    pub redis_url: Option<String>,
    pub channel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(300),
            count_cache_ttl: Duration::from_secs(30),
            publish_retry: RetryPolicy::default(),
            redis_url: None,
            channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let reconcile_interval = Duration::from_secs(parsed(
            &lookup,
            "COUNTRYGUARD_RECONCILE_INTERVAL_SECS",
            defaults.reconcile_interval.as_secs(),
        ));
        let count_cache_ttl = Duration::from_secs(parsed(
            &lookup,
            "COUNTRYGUARD_COUNT_CACHE_TTL_SECS",
            defaults.count_cache_ttl.as_secs(),
        ));
        let publish_retry = RetryPolicy {
            max_attempts: parsed(
                &lookup,
                "COUNTRYGUARD_PUBLISH_MAX_ATTEMPTS",
                defaults.publish_retry.max_attempts,
            ),
            base_delay: Duration::from_millis(parsed(
                &lookup,
                "COUNTRYGUARD_PUBLISH_BASE_DELAY_MS",
                defaults.publish_retry.base_delay.as_millis() as u64,
            )),
            ..defaults.publish_retry
        };

        let redis_url = non_blank(lookup("COUNTRYGUARD_REDIS_URL"));
        let channel = non_blank(lookup("COUNTRYGUARD_CHANNEL")).unwrap_or(defaults.channel);

        Self {
            reconcile_interval,
            count_cache_ttl,
            publish_retry,
            redis_url,
            channel,
        }
    }

    pub fn count_cache_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.count_cache_ttl)
            .unwrap_or(crate::block_store::DEFAULT_COUNT_TTL)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + core::fmt::Display,
{
    let Some(raw) = non_blank(lookup(key)) else {
        return default;
    };
    raw.parse().unwrap_or_else(|_| {
        warn!(key, value = %raw, %default, "invalid config value; using default");
        default
    })
}

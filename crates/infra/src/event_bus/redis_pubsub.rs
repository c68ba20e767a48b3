//! Redis pub/sub transport for integration events.
//!
//! Pub/sub is not durable: a consumer that is offline while an event is
//! published misses it. Temporary blocks still expire on their own in the
//! remote cache because every blocked event carries its absolute expiry.

use std::sync::mpsc;
use std::thread;

use redis::Commands;
use thiserror::Error;
use tracing::{debug, warn};

use countryguard_events::{EventBus, IntegrationEvent, Subscription};

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Publishes and receives [`IntegrationEvent`]s as JSON on one Redis channel.
#[derive(Debug, Clone)]
pub struct RedisPubSubEventBus {
    client: redis::Client,
    channel: String,
}

impl RedisPubSubEventBus {
    pub fn new(
        redis_url: impl AsRef<str>,
        channel: impl Into<String>,
    ) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Decode one channel payload. Foreign or malformed messages yield `None`.
pub(crate) fn decode(payload: &str) -> Option<IntegrationEvent> {
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "dropping undecodable message from channel");
            None
        }
    }
}

impl EventBus<IntegrationEvent> for RedisPubSubEventBus {
    type Error = RedisBusError;

    fn publish(&self, message: IntegrationEvent) -> Result<(), Self::Error> {
        let payload = serde_json::to_string(&message)?;
        let mut conn = self.client.get_connection()?;
        let receivers: i64 = conn.publish(&self.channel, payload)?;
        debug!(channel = %self.channel, receivers, "published to redis");
        Ok(())
    }

    fn subscribe(&self) -> Subscription<IntegrationEvent> {
        let (tx, rx) = mpsc::channel();

        let client = self.client.clone();
        let channel = self.channel.clone();

        // Receiver thread; it exits when the subscription is dropped or the
        // connection fails.
        let spawned = thread::Builder::new()
            .name(format!("redis-sub-{channel}"))
            .spawn(move || {
                let mut conn = match client.get_connection() {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(error = %e, "redis subscriber could not connect");
                        return;
                    }
                };

                let mut pubsub = conn.as_pubsub();
                if let Err(e) = pubsub.subscribe(&channel) {
                    warn!(channel = %channel, error = %e, "redis subscribe failed");
                    return;
                }

                loop {
                    let msg = match pubsub.get_message() {
                        Ok(m) => m,
                        Err(e) => {
                            warn!(channel = %channel, error = %e, "redis subscription closed");
                            return;
                        }
                    };

                    let Ok(payload) = msg.get_payload::<String>() else {
                        continue;
                    };

                    if let Some(event) = decode(&payload) {
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                }
            });

        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn redis subscriber thread");
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_events_and_skips_garbage() {
        let wire = r#"{"type":"CountryUnblocked","countryCode":"US","countryName":"United States","unblockedAt":"2024-01-01T00:00:00Z"}"#;

        assert_eq!(decode(wire).map(|e| e.country_code().to_string()), Some("US".to_string()));
        assert!(decode("not json").is_none());
        assert!(decode(r#"{"type":"Unknown"}"#).is_none());
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(RedisPubSubEventBus::new("not a url", "ch").is_err());
    }
}

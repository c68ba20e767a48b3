//! IP access decisions against the remote block cache.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use countryguard_blocklist::CountryCode;
use countryguard_core::Clock;
use countryguard_events::{AccessAttempted, EventBus, IntegrationEvent};

use crate::geo::{GeoError, GeoLookup};
use crate::remote_cache::RemoteBlockCache;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub ip: String,
    /// Empty when the address could not be placed in a country.
    pub country_code: String,
    pub is_blocked: bool,
}

pub struct AccessGate<G, B> {
    geo: G,
    cache: Arc<RemoteBlockCache>,
    bus: B,
    clock: Arc<dyn Clock>,
}

impl<G, B> AccessGate<G, B>
where
    G: GeoLookup,
    B: EventBus<IntegrationEvent>,
{
    pub fn new(geo: G, cache: Arc<RemoteBlockCache>, bus: B, clock: Arc<dyn Clock>) -> Self {
        Self {
            geo,
            cache,
            bus,
            clock,
        }
    }

    /// Geolocate `ip` and decide from the cache.
    ///
    /// The attempt is published as [`AccessAttempted`] on a best-effort basis; a
    /// transport failure is logged and does not change the decision. Geolocation
    /// errors, rate limiting included, are returned as-is.
    pub fn check(&self, ip: &str, user_agent: Option<&str>) -> Result<AccessDecision, GeoError> {
        let ip = ip.trim();
        let location = self.geo.lookup(ip)?;

        let code = location
            .country_code
            .as_deref()
            .and_then(|raw| match CountryCode::parse(raw) {
                Ok(code) => Some(code),
                Err(e) => {
                    warn!(
                        ip,
                        country_code = raw,
                        error = %e,
                        "geolocation returned a malformed code"
                    );
                    None
                }
            });

        let is_blocked = code.as_ref().is_some_and(|c| self.cache.is_blocked(c));
        let decision = AccessDecision {
            ip: ip.to_string(),
            country_code: code.map(String::from).unwrap_or_default(),
            is_blocked,
        };

        let attempt = AccessAttempted {
            ip: decision.ip.clone(),
            country_code: decision.country_code.clone(),
            attempted_at: self.clock.now(),
            user_agent: user_agent.map(str::to_string),
            is_blocked,
        };
        if let Err(e) = self.bus.publish(attempt.into()) {
            warn!(ip, error = ?e, "failed to publish access attempt");
        }

        debug!(ip, country_code = %decision.country_code, is_blocked, "access checked");
        Ok(decision)
    }
}

//! IP geolocation seam.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoLocation {
    pub country_code: Option<String>,
    pub country_name: Option<String>,
}

impl GeoLocation {
    pub fn new(country_code: impl Into<String>, country_name: impl Into<String>) -> Self {
        Self {
            country_code: Some(country_code.into()),
            country_name: Some(country_name.into()),
        }
    }

    /// Lookup succeeded but the provider knows nothing about the address.
    pub fn unknown() -> Self {
        Self::default()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeoError {
    /// Provider quota hit. Surfaced to the caller, never retried here.
    #[error("geolocation provider rate limited")]
    RateLimited,
    #[error("invalid ip address: {0}")]
    InvalidIp(String),
}

/// Resolves an IP address to a country.
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: &str) -> Result<GeoLocation, GeoError>;
}

impl<G> GeoLookup for std::sync::Arc<G>
where
    G: GeoLookup + ?Sized,
{
    fn lookup(&self, ip: &str) -> Result<GeoLocation, GeoError> {
        (**self).lookup(ip)
    }
}

/// Fixed address table, for tests and offline deployments.
#[derive(Debug, Default)]
pub struct StaticGeoLookup {
    table: RwLock<HashMap<IpAddr, GeoLocation>>,
}

impl StaticGeoLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, ip: IpAddr, location: GeoLocation) -> Self {
        self.insert(ip, location);
        self
    }

    pub fn insert(&self, ip: IpAddr, location: GeoLocation) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ip, location);
    }
}

impl GeoLookup for StaticGeoLookup {
    fn lookup(&self, ip: &str) -> Result<GeoLocation, GeoError> {
        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| GeoError::InvalidIp(ip.to_string()))?;

        Ok(self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&addr)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_address_resolves() {
        let geo = StaticGeoLookup::new()
            .with_entry("203.0.113.7".parse().unwrap(), GeoLocation::new("FR", "France"));

        let loc = geo.lookup(" 203.0.113.7 ").unwrap();
        assert_eq!(loc.country_code.as_deref(), Some("FR"));
        assert_eq!(loc.country_name.as_deref(), Some("France"));
    }

    #[test]
    fn unknown_address_has_no_country() {
        let geo = StaticGeoLookup::new();
        assert_eq!(geo.lookup("::1").unwrap(), GeoLocation::unknown());
    }

    #[test]
    fn garbage_is_invalid_ip() {
        match StaticGeoLookup::new().lookup("999.1.1.1") {
            Err(GeoError::InvalidIp(ip)) => assert_eq!(ip, "999.1.1.1"),
            other => panic!("Expected InvalidIp, got {other:?}"),
        }
    }
}

//! Proximity cache in front of a rate-limited reverse geocoder.
//!
//! A lookup within `radius_m` of any stored coordinate returns the stored
//! address without touching the provider. Entries never expire and are never
//! evicted; the scan is linear.

use chrono::{DateTime, Utc};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use super::limiter::{CancelToken, RateLimiter, MIN_REQUEST_INTERVAL};
use super::providers::{format_address, NominatimClient, ReverseGeocoder};
use super::types::{CacheStats, GeocodeError};
use crate::config::GeocoderConfig;
use crate::distance::haversine_m;

struct CacheEntry {
    address: String,
    latitude: f64,
    longitude: f64,
    created_at: DateTime<Utc>,
}

/// Per-device reverse-geocoding cache with a blocking request limiter.
pub struct GeoAddressCache {
    provider: Box<dyn ReverseGeocoder>,
    radius_m: f64,
    entries: RwLock<Vec<CacheEntry>>,
    limiter: RateLimiter,
    cancel: CancelToken,
}

impl GeoAddressCache {
    pub fn new(provider: Box<dyn ReverseGeocoder>, radius_m: f64) -> Self {
        Self::with_interval(provider, radius_m, MIN_REQUEST_INTERVAL)
    }

    /// Create a cache with a custom request spacing (for testing).
    pub fn with_interval(provider: Box<dyn ReverseGeocoder>, radius_m: f64, interval: Duration) -> Self {
        Self {
            provider,
            radius_m,
            entries: RwLock::new(Vec::new()),
            limiter: RateLimiter::new(interval),
            cancel: CancelToken::new(),
        }
    }

    /// Cache backed by a Nominatim client built from configuration.
    pub fn from_config(config: &GeocoderConfig) -> Self {
        let client = NominatimClient::new(&config.server_url, &config.language);
        Self::new(Box::new(client), config.cache_radius_m)
    }

    /// Address for a coordinate, or `None` if it could not be resolved.
    pub fn get_address(&self, lat: f64, lon: f64) -> Option<String> {
        match self.lookup(lat, lon) {
            Ok(address) => Some(address),
            Err(GeocodeError::Cancelled) => {
                tracing::debug!("Geocoding of {},{} cancelled while rate limited", lat, lon);
                None
            }
            Err(e) => {
                tracing::warn!("Nominatim geocoding failed for {},{}: {}", lat, lon, e);
                None
            }
        }
    }

    /// Typed variant of [`get_address`](Self::get_address).
    pub fn lookup(&self, lat: f64, lon: f64) -> Result<String, GeocodeError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(GeocodeError::InvalidCoordinates { lat, lon });
        }

        if let Some(address) = self.cached(lat, lon) {
            tracing::debug!("Using cached address for {},{}: {}", lat, lon, address);
            return Ok(address);
        }

        let _permit = self.limiter.acquire(&self.cancel)?;

        let components = self.provider.reverse(lat, lon)?;
        let address = format_address(&components).ok_or(GeocodeError::NoAddress)?;

        self.write_entries().push(CacheEntry {
            address: address.clone(),
            latitude: lat,
            longitude: lon,
            created_at: Utc::now(),
        });
        tracing::debug!("Geocoded {},{} -> {}", lat, lon, address);

        Ok(address)
    }

    /// Stored address within the cache radius, without contacting the provider.
    pub fn cached(&self, lat: f64, lon: f64) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .find(|e| haversine_m(lat, lon, e.latitude, e.longitude) <= self.radius_m)
            .map(|e| e.address.clone())
    }

    pub fn clear_cache(&self) {
        self.write_entries().clear();
        tracing::debug!("Address cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            entries: entries.len(),
            oldest_entry: entries.iter().map(|e| e.created_at).min(),
        }
    }

    /// Handle that interrupts a pending rate-limit wait.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, Vec<CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Per-device enrichment: one geocoding cache and one beacon router per tracker.

use serde::Serialize;
use std::fmt;

use crate::beacon::{BeaconIdentityRouter, BeaconNameStore, BeaconReading};
use crate::config::{AppConfig, DeviceConfig};
use crate::geocode::{CacheStats, GeoAddressCache};
use crate::telemetry::{self, Record};

/// Where an enriched address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressSource {
    Geocoder,
    Tracker,
}

impl fmt::Display for AddressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geocoder => write!(f, "Nominatim"),
            Self::Tracker => write!(f, "Traccar"),
        }
    }
}

/// Derived fields for one telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPosition {
    pub device_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_source: Option<AddressSource>,
    pub beacons: Vec<BeaconReading>,
}

pub struct DeviceEnricher {
    device_id: i64,
    geocoder: Option<GeoAddressCache>,
    router: BeaconIdentityRouter,
}

impl DeviceEnricher {
    pub fn new(device_id: i64, geocoder: Option<GeoAddressCache>, router: BeaconIdentityRouter) -> Self {
        Self {
            device_id,
            geocoder,
            router,
        }
    }

    /// Build an enricher from application and device configuration, loading
    /// persisted beacon names from the device's state directory.
    pub fn from_config(app: &AppConfig, device: &DeviceConfig) -> Self {
        let geocoder = if app.geocoder.enabled {
            tracing::info!(
                "Nominatim geocoding enabled for device {} (server: {}, language: {})",
                device.device_id,
                app.geocoder.server_url,
                app.geocoder.language
            );
            Some(GeoAddressCache::from_config(&app.geocoder))
        } else {
            None
        };

        let names = BeaconNameStore::load_from(&app.device_dir(device.device_id));
        let router = BeaconIdentityRouter::new(device, names);
        for (slot, name) in router.names() {
            tracing::debug!("Restored beacon {} name: {}", slot, name);
        }

        Self::new(device.device_id, geocoder, router)
    }

    pub fn device_id(&self) -> i64 {
        self.device_id
    }

    /// Enrich one position record.
    ///
    /// The address comes from the geocoder when enabled and successful, else
    /// from the record's own `address` field.
    pub fn enrich(&mut self, position: &Record) -> EnrichedPosition {
        let coords = telemetry::coordinates(position);

        let mut address = None;
        if let (Some(geocoder), Some((lat, lon))) = (&self.geocoder, coords) {
            address = geocoder
                .get_address(lat, lon)
                .map(|a| (a, AddressSource::Geocoder));
        }
        if address.is_none() {
            address = telemetry::string(position, "address")
                .filter(|a| !a.trim().is_empty())
                .map(|a| (a.to_string(), AddressSource::Tracker));
        }
        if let Some((a, source)) = &address {
            tracing::debug!("Using {} address for device {}: {}", source, self.device_id, a);
        }

        let beacons = telemetry::object(position, "attributes")
            .map(|attributes| self.router.route(attributes))
            .unwrap_or_default();

        let (address, address_source) = address.unzip();
        EnrichedPosition {
            device_id: self.device_id,
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            address,
            address_source,
            beacons,
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.geocoder.as_ref().map(GeoAddressCache::cache_stats)
    }

    pub fn clear_cache(&self) {
        if let Some(geocoder) = &self.geocoder {
            geocoder.clear_cache();
        }
    }

    pub fn geocoder(&self) -> Option<&GeoAddressCache> {
        self.geocoder.as_ref()
    }

    pub fn router(&self) -> &BeaconIdentityRouter {
        &self.router
    }
}

//! Core types for the geocoding subsystem.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why a reverse-geocoding lookup produced no address.
///
/// None of these are fatal; `GeoAddressCache::get_address` logs them and
/// returns `None`.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Coordinates are not finite: {lat}, {lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Provider response has no usable address")]
    NoAddress,

    #[error("Rate-limit wait was cancelled")]
    Cancelled,
}

/// Diagnostic snapshot of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cache size: {} entries", self.entries)
    }
}

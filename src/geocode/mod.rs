//! Reverse geocoding for tracker positions.
//!
//! Nominatim lookups behind a per-device proximity cache and a blocking
//! one-request-per-second limiter.

pub mod cache;
pub mod limiter;
pub mod providers;
pub mod types;

pub use cache::GeoAddressCache;
pub use limiter::{CancelToken, RateLimiter};
pub use providers::{format_address, NominatimClient, ReverseGeocoder};
pub use types::{CacheStats, GeocodeError};

//! Telemetry enrichment for Traccar GPS trackers.
//!
//! Two derived signals per position update: a human-readable street address
//! from a rate-limited, proximity-cached reverse geocoder, and Bluetooth
//! beacon readings routed onto four stable slots keyed by MAC address.

pub mod beacon;
pub mod config;
pub mod device;
pub mod distance;
pub mod geocode;
pub mod server;
pub mod telemetry;

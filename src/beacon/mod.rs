//! Bluetooth beacon identity routing.
//!
//! Maps the tracker's per-update `tag1`..`tag4` reports onto four stable
//! slots keyed by MAC address, with slot names kept on disk.

pub mod router;
pub mod store;
pub mod types;

pub use router::{normalize_mac, BeaconIdentityRouter};
pub use store::BeaconNameStore;
pub use types::{BeaconReading, BeaconSlot, ContactState};

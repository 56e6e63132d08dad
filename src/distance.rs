//! Distance helpers shared by the geocoding cache and the beacon router.
//!
//! Great-circle distance between two coordinates (Haversine, spherical Earth)
//! and the log-distance path loss model used to turn beacon RSSI into meters.

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default calibrated transmit power at 1 m, in dBm.
pub const DEFAULT_TX_POWER: i32 = -59;

/// Default path-loss exponent (2.0 = free space).
pub const DEFAULT_PATH_LOSS: f64 = 2.0;

/// Great-circle distance in meters between two lat/lon pairs (degrees).
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Estimated distance in meters from a received signal strength.
///
/// `distance = 10 ^ ((tx_power - rssi) / (10 * path_loss))`
pub fn distance_from_rssi(tx_power: i32, path_loss: f64, rssi: i32) -> f64 {
    let exponent = (f64::from(tx_power) - f64::from(rssi)) / (10.0 * path_loss);
    10f64.powf(exponent)
}

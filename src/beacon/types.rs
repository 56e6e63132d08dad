//! Core types for beacon routing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of stable beacon slots (and of tag indices a tracker reports).
pub const SLOT_COUNT: u8 = 4;

/// Stable, user-facing beacon identity in `1..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BeaconSlot(u8);

impl BeaconSlot {
    pub fn new(n: u8) -> Option<Self> {
        (1..=SLOT_COUNT).contains(&n).then_some(Self(n))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// All slots in ascending order.
    pub fn all() -> impl Iterator<Item = BeaconSlot> {
        (1..=SLOT_COUNT).map(BeaconSlot)
    }

    /// Output channel prefix, e.g. `beacon2`.
    pub fn channel_prefix(self) -> String {
        format!("beacon{}", self.0)
    }
}

impl TryFrom<u8> for BeaconSlot {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n).ok_or_else(|| format!("beacon slot must be 1..={}, got {}", SLOT_COUNT, n))
    }
}

impl From<BeaconSlot> for u8 {
    fn from(slot: BeaconSlot) -> u8 {
        slot.0
    }
}

impl fmt::Display for BeaconSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Magnet contact state. The sensor reports `false` when the magnet is near.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContactState {
    Open,
    Closed,
}

impl ContactState {
    pub fn from_magnet(magnet_away: bool) -> Self {
        if magnet_away {
            Self::Open
        } else {
            Self::Closed
        }
    }
}

/// Sensor readings for one stable slot in one update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconReading {
    pub slot: BeaconSlot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_mv: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_battery: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
}

impl BeaconReading {
    pub fn empty(slot: BeaconSlot) -> Self {
        Self {
            slot,
            rssi: None,
            distance_m: None,
            mac: None,
            battery_mv: None,
            low_battery: None,
            name: None,
            temperature_c: None,
            humidity: None,
            contact: None,
            motion: None,
            motion_count: None,
            pitch: None,
            roll: None,
        }
    }
}

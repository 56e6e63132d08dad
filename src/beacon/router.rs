//! Stable slot routing for Bluetooth beacons reported by a tracker.
//!
//! Teltonika-style trackers report up to four nearby beacons per update as
//! `tag1`..`tag4`, ordered by signal strength, so the same physical beacon can
//! show up under a different tag index on every update. The router keys each
//! beacon by MAC address and binds it to one of four stable slots:
//!
//! 1. MACs pinned in configuration (`beacon{n}Mac`) always use their slot.
//! 2. An unseen MAC takes the lowest free slot and keeps it until restart.
//! 3. When all four slots are bound to other MACs the reading is dropped.
//!
//! Slot names are persisted through [`BeaconNameStore`] and replayed when an
//! update carries no name.

use std::collections::{BTreeMap, HashMap};

use super::store::BeaconNameStore;
use super::types::{BeaconReading, BeaconSlot, ContactState, SLOT_COUNT};
use crate::config::DeviceConfig;
use crate::distance::distance_from_rssi;
use crate::telemetry::{self, Record};

pub struct BeaconIdentityRouter {
    mac_to_slot: HashMap<String, BeaconSlot>,
    names: BeaconNameStore,
    tx_power: i32,
    path_loss: f64,
}

impl BeaconIdentityRouter {
    pub fn new(config: &DeviceConfig, names: BeaconNameStore) -> Self {
        let mut mac_to_slot = HashMap::new();
        for (n, mac) in config.pinned_macs() {
            if let Some(slot) = BeaconSlot::new(n) {
                tracing::debug!("Configured beacon MAC {} for slot {}", mac, slot);
                mac_to_slot.insert(normalize_mac(mac), slot);
            }
        }
        tracing::debug!(
            "Beacon MAC mapping initialized with {} entries, {} stored names",
            mac_to_slot.len(),
            names.len()
        );

        Self {
            mac_to_slot,
            names,
            tx_power: config.beacon_tx_power,
            path_loss: config.beacon_path_loss,
        }
    }

    /// Route one update's `tag{1..4}*` attributes onto stable slots.
    ///
    /// Returns one reading per resolved slot, ordered by slot. If the same MAC
    /// appears under two tags, the later tag wins.
    pub fn route(&mut self, attributes: &Record) -> Vec<BeaconReading> {
        let mut readings = BTreeMap::new();

        for tag in 1..=SLOT_COUNT {
            let prefix = format!("tag{}", tag);
            let Some(mac) = telemetry::string(attributes, &format!("{}Mac", prefix))
                .map(normalize_mac)
                .filter(|m| !m.is_empty())
            else {
                continue;
            };

            let Some(slot) = self.resolve_slot(&mac) else {
                tracing::debug!("No available slot for {} (MAC {})", prefix, mac);
                continue;
            };

            tracing::debug!("Routing {} (MAC {}) to {}", prefix, mac, slot.channel_prefix());
            let reading = self.read_tag(attributes, &prefix, slot);
            readings.insert(slot, reading);
        }

        readings.into_values().collect()
    }

    /// Slot currently bound to a MAC, if any.
    pub fn slot_for(&self, mac: &str) -> Option<BeaconSlot> {
        self.mac_to_slot.get(&normalize_mac(mac)).copied()
    }

    pub fn stored_name(&self, slot: BeaconSlot) -> Option<&str> {
        self.names.get(slot)
    }

    /// Current slot names, including those restored from storage.
    pub fn names(&self) -> Vec<(BeaconSlot, String)> {
        BeaconSlot::all()
            .filter_map(|slot| self.names.get(slot).map(|n| (slot, n.to_string())))
            .collect()
    }

    fn resolve_slot(&mut self, mac: &str) -> Option<BeaconSlot> {
        if let Some(slot) = self.mac_to_slot.get(mac) {
            return Some(*slot);
        }

        let free = BeaconSlot::all().find(|s| !self.mac_to_slot.values().any(|v| v == s))?;
        tracing::debug!("Assigning unconfigured MAC {} to free slot {}", mac, free);
        self.mac_to_slot.insert(mac.to_string(), free);
        Some(free)
    }

    fn read_tag(&mut self, attributes: &Record, prefix: &str, slot: BeaconSlot) -> BeaconReading {
        let field = |suffix: &str| format!("{}{}", prefix, suffix);
        let mut reading = BeaconReading::empty(slot);

        if let Some(rssi) = telemetry::integer(attributes, &field("Rssi"))
            .and_then(|v| i32::try_from(v).ok())
        {
            reading.rssi = Some(rssi);
            reading.distance_m = Some(distance_from_rssi(self.tx_power, self.path_loss, rssi));
        }

        reading.mac = telemetry::string(attributes, &field("Mac")).map(str::to_string);
        reading.battery_mv = telemetry::number(attributes, &field("Battery"));
        reading.low_battery = low_battery(attributes, &field("LowBattery"));
        reading.name = self.resolve_name(slot, telemetry::string(attributes, &field("Name")));
        // Hundredths of a degree Celsius
        reading.temperature_c = telemetry::number(attributes, &field("Temp")).map(|t| t / 100.0);
        reading.humidity = telemetry::number(attributes, &field("Humidity"));
        reading.contact = telemetry::boolean(attributes, &field("Magnet")).map(ContactState::from_magnet);
        reading.motion = telemetry::boolean(attributes, &field("Motion"));
        reading.motion_count = telemetry::integer(attributes, &field("MotionCount"));
        reading.pitch = telemetry::number(attributes, &field("Pitch"));
        reading.roll = telemetry::number(attributes, &field("AngleRoll"));

        reading
    }

    /// Name to publish for a slot, persisting it when it changed.
    fn resolve_name(&mut self, slot: BeaconSlot, raw: Option<&str>) -> Option<String> {
        let clean = raw.map(clean_name).filter(|n| !n.is_empty());

        let Some(name) = clean else {
            return self.names.get(slot).map(str::to_string);
        };

        let previous = self.names.get(slot);
        if previous != Some(name.as_str()) {
            tracing::info!(
                "Beacon {} name updated: '{}' -> '{}'",
                slot,
                previous.unwrap_or("<none>"),
                name
            );
            if let Err(e) = self.names.put(slot, &name) {
                tracing::warn!("Failed to persist name for beacon {}: {}", slot, e);
            }
        }
        Some(name)
    }
}

/// Lowercase, trimmed MAC used as the routing key.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().to_lowercase()
}

/// Beacon names arrive NUL-padded from the tracker.
fn clean_name(raw: &str) -> String {
    raw.replace('\0', "").trim().to_string()
}

fn low_battery(attributes: &Record, key: &str) -> Option<bool> {
    telemetry::boolean(attributes, key).or_else(|| telemetry::integer(attributes, key).map(|v| v != 0))
}

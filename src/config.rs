//! JSON configuration file, by default at ~/.traccar-enrich/config.json.
//!
//! Keys follow the Traccar binding's parameter names (`nominatimUrl`,
//! `beacon1Mac`, `beaconTxPower`, ...). Every field has a default, so an empty
//! object is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::distance::{DEFAULT_PATH_LOSS, DEFAULT_TX_POWER};
use crate::geocode::providers::{DEFAULT_LANGUAGE, DEFAULT_SERVER_URL};

const DEFAULT_CACHE_RADIUS_M: f64 = 50.0;
const DEFAULT_WEBHOOK_PORT: u16 = 8090;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Nominatim settings shared by every device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    #[serde(rename = "useNominatim")]
    pub enabled: bool,
    #[serde(rename = "nominatimUrl")]
    pub server_url: String,
    #[serde(rename = "nominatimLanguage")]
    pub language: String,
    /// Radius in meters within which a cached address is reused.
    #[serde(rename = "geocodingCacheDistance")]
    pub cache_radius_m: f64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_url: DEFAULT_SERVER_URL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            cache_radius_m: DEFAULT_CACHE_RADIUS_M,
        }
    }
}

/// Per-device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceConfig {
    pub device_id: i64,
    pub beacon1_mac: Option<String>,
    pub beacon2_mac: Option<String>,
    pub beacon3_mac: Option<String>,
    pub beacon4_mac: Option<String>,
    /// Calibrated beacon RSSI at 1 m, dBm.
    pub beacon_tx_power: i32,
    pub beacon_path_loss: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            beacon1_mac: None,
            beacon2_mac: None,
            beacon3_mac: None,
            beacon4_mac: None,
            beacon_tx_power: DEFAULT_TX_POWER,
            beacon_path_loss: DEFAULT_PATH_LOSS,
        }
    }
}

impl DeviceConfig {
    pub fn new(device_id: i64) -> Self {
        Self {
            device_id,
            ..Self::default()
        }
    }

    /// Statically pinned `(slot, mac)` pairs, blank entries skipped.
    pub fn pinned_macs(&self) -> Vec<(u8, &str)> {
        [
            &self.beacon1_mac,
            &self.beacon2_mac,
            &self.beacon3_mac,
            &self.beacon4_mac,
        ]
        .into_iter()
        .zip(1u8..)
        .filter_map(|(mac, slot)| {
            mac.as_deref()
                .filter(|m| !m.trim().is_empty())
                .map(|m| (slot, m))
        })
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub geocoder: GeocoderConfig,
    pub devices: Vec<DeviceConfig>,
    pub webhook_host: String,
    pub webhook_port: u16,
    /// Where per-device state (beacon names) is kept.
    pub data_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            geocoder: GeocoderConfig::default(),
            devices: Vec::new(),
            webhook_host: "0.0.0.0".to_string(),
            webhook_port: DEFAULT_WEBHOOK_PORT,
            data_dir: None,
        }
    }
}

impl AppConfig {
    /// Load from the default location; a missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> PathBuf {
        base_dir().join("config.json")
    }

    /// Directory holding state for one device.
    pub fn device_dir(&self, device_id: i64) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(base_dir)
            .join("devices")
            .join(device_id.to_string())
    }

    pub fn device(&self, device_id: i64) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let radius = self.geocoder.cache_radius_m;
        if !radius.is_finite() || radius < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "geocodingCacheDistance must be a non-negative number, got {}",
                radius
            )));
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.device_id) {
                return Err(ConfigError::Invalid(format!(
                    "device {} is configured twice",
                    device.device_id
                )));
            }
            if !device.beacon_path_loss.is_finite() || device.beacon_path_loss <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "device {}: beaconPathLoss must be positive, got {}",
                    device.device_id, device.beacon_path_loss
                )));
            }

            let mut macs = HashSet::new();
            for (slot, mac) in device.pinned_macs() {
                if !macs.insert(mac.trim().to_lowercase()) {
                    return Err(ConfigError::Invalid(format!(
                        "device {}: MAC {} pinned to more than one slot (again at beacon{}Mac)",
                        device.device_id, mac, slot
                    )));
                }
            }
        }
        Ok(())
    }
}

fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".traccar-enrich")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(json: &str) -> (PathBuf, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, json).unwrap();
        (path, dir)
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let (path, _dir) = write_config("{}");
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.geocoder.enabled);
        assert_eq!(config.geocoder.server_url, "https://nominatim.openstreetmap.org");
        assert_eq!(config.geocoder.language, "en");
        assert_eq!(config.webhook_port, 8090);
    }

    #[test]
    fn test_binding_parameter_names() {
        let (path, _dir) = write_config(
            r#"{
                "geocoder": {
                    "useNominatim": true,
                    "nominatimUrl": "http://nominatim.local/",
                    "nominatimLanguage": "da",
                    "geocodingCacheDistance": 25
                },
                "devices": [{
                    "deviceId": 7,
                    "beacon2Mac": "7C:D9:F4:11:22:33",
                    "beacon4Mac": "  ",
                    "beaconTxPower": -65,
                    "beaconPathLoss": 2.5
                }]
            }"#,
        );
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.geocoder.language, "da");
        assert_eq!(config.geocoder.cache_radius_m, 25.0);

        let device = config.device(7).unwrap();
        assert_eq!(device.beacon_tx_power, -65);
        assert_eq!(device.beacon_path_loss, 2.5);
        assert_eq!(device.pinned_macs(), vec![(2, "7C:D9:F4:11:22:33")]);
        assert!(config.device(8).is_none());
    }

    #[test]
    fn test_device_defaults() {
        let device = DeviceConfig::new(3);
        assert_eq!(device.beacon_tx_power, -59);
        assert_eq!(device.beacon_path_loss, 2.0);
        assert!(device.pinned_macs().is_empty());
    }

    #[test]
    fn test_malformed_json() {
        let (path, _dir) = write_config("{ not json");
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = AppConfig::load_from(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_negative_radius_rejected() {
        let (path, _dir) = write_config(r#"{"geocoder": {"geocodingCacheDistance": -1}}"#);
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_device_rejected() {
        let (path, _dir) = write_config(r#"{"devices": [{"deviceId": 1}, {"deviceId": 1}]}"#);
        assert!(matches!(AppConfig::load_from(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_pin_rejected() {
        let (path, _dir) = write_config(
            r#"{"devices": [{"deviceId": 1, "beacon1Mac": "AA:BB", "beacon3Mac": " aa:bb "}]}"#,
        );
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("beacon3Mac"));
    }

    #[test]
    fn test_device_dir() {
        let config = AppConfig {
            data_dir: Some(PathBuf::from("/var/lib/enrich")),
            ..AppConfig::default()
        };
        assert_eq!(config.device_dir(42), PathBuf::from("/var/lib/enrich/devices/42"));
    }
}

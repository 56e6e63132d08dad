use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::device::DeviceEnricher;
use crate::geocode::CancelToken;

/// One enricher per configured device. Each is locked only inside the
/// blocking task that processes an update for it.
pub struct AppState {
    pub devices: HashMap<i64, Arc<Mutex<DeviceEnricher>>>,
    // Held outside the device locks so a shutdown can reach a blocked wait.
    cancel_tokens: Vec<CancelToken>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_devices(
            config
                .devices
                .iter()
                .map(|d| DeviceEnricher::from_config(config, d)),
        )
    }

    pub fn with_devices(enrichers: impl IntoIterator<Item = DeviceEnricher>) -> Self {
        let mut cancel_tokens = Vec::new();
        let devices = enrichers
            .into_iter()
            .map(|e| {
                if let Some(geocoder) = e.geocoder() {
                    cancel_tokens.push(geocoder.cancel_token());
                }
                (e.device_id(), Arc::new(Mutex::new(e)))
            })
            .collect();
        Self {
            devices,
            cancel_tokens,
        }
    }

    /// Interrupt every pending rate-limit wait.
    pub fn cancel_pending(&self) {
        for token in &self.cancel_tokens {
            token.cancel();
        }
    }
}

//! Durable per-device beacon names, stored as `beacons.json` in the device's
//! state directory.
//!
//! Keys are `beacon1Name`..`beacon4Name`. Unknown keys, non-string names and
//! malformed files are ignored on load.

use super::types::BeaconSlot;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const FILE_NAME: &str = "beacons.json";

pub struct BeaconNameStore {
    path: Option<PathBuf>,
    names: HashMap<BeaconSlot, String>,
}

impl BeaconNameStore {
    /// Load names from `<dir>/beacons.json`.
    pub fn load_from(dir: &Path) -> Self {
        let path = dir.join(FILE_NAME);
        let names = Self::read_file(&path).unwrap_or_default();
        Self {
            path: Some(path),
            names,
        }
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            names: HashMap::new(),
        }
    }

    fn read_file(path: &Path) -> Option<HashMap<BeaconSlot, String>> {
        let data = fs::read_to_string(path).ok()?;
        let raw: Map<String, Value> = serde_json::from_str(&data).ok()?;
        let names = BeaconSlot::all()
            .filter_map(|slot| {
                let name = raw.get(&property_key(slot))?.as_str()?.trim();
                (!name.is_empty()).then(|| (slot, name.to_string()))
            })
            .collect();
        Some(names)
    }

    pub fn get(&self, slot: BeaconSlot) -> Option<&str> {
        self.names.get(&slot).map(String::as_str)
    }

    /// Record a name and write the file. The in-memory value is updated even
    /// when the write fails.
    pub fn put(&mut self, slot: BeaconSlot, name: &str) -> io::Result<()> {
        self.names.insert(slot, name.to_string());
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let sorted: BTreeMap<String, &String> = self
            .names
            .iter()
            .map(|(slot, name)| (property_key(*slot), name))
            .collect();
        let json = serde_json::to_string_pretty(&sorted).map_err(io::Error::other)?;
        fs::write(path, json)
    }
}

fn property_key(slot: BeaconSlot) -> String {
    format!("{}Name", slot.channel_prefix())
}

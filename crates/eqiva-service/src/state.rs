//! Application state shared across handlers and the poller.
//!
//! The latest status of every thermostat the bridge has been asked about
//! lives in a [`StatusStore`], persisted as JSON so the poller knows which
//! devices to visit after a restart. Device sessions go through one
//! [`Controller`] and never overlap, since all thermostats share a radio.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eqiva_core::{Connector, Controller, DeviceReport, DeviceState, Operation};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Status in the shape home-automation bridges expect.
///
/// Heating states: 0 off, 1 heating, 2 idle (valve closed), 3 auto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    /// 0 off, 1 manual, 3 auto.
    pub target_heating_cooling_state: u8,
    pub target_temperature: f32,
    /// 0 off, 1 valve open, 2 valve closed.
    pub current_heating_cooling_state: u8,
    /// The thermostat has no sensor; this repeats the target.
    pub current_temperature: f32,
}

impl Default for StatusEntry {
    fn default() -> Self {
        Self {
            target_heating_cooling_state: 0,
            target_temperature: 20.0,
            current_heating_cooling_state: 0,
            current_temperature: 20.0,
        }
    }
}

impl StatusEntry {
    /// Map a confirmed device state; `None` until a status was received.
    pub fn from_state(state: &DeviceState) -> Option<Self> {
        let status = state.status.as_ref()?;
        let off = status.target.is_off();
        let target_heating_cooling_state = if off {
            0
        } else if status.mode.base == eqiva_types::BaseMode::Auto {
            3
        } else {
            1
        };
        let current_heating_cooling_state = match (off, status.valve) {
            (true, _) => 0,
            (false, 0) => 2,
            (false, _) => 1,
        };
        let temperature = status.target.celsius();
        Some(Self {
            target_heating_cooling_state,
            target_temperature: temperature,
            current_heating_cooling_state,
            current_temperature: temperature,
        })
    }
}

/// Latest status per thermostat address, optionally backed by a file.
pub struct StatusStore {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, StatusEntry>>,
}

impl StatusStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open the store at `path`.
    ///
    /// A missing file starts empty; so does an unreadable one, after a
    /// warning, since the statuses are refreshed by the next poll anyway.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Ignoring status store {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("Cannot read status store {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self {
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    pub async fn get(&self, address: &str) -> Option<StatusEntry> {
        self.entries.read().await.get(address).copied()
    }

    /// The stored entry, adding a default one for an unknown address.
    ///
    /// Returns whether the entry was added.
    pub async fn get_or_insert_default(&self, address: &str) -> (StatusEntry, bool) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(address) {
            return (*entry, false);
        }
        let entry = StatusEntry::default();
        entries.insert(address.to_string(), entry);
        (entry, true)
    }

    pub async fn update(&self, address: &str, entry: StatusEntry) {
        self.entries.write().await.insert(address.to_string(), entry);
    }

    /// Every known address.
    pub async fn addresses(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Write the store to its file, if it has one.
    pub async fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = {
            let entries = self.entries.read().await;
            serde_json::to_string_pretty(&*entries).map_err(StoreError::Serialize)?
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| StoreError::Write {
            path: path.clone(),
            source: e,
        })?;
        debug!("Saved status store to {}", path.display());
        Ok(())
    }
}

/// Status store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to serialize status store: {0}")]
    Serialize(serde_json::Error),
    #[error("Failed to write status store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Shared application state.
pub struct AppState<C: Connector> {
    controller: Controller<C>,
    /// Latest status per thermostat.
    pub store: StatusStore,
    /// Held for the whole of each device session.
    radio: Mutex<()>,
}

impl<C: Connector> AppState<C> {
    pub fn new(controller: Controller<C>, store: StatusStore) -> Arc<Self> {
        Arc::new(Self {
            controller,
            store,
            radio: Mutex::new(()),
        })
    }

    /// Run `operations` on one thermostat, waiting for the radio first.
    ///
    /// A confirmed status refreshes the store entry of `address`.
    pub async fn run(
        &self,
        address: &str,
        operations: &[Operation],
    ) -> eqiva_core::Result<DeviceReport> {
        let report = {
            let _radio = self.radio.lock().await;
            self.controller.run_device(address, operations).await?
        };
        if let Some(entry) = StatusEntry::from_state(&report.state) {
            self.store.update(address, entry).await;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eqiva_types::{BaseMode, StatusReport, Temperature};

    fn state(mode: BaseMode, celsius: f32, valve: u8) -> DeviceState {
        let mut status = StatusReport::new(Temperature::new(celsius).unwrap());
        status.mode.base = mode;
        status.valve = valve;
        DeviceState {
            status: Some(status),
            ..Default::default()
        }
    }

    #[test]
    fn test_entry_mapping() {
        let entry = StatusEntry::from_state(&state(BaseMode::Auto, 21.0, 30)).unwrap();
        assert_eq!(entry.target_heating_cooling_state, 3);
        assert_eq!(entry.current_heating_cooling_state, 1);
        assert_eq!(entry.target_temperature, 21.0);
        assert_eq!(entry.current_temperature, 21.0);

        let entry = StatusEntry::from_state(&state(BaseMode::Manual, 19.5, 0)).unwrap();
        assert_eq!(entry.target_heating_cooling_state, 1);
        assert_eq!(entry.current_heating_cooling_state, 2);

        let mut off = state(BaseMode::Manual, 20.0, 0);
        if let Some(status) = off.status.as_mut() {
            status.target = Temperature::OFF;
        }
        let entry = StatusEntry::from_state(&off).unwrap();
        assert_eq!(entry.target_heating_cooling_state, 0);
        assert_eq!(entry.current_heating_cooling_state, 0);
        assert_eq!(entry.target_temperature, 4.5);

        assert_eq!(StatusEntry::from_state(&DeviceState::default()), None);
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let value = serde_json::to_value(StatusEntry::default()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "targetHeatingCoolingState": 0,
                "targetTemperature": 20.0,
                "currentHeatingCoolingState": 0,
                "currentTemperature": 20.0
            })
        );
    }

    #[tokio::test]
    async fn test_store_persists_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eqiva").join("status_store.json");

        let store = StatusStore::open(&path);
        assert!(store.addresses().await.is_empty());
        let (entry, added) = store.get_or_insert_default("00:1A:22:00:00:01").await;
        assert!(added);
        assert_eq!(entry, StatusEntry::default());
        let (_, added) = store.get_or_insert_default("00:1A:22:00:00:01").await;
        assert!(!added);
        store.save().await.unwrap();

        let reopened = StatusStore::open(&path);
        assert_eq!(reopened.addresses().await, vec!["00:1A:22:00:00:01"]);
    }

    #[tokio::test]
    async fn test_unreadable_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status_store.json");
        std::fs::write(&path, "not json").unwrap();

        let store = StatusStore::open(&path);
        assert!(store.addresses().await.is_empty());
        assert!(store.get("00:1A:22:00:00:01").await.is_none());
    }
}

//! HTTP bridge and status poller for Eqiva radiator thermostats.
//!
//! The service keeps the latest status of every thermostat it has been
//! asked about, refreshes them in the background and forwards changes
//! from home-automation systems over the same Bluetooth controller the
//! command line tool uses.
//!
//! # REST API Endpoints
//!
//! - `GET /{mac}/status` - Stored status of a thermostat
//! - `GET /{mac}/targetTemperature/{celsius}` - Set the target temperature
//! - `GET /{mac}/targetHeatingCoolingState/{state}` - Off (0), manual (1, 2) or auto (3)
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/eqiva/service.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5001"
//!
//! [poller]
//! enabled = true
//! interval = 30
//!
//! [storage]
//! path = "~/.local/share/eqiva/status_store.json"
//!
//! [bluetooth]
//! timeout = 20
//! response_timeout = 2.5
//! ```

pub mod api;
pub mod collector;
pub mod config;
pub mod state;

pub use collector::{Collector, CollectorError};
pub use config::{
    BluetoothConfig, Config, ConfigError, PollerConfig, ServerConfig, StorageConfig,
};
pub use state::{AppState, StatusEntry, StatusStore, StoreError};

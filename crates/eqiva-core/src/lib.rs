//! BLE engine for Eqiva (eQ-3 CC-RT-BLE) radiator thermostats.
//!
//! The thermostat speaks a small binary protocol over one GATT write
//! characteristic and answers on a notification characteristic. This crate
//! turns that into a request/response API.
//!
//! # Layers
//!
//! - [`Transport`]: one GATT link. [`BleTransport`] uses btleplug,
//!   [`MockTransport`] runs in memory.
//! - [`Session`]: serializes commands, correlates each with its reply,
//!   retries once on silence and keeps the last confirmed [`DeviceState`].
//! - [`Thermostat`]: domain operations and mode policies.
//! - [`Controller`]: resolves aliases and runs a list of operations per
//!   device inside one connection.
//!
//! # Platform Differences
//!
//! On macOS thermostats are identified by a CoreBluetooth UUID instead of
//! their MAC address. The UUID is stable on one Mac but differs between
//! machines; the address-prefix check in [`scan`] cannot see the vendor
//! there, so discovery falls back to the advertised name.
//!
//! # Quick Start
//!
//! ```no_run
//! use eqiva_core::{BleConnector, Connector, Thermostat, ThermostatOptions, scan};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let found = scan::scan_for_thermostats(scan::ScanOptions::default()).await?;
//!     let Some(first) = found.first() else {
//!         return Ok(());
//!     };
//!
//!     let transport = BleConnector::default().open(&first.identifier).await?;
//!     let thermostat = Thermostat::new(transport, ThermostatOptions::default());
//!     thermostat.connect().await?;
//!
//!     let state = thermostat.sync_status().await?;
//!     println!("{:?} at {:?}", state.effective_mode(), state.target());
//!
//!     thermostat.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod controller;
pub mod error;
pub mod events;
pub mod mock;
pub mod retry;
pub mod scan;
pub mod session;
pub mod thermostat;
pub mod transport;
pub mod util;

pub use eqiva_types::codec;
pub use eqiva_types::uuids;

pub use ble::{BleConnector, BleTransport, ConnectionConfig};
pub use controller::{Aliases, Controller, DeviceDump, DeviceReport, Operation, Outcome};
pub use error::{ConnectionFailureReason, DeviceNotFoundReason, Error, Result};
pub use events::{DisconnectReason, EventDispatcher, EventReceiver, SessionEvent};
pub use mock::{MockConnector, MockTransport, SimulatedThermostat};
pub use retry::{RetryConfig, with_retry};
pub use scan::{DiscoveredThermostat, FindProgress, ScanOptions};
pub use session::{DeviceState, Session, SessionConfig, SessionState};
pub use thermostat::{Thermostat, ThermostatOptions};
pub use transport::{Connector, Transport, TransportEvent};
pub use util::{create_identifier, format_peripheral_id, local_now, looks_like_address};

pub use eqiva_types::{
    BaseMode, ChangePoint, Command, DaySchedule, DaySelector, DecodeError, DeviceConfig,
    DeviceInfo, EffectiveMode, EncodeError, Mode, Notification, OffsetTemperature,
    OpenWindowConfig, Overlays, Preset, ScheduleTime, StatusFlags, StatusReport, Temperature,
    Vacation, Weekday,
};

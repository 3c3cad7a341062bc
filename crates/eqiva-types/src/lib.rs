//! Platform-agnostic types and frame codec for Eqiva Bluetooth radiator
//! thermostats (eQ-3 CC-RT-BLE).
//!
//! This crate has no I/O. It is shared by the BLE engine in `eqiva-core`
//! and by anything that needs to build or inspect frames offline.
//!
//! # Features
//!
//! - Validated domain types: [`Temperature`], [`OffsetTemperature`],
//!   [`DaySchedule`], [`Vacation`], [`OpenWindowConfig`]
//! - Mode modelled as a base mode plus overlays ([`Mode`])
//! - [`encode`] / [`decode`] for every frame the thermostat understands
//! - UUID constants for the GATT characteristics
//!
//! # Example
//!
//! ```
//! use eqiva_types::{BaseMode, Command, encode};
//!
//! let frame = encode(&Command::SetMode(BaseMode::Manual)).unwrap();
//! assert_eq!(frame, vec![0x40, 0x40]);
//! ```

pub mod codec;
pub mod error;
pub mod types;
pub mod uuid;

pub use codec::{
    Command, Notification, Preset, decode, decode_command, device_info_frame, encode,
    schedule_confirmed_frame,
    schedule_frame,
};
pub use error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
pub use types::{
    BaseMode, ChangePoint, DaySchedule, DaySelector, DeviceConfig, DeviceInfo, EffectiveMode,
    MAX_CHANGE_POINTS, MAX_OPEN_WINDOW_MINUTES, MAX_TEMPERATURE, MIN_TEMPERATURE, Mode,
    OffsetTemperature, OpenWindowConfig, Overlays, ScheduleTime, StatusFlags, StatusReport,
    Temperature, Vacation, Weekday,
};
pub use self::uuid as uuids;

//! High-level thermostat API.
//!
//! [`Thermostat`] turns domain operations into codec commands, runs them
//! through its [`Session`] and hands back the confirmed [`DeviceState`].
//! It also owns the mode policies:
//!
//! - boost is exclusive, so temperature changes and presets are refused while
//!   it runs;
//! - day programs cannot be written during a vacation hold.
//!
//! Both checks use the cached state and happen before any frame is written.
//! When nothing is cached yet the status is fetched first.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use eqiva_types::{
    BaseMode, Command, DaySchedule, DeviceInfo, EffectiveMode, EncodeError, Mode, Notification,
    OffsetTemperature, OpenWindowConfig, Preset, Temperature, Vacation, Weekday, uuids,
};
use time::PrimitiveDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::EventReceiver;
use crate::session::{DeviceState, Session, SessionConfig};
use crate::transport::Transport;
use crate::util::local_now;

/// Options for a [`Thermostat`].
#[derive(Debug, Clone)]
pub struct ThermostatOptions {
    /// Session tuning.
    pub session: SessionConfig,
    /// Reopen a dropped link once before the next command.
    pub reconnect: bool,
}

impl Default for ThermostatOptions {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            reconnect: true,
        }
    }
}

impl ThermostatOptions {
    /// Set session tuning.
    #[must_use]
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Enable or disable the reconnect-once policy.
    #[must_use]
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }
}

/// One Eqiva radiator thermostat.
///
/// # Example
///
/// ```no_run
/// use eqiva_core::{BleConnector, Connector, Thermostat, ThermostatOptions};
///
/// # async fn example() -> eqiva_core::Result<()> {
/// let transport = BleConnector::default().open("00:1A:22:0A:0B:0C").await?;
/// let thermostat = Thermostat::new(transport, ThermostatOptions::default());
/// thermostat.connect().await?;
///
/// let state = thermostat.set_temperature(21.5).await?;
/// println!("valve at {:?}%", state.valve());
///
/// thermostat.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct Thermostat<T: Transport> {
    session: Session<T>,
    reconnect: bool,
    opened: AtomicBool,
}

impl<T: Transport> Thermostat<T> {
    pub fn new(transport: T, options: ThermostatOptions) -> Self {
        Self {
            session: Session::new(transport, options.session),
            reconnect: options.reconnect,
            opened: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &str {
        self.session.address()
    }

    /// The session underneath.
    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Cached device state; no round trip.
    pub fn state(&self) -> DeviceState {
        self.session.state()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> EventReceiver {
        self.session.subscribe()
    }

    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await?;
        self.opened.store(true, Ordering::Relaxed);
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.opened.store(false, Ordering::Relaxed);
        self.session.disconnect().await
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.session.is_connected() {
            return Ok(());
        }
        if self.reconnect && self.opened.load(Ordering::Relaxed) {
            info!("Reconnecting to {}", self.address());
            return self.session.connect().await;
        }
        Err(Error::NotConnected)
    }

    async fn execute(&self, command: Command) -> Result<Option<Notification>> {
        self.ensure_connected().await?;
        self.session.send(&command).await
    }

    async fn apply(&self, command: Command) -> Result<DeviceState> {
        self.execute(command).await?;
        Ok(self.state())
    }

    /// Mode from the cache, fetching status when none is known yet.
    async fn known_mode(&self) -> Result<Mode> {
        if let Some(mode) = self.state().mode() {
            return Ok(mode);
        }
        Ok(self.sync_status().await?.mode().unwrap_or_default())
    }

    async fn refuse_during_boost(&self, operation: &'static str) -> Result<()> {
        if self.known_mode().await?.overlays.boost {
            return Err(Error::unsupported(operation, EffectiveMode::BoostActive));
        }
        Ok(())
    }

    /// Check that the confirmed `state` carries `expected`.
    ///
    /// On a mismatch the status is read once more before the change is
    /// reported as not applied. Fields the firmware does not report pass.
    async fn confirm<V, F>(
        &self,
        what: &'static str,
        state: DeviceState,
        expected: V,
        read: F,
    ) -> Result<DeviceState>
    where
        V: PartialEq + fmt::Display,
        F: Fn(&DeviceState) -> Option<V>,
    {
        match read(&state) {
            Some(actual) if actual != expected => {
                debug!("{} reads {} after the change, re-syncing", what, actual);
            }
            _ => return Ok(state),
        }
        let state = self.sync_status().await?;
        match read(&state) {
            Some(actual) if actual != expected => {
                warn!("{} on {} is {}, not {}", what, self.address(), actual, expected);
                Err(Error::NotApplied {
                    what,
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                })
            }
            _ => Ok(state),
        }
    }

    /// Request a status frame, syncing the device clock to local time.
    #[tracing::instrument(level = "info", skip_all, fields(address = %self.address()))]
    pub async fn sync_status(&self) -> Result<DeviceState> {
        self.apply(Command::RequestStatus(local_now())).await
    }

    /// Set the target temperature in °C, rounded to the nearest half degree.
    ///
    /// Refused while boost is active.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address()))]
    pub async fn set_temperature(&self, celsius: f32) -> Result<DeviceState> {
        let target = Temperature::new(celsius)?;
        self.refuse_during_boost("set_temperature").await?;
        let state = self.apply(Command::SetTemperature(target)).await?;
        self.confirm("Target temperature", state, target, DeviceState::target)
            .await
    }

    /// Select comfort, eco, fully open or closed.
    ///
    /// Refused while boost is active.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address()))]
    pub async fn set_preset(&self, preset: Preset) -> Result<DeviceState> {
        self.refuse_during_boost("set_preset").await?;
        let state = self.apply(Command::Preset(preset)).await?;
        let expected = match preset {
            Preset::Comfort => state.config.map(|c| c.comfort),
            Preset::Eco => state.config.map(|c| c.eco),
            Preset::On => Some(Temperature::ON),
            Preset::Off => Some(Temperature::OFF),
        };
        match expected {
            Some(expected) => {
                self.confirm("Preset temperature", state, expected, DeviceState::target)
                    .await
            }
            None => Ok(state),
        }
    }

    /// Switch between the weekly program and manual control.
    ///
    /// Either mode ends a vacation hold.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address()))]
    pub async fn set_mode(&self, mode: BaseMode) -> Result<DeviceState> {
        let state = self.apply(Command::SetMode(mode)).await?;
        self.confirm("Mode", state, mode, |s| s.mode().map(|m| m.base))
            .await
    }

    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address()))]
    pub async fn set_boost(&self, on: bool) -> Result<DeviceState> {
        let state = self.apply(Command::SetBoost(on)).await?;
        self.confirm("Boost", state, on, |s| s.mode().map(|m| m.overlays.boost))
            .await
    }

    /// Hold `celsius` from `start` until `end`.
    ///
    /// The device starts a vacation as soon as it is set, so `start` may not
    /// lie in the future. `end` is rounded down to 30 minutes.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address()))]
    pub async fn set_vacation(
        &self,
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
        celsius: f32,
    ) -> Result<DeviceState> {
        let temperature = Temperature::new(celsius)?;
        let vacation = Vacation::between(start, end, temperature, local_now())?;
        let state = self.apply(Command::SetVacation(vacation)).await?;
        self.confirm("Vacation", state, true, |s| {
            s.mode().map(|m| m.overlays.vacation)
        })
        .await
    }

    /// Store `schedule` for each of `days`.
    ///
    /// Days whose cached program already matches are skipped. Refused during
    /// a vacation hold.
    #[tracing::instrument(level = "info", skip(self, schedule), fields(address = %self.address()))]
    pub async fn set_schedule(&self, days: &[Weekday], schedule: &DaySchedule) -> Result<DeviceState> {
        if schedule.is_empty() {
            return Err(EncodeError::InvalidSchedule("no change points".to_string()).into());
        }
        if self.known_mode().await?.overlays.vacation {
            return Err(Error::unsupported(
                "set_schedule",
                EffectiveMode::VacationActive,
            ));
        }

        let mut seen = Vec::with_capacity(days.len());
        for &day in days {
            if seen.contains(&day) {
                continue;
            }
            seen.push(day);
            if self.state().schedule(day) == Some(schedule) {
                debug!("{} program unchanged", day);
                continue;
            }
            self.execute(Command::SetSchedule {
                day,
                schedule: schedule.clone(),
            })
            .await?;
        }
        Ok(self.state())
    }

    /// Read back the stored program of each of `days`.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address()))]
    pub async fn request_schedule(&self, days: &[Weekday]) -> Result<Vec<(Weekday, DaySchedule)>> {
        let mut programs = Vec::with_capacity(days.len());
        for &day in days {
            if let Some(Notification::Schedule { day, schedule }) =
                self.execute(Command::RequestSchedule(day)).await?
            {
                programs.push((day, schedule));
            }
        }
        Ok(programs)
    }

    /// Set the measured-temperature offset in °C.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address()))]
    pub async fn set_offset(&self, celsius: f32) -> Result<DeviceState> {
        let offset = OffsetTemperature::new(celsius)?;
        let state = self.apply(Command::SetOffset(offset)).await?;
        self.confirm("Offset", state, offset, |s| s.config.map(|c| c.offset))
            .await
    }

    /// Store the comfort and eco temperatures.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address()))]
    pub async fn set_comfort_eco(&self, comfort: f32, eco: f32) -> Result<DeviceState> {
        let comfort = Temperature::new(comfort)?;
        let eco = Temperature::new(eco)?;
        let state = self.apply(Command::SetComfortEco { comfort, eco }).await?;
        let state = self
            .confirm("Comfort temperature", state, comfort, |s| s.config.map(|c| c.comfort))
            .await?;
        self.confirm("Eco temperature", state, eco, |s| s.config.map(|c| c.eco))
            .await
    }

    /// Configure open-window detection.
    ///
    /// With `enabled` set, `minutes` must be a multiple of 5 up to 995.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address()))]
    pub async fn configure_open_window(
        &self,
        celsius: f32,
        minutes: u16,
        enabled: bool,
    ) -> Result<DeviceState> {
        let temperature = Temperature::new(celsius)?;
        let window = if enabled {
            OpenWindowConfig::new(temperature, minutes)?
        } else {
            OpenWindowConfig::disabled(temperature)
        };
        let state = self.apply(Command::SetOpenWindow(window)).await?;
        let state = self
            .confirm("Open window temperature", state, window.temperature(), |s| {
                s.config.map(|c| c.open_window.temperature())
            })
            .await?;
        self.confirm("Open window minutes", state, window.minutes(), |s| {
            s.config.map(|c| c.open_window.minutes())
        })
        .await
    }

    /// Engage or release the child lock.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address()))]
    pub async fn set_lock(&self, on: bool) -> Result<DeviceState> {
        let state = self.apply(Command::SetLock(on)).await?;
        self.confirm("Lock", state, on, |s| s.flags().map(|f| f.locked))
            .await
    }

    /// Firmware version and serial number.
    #[tracing::instrument(level = "info", skip_all, fields(address = %self.address()))]
    pub async fn request_info(&self) -> Result<DeviceInfo> {
        match self.execute(Command::Pair).await? {
            Some(Notification::DeviceInfo(info)) => Ok(info),
            _ => {
                let config = self.session.config();
                Err(Error::CommandTimeout {
                    command: Command::Pair.name(),
                    timeout: config.response_timeout,
                    attempts: config.retry.attempts(),
                })
            }
        }
    }

    /// Device name from the GATT device-name characteristic.
    pub async fn read_name(&self) -> Result<String> {
        self.read_string(uuids::DEVICE_NAME).await
    }

    /// Vendor from the GATT manufacturer characteristic.
    pub async fn read_vendor(&self) -> Result<String> {
        self.read_string(uuids::VENDOR).await
    }

    async fn read_string(&self, characteristic: Uuid) -> Result<String> {
        self.ensure_connected().await?;
        let raw = self.session.read(characteristic).await?;
        Ok(String::from_utf8_lossy(&raw)
            .trim_end_matches('\0')
            .trim()
            .to_string())
    }

    /// Restore factory settings. The device sends no confirmation.
    #[tracing::instrument(level = "info", skip_all, fields(address = %self.address()))]
    pub async fn factory_reset(&self) -> Result<()> {
        self.execute(Command::FactoryReset).await?;
        Ok(())
    }
}

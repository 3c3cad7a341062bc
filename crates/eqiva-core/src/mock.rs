//! In-memory transport for testing without Bluetooth hardware.
//!
//! [`MockTransport`] implements [`Transport`] and records every frame written
//! to it. Replies come from an optional [`SimulatedThermostat`], which keeps
//! a device model and answers frames the way a real radiator valve does, or
//! are pushed by hand with [`MockTransport::notify`].
//!
//! # Features
//!
//! - **Lost replies**: swallow the reply to the next N writes
//! - **Latency simulation**: deliver replies after a delay
//! - **Link failures**: refuse connects or drop the link mid-command
//!
//! # Example
//!
//! ```
//! use eqiva_core::{MockTransport, SimulatedThermostat, Thermostat, ThermostatOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> eqiva_core::Result<()> {
//! let mock = MockTransport::with_simulator("00:1A:22:00:00:01", SimulatedThermostat::default());
//! let thermostat = Thermostat::new(mock.clone(), ThermostatOptions::default());
//! thermostat.connect().await?;
//!
//! let state = thermostat.set_temperature(21.5).await?;
//! assert_eq!(state.target().map(|t| t.celsius()), Some(21.5));
//! assert_eq!(mock.writes().last(), Some(&vec![0x41, 0x2B]));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use eqiva_types::{
    BaseMode, Command, DaySchedule, DeviceConfig, DeviceInfo, OffsetTemperature,
    OpenWindowConfig, Preset, StatusReport, Temperature, Weekday, decode_command,
    device_info_frame, schedule_confirmed_frame, schedule_frame, uuids,
};
use time::PrimitiveDateTime;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{Connector, Transport, TransportEvent};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A thermostat model that answers outbound frames.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedThermostat {
    /// What the next status frame reports.
    pub status: StatusReport,
    /// Stored programs in device order.
    pub schedules: [DaySchedule; 7],
    pub info: DeviceInfo,
    /// Clock last set by a status request.
    pub clock: Option<PrimitiveDateTime>,
    /// Answer with short status frames that omit the configuration block.
    pub legacy_firmware: bool,
    /// Opcodes answered with the unchanged status, as if the setting
    /// did not take.
    pub ignored: Vec<u8>,
}

impl Default for SimulatedThermostat {
    fn default() -> Self {
        let t = |raw: f32| Temperature::new(raw).unwrap_or(Temperature::OFF);
        let mut status = StatusReport::new(t(20.0));
        status.config = Some(DeviceConfig {
            comfort: t(21.0),
            eco: t(17.0),
            offset: OffsetTemperature::default(),
            open_window: OpenWindowConfig::new(t(12.0), 15)
                .unwrap_or(OpenWindowConfig::disabled(t(12.0))),
        });
        Self {
            status,
            schedules: std::array::from_fn(|_| DaySchedule::constant(t(17.0))),
            info: DeviceInfo {
                firmware: 146,
                serial: "OEQ1234567".to_string(),
            },
            clock: None,
            legacy_firmware: false,
            ignored: Vec::new(),
        }
    }
}

impl SimulatedThermostat {
    /// Apply one outbound frame and return the frames the device sends back.
    ///
    /// Frames the device would not understand are ignored.
    pub fn respond(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        let command = match decode_command(frame) {
            Ok(command) => command,
            Err(e) => {
                debug!("Simulator ignoring frame: {}", e);
                return Vec::new();
            }
        };

        if frame.first().is_some_and(|op| self.ignored.contains(op)) {
            debug!("Simulator not applying {}", command.name());
            return vec![self.status_frame()];
        }

        let status = &mut self.status;
        match command {
            Command::Pair => return vec![device_info_frame(&self.info)],
            Command::RequestStatus(now) => self.clock = Some(now),
            Command::SetTemperature(t) => status.target = t,
            Command::Preset(preset) => {
                if let Some(cfg) = &status.config {
                    status.target = match preset {
                        Preset::Comfort => cfg.comfort,
                        Preset::Eco => cfg.eco,
                        Preset::On => Temperature::ON,
                        Preset::Off => Temperature::OFF,
                    };
                }
            }
            Command::SetMode(base) => {
                status.mode.base = base;
                status.mode.overlays.vacation = false;
                status.vacation = None;
            }
            Command::SetBoost(on) => status.mode.overlays.boost = on,
            Command::SetVacation(vacation) => {
                status.mode.overlays.vacation = true;
                status.target = vacation.temperature();
                status.vacation = Some(vacation);
            }
            Command::SetSchedule { day, schedule } => {
                self.schedules[usize::from(day.as_byte())] = schedule;
                return vec![schedule_confirmed_frame(day)];
            }
            Command::RequestSchedule(day) => {
                return schedule_frame(day, self.schedule(day)).into_iter().collect();
            }
            Command::SetComfortEco { comfort, eco } => {
                if let Some(cfg) = status.config.as_mut() {
                    cfg.comfort = comfort;
                    cfg.eco = eco;
                }
            }
            Command::SetOffset(offset) => {
                if let Some(cfg) = status.config.as_mut() {
                    cfg.offset = offset;
                }
            }
            Command::SetOpenWindow(window) => {
                if let Some(cfg) = status.config.as_mut() {
                    cfg.open_window = window;
                }
            }
            Command::SetLock(on) => status.flags.locked = on,
            Command::FactoryReset => {
                *self = Self::default();
                return Vec::new();
            }
            _ => return Vec::new(),
        }
        vec![self.status_frame()]
    }

    /// The status frame as this firmware would send it.
    pub fn status_frame(&self) -> Vec<u8> {
        let mut report = self.status.clone();
        if self.legacy_firmware {
            report.config = None;
        }
        report.to_frame()
    }

    pub fn schedule(&self, day: Weekday) -> &DaySchedule {
        &self.schedules[usize::from(day.as_byte())]
    }

    /// Put the device in manual mode at `celsius`.
    pub fn manual(mut self, celsius: f32) -> Self {
        self.status.mode.base = BaseMode::Manual;
        if let Ok(t) = Temperature::new(celsius) {
            self.status.target = t;
        }
        self
    }

    /// Acknowledge `opcode` without applying it.
    pub fn ignoring(mut self, opcode: u8) -> Self {
        self.ignored.push(opcode);
        self
    }

    /// Start with boost active.
    pub fn boosting(mut self) -> Self {
        self.status.mode.overlays.boost = true;
        self
    }
}

#[derive(Default)]
struct MockLink {
    writes: Vec<Vec<u8>>,
    notify: Option<mpsc::Sender<TransportEvent>>,
    simulator: Option<SimulatedThermostat>,
    reads: HashMap<Uuid, Vec<u8>>,
}

struct MockInner {
    address: String,
    connected: AtomicBool,
    fail_connect: AtomicBool,
    /// Writes whose reply is swallowed.
    silent_writes: AtomicU32,
    /// Reply delivery delay in milliseconds (0 = immediate).
    reply_latency_ms: AtomicU64,
    connect_count: AtomicU32,
    link: Mutex<MockLink>,
}

/// A transport backed by memory.
///
/// Cloning yields another handle to the same link, so a test can keep one
/// handle while a session owns the other.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("address", &self.inner.address)
            .field("connected", &self.is_link_up())
            .finish()
    }
}

impl MockTransport {
    /// A link with no device model; replies are injected by hand.
    pub fn new(address: &str) -> Self {
        Self {
            inner: Arc::new(MockInner {
                address: address.to_string(),
                connected: AtomicBool::new(false),
                fail_connect: AtomicBool::new(false),
                silent_writes: AtomicU32::new(0),
                reply_latency_ms: AtomicU64::new(0),
                connect_count: AtomicU32::new(0),
                link: Mutex::new(MockLink::default()),
            }),
        }
    }

    /// A link to a simulated thermostat that answers every frame.
    pub fn with_simulator(address: &str, simulator: SimulatedThermostat) -> Self {
        let mock = Self::new(address);
        lock(&mock.inner.link).simulator = Some(simulator);
        mock
    }

    /// Snapshot of the simulated device.
    pub fn simulator(&self) -> Option<SimulatedThermostat> {
        lock(&self.inner.link).simulator.clone()
    }

    /// Change the simulated device in place.
    pub fn update_simulator(&self, f: impl FnOnce(&mut SimulatedThermostat)) {
        if let Some(sim) = lock(&self.inner.link).simulator.as_mut() {
            f(sim);
        }
    }

    /// Every frame written so far.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.inner.link).writes.clone()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.inner.link).writes.len()
    }

    /// How often the link was established.
    pub fn connect_count(&self) -> u32 {
        self.inner.connect_count.load(Ordering::Relaxed)
    }

    pub fn is_link_up(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// Swallow the replies to the next `count` writes.
    pub fn silence_next(&self, count: u32) {
        self.inner.silent_writes.store(count, Ordering::Relaxed);
    }

    /// Deliver replies `latency` after each write.
    pub fn set_reply_latency(&self, latency: Duration) {
        self.inner
            .reply_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Make the next connects fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::Relaxed);
    }

    /// Serve `value` for reads of `characteristic`.
    pub fn set_read(&self, characteristic: Uuid, value: impl Into<Vec<u8>>) {
        lock(&self.inner.link)
            .reads
            .insert(characteristic, value.into());
    }

    /// Push a notification as if the device sent it.
    pub async fn notify(&self, frame: impl Into<Vec<u8>>) {
        let tx = lock(&self.inner.link).notify.clone();
        if let Some(tx) = tx {
            let _ = tx.send(TransportEvent::Notification(frame.into())).await;
        }
    }

    /// Drop the link as if the device went out of range.
    pub async fn drop_link(&self) {
        self.inner.connected.store(false, Ordering::Relaxed);
        let tx = lock(&self.inner.link).notify.take();
        if let Some(tx) = tx {
            let _ = tx.send(TransportEvent::Disconnected).await;
        }
    }

    fn check_connected(&self) -> Result<()> {
        if self.is_link_up() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn address(&self) -> &str {
        &self.inner.address
    }

    async fn connect(&self) -> Result<()> {
        if self.inner.fail_connect.load(Ordering::Relaxed) {
            return Err(Error::connection_failed(
                Some(self.inner.address.clone()),
                ConnectionFailureReason::Other("mock connect failure".to_string()),
            ));
        }
        self.inner.connected.store(true, Ordering::Relaxed);
        self.inner.connect_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<mpsc::Receiver<TransportEvent>> {
        self.check_connected()?;
        if characteristic != uuids::NOTIFY {
            return Err(Error::characteristic_not_found(characteristic.to_string(), 1));
        }
        let (tx, rx) = mpsc::channel(32);
        lock(&self.inner.link).notify = Some(tx);
        Ok(rx)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.check_connected()?;
        if characteristic != uuids::REQUEST {
            return Err(Error::characteristic_not_found(characteristic.to_string(), 1));
        }

        let silent = self
            .inner
            .silent_writes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();

        let (replies, tx) = {
            let mut link = lock(&self.inner.link);
            link.writes.push(data.to_vec());
            let replies = match (&mut link.simulator, silent) {
                (Some(sim), false) => sim.respond(data),
                _ => Vec::new(),
            };
            (replies, link.notify.clone())
        };

        let Some(tx) = tx else { return Ok(()) };
        let latency = self.inner.reply_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(latency)).await;
                for frame in replies {
                    let _ = tx.send(TransportEvent::Notification(frame)).await;
                }
            });
        } else {
            for frame in replies {
                let _ = tx.send(TransportEvent::Notification(frame)).await;
            }
        }
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        self.check_connected()?;
        lock(&self.inner.link)
            .reads
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| Error::characteristic_not_found(characteristic.to_string(), 1))
    }

    async fn disconnect(&self) -> Result<()> {
        self.inner.connected.store(false, Ordering::Relaxed);
        lock(&self.inner.link).notify = None;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.is_link_up()
    }
}

/// Hands out [`MockTransport`]s by address.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    devices: Arc<Mutex<HashMap<String, MockTransport>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device; addresses match case-insensitively.
    #[must_use]
    pub fn with_device(self, transport: MockTransport) -> Self {
        lock(&self.devices).insert(transport.address().to_uppercase(), transport);
        self
    }

    pub fn device(&self, address: &str) -> Option<MockTransport> {
        lock(&self.devices).get(&address.to_uppercase()).cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn open(&self, address: &str) -> Result<MockTransport> {
        self.device(address)
            .ok_or_else(|| Error::device_not_found(address))
    }
}

//! Scoped runs of operations against one or more thermostats.
//!
//! A [`Controller`] resolves each target through its [`Aliases`], opens a
//! session, performs the requested [`Operation`]s in order and closes the
//! session again whatever the outcome. Devices are handled one after
//! another since they share a radio. A failed connect is reported, not
//! retried.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use tracing::{info, warn};

use eqiva_types::{BaseMode, DaySchedule, DaySelector, DeviceInfo, Preset, Weekday};

use crate::error::{Error, Result};
use crate::retry::{RetryConfig, with_retry};
use crate::session::DeviceState;
use crate::thermostat::{Thermostat, ThermostatOptions};
use crate::transport::{Connector, Transport};
use crate::util::{local_now, looks_like_address};

/// Human-readable names for thermostat addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aliases(BTreeMap<String, String>);

impl Aliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an alias. Returns the previous address.
    pub fn insert(&mut self, alias: impl Into<String>, address: impl Into<String>) -> Option<String> {
        self.0.insert(alias.into(), address.into())
    }

    pub fn remove(&mut self, alias: &str) -> Option<String> {
        self.0.remove(alias)
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.0.get(alias).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Turn an address, alias or part of an alias into addresses.
    ///
    /// An exact alias wins, then an address stands for itself. Anything
    /// else selects every device whose alias contains it, so `room`
    /// matches both `living room` and `bedroom`.
    pub fn resolve(&self, target: &str) -> Result<Vec<String>> {
        if let Some(address) = self.get(target) {
            return Ok(vec![address.to_string()]);
        }
        if looks_like_address(target) {
            return Ok(vec![target.to_string()]);
        }
        let mut addresses: Vec<String> = Vec::new();
        for (alias, address) in self.iter() {
            if alias.contains(target) && !addresses.iter().any(|a| a == address) {
                addresses.push(address.to_string());
            }
        }
        if addresses.is_empty() || target.is_empty() {
            return Err(Error::device_not_found(target));
        }
        Ok(addresses)
    }
}

impl FromIterator<(String, String)> for Aliases {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One step of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Status,
    SetTemperature(f32),
    Preset(Preset),
    SetMode(BaseMode),
    SetBoost(bool),
    /// Vacation from now until `end`.
    SetVacation { end: PrimitiveDateTime, temperature: f32 },
    SetSchedule { days: DaySelector, schedule: DaySchedule },
    RequestSchedule(DaySelector),
    SetOffset(f32),
    SetComfortEco { comfort: f32, eco: f32 },
    ConfigureOpenWindow { temperature: f32, minutes: u16 },
    SetLock(bool),
    Info,
    Name,
    Vendor,
    /// Name, vendor, identity, status and all seven day programs.
    Dump,
    FactoryReset,
}

/// Everything a thermostat reports about itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDump {
    pub name: String,
    pub vendor: String,
    pub info: DeviceInfo,
    pub state: DeviceState,
    pub schedules: Vec<(Weekday, DaySchedule)>,
}

/// What one [`Operation`] produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    /// Device state after the operation.
    State(DeviceState),
    Schedules(Vec<(Weekday, DaySchedule)>),
    Info(DeviceInfo),
    Text(String),
    Dump(DeviceDump),
    Done,
}

/// Everything a run against one device produced.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    /// The alias or address as given.
    pub target: String,
    pub address: String,
    /// One entry per operation, in order.
    pub results: Vec<Outcome>,
    /// Last known state before the session closed.
    pub state: DeviceState,
}

/// Runs operations against thermostats reached through a [`Connector`].
pub struct Controller<C: Connector> {
    connector: C,
    aliases: Aliases,
    options: ThermostatOptions,
    connect_retry: RetryConfig,
}

impl<C: Connector> Controller<C> {
    pub fn new(connector: C, aliases: Aliases, options: ThermostatOptions) -> Self {
        Self {
            connector,
            aliases,
            options,
            connect_retry: RetryConfig::none(),
        }
    }

    /// Retry policy for locating and connecting to each device. None by
    /// default.
    #[must_use]
    pub fn connect_retry(mut self, retry: RetryConfig) -> Self {
        self.connect_retry = retry;
        self
    }

    pub fn aliases(&self) -> &Aliases {
        &self.aliases
    }

    /// Run `operations` against each target in turn.
    ///
    /// A target matching several aliases yields one entry per device. A
    /// failing device does not stop the others.
    pub async fn run(
        &self,
        targets: &[String],
        operations: &[Operation],
    ) -> Vec<(String, Result<DeviceReport>)> {
        let mut reports = Vec::with_capacity(targets.len());
        for target in targets {
            let addresses = match self.aliases.resolve(target) {
                Ok(addresses) => addresses,
                Err(e) => {
                    warn!("{}: {}", target, e);
                    reports.push((target.clone(), Err(e)));
                    continue;
                }
            };
            for address in addresses {
                let report = self.run_address(target, address, operations).await;
                if let Err(e) = &report {
                    warn!("{}: {}", target, e);
                }
                reports.push((target.clone(), report));
            }
        }
        reports
    }

    /// Connect to the one device `target` names, perform `operations` in
    /// order and disconnect.
    ///
    /// The first failing operation ends the run; the session is closed
    /// either way.
    pub async fn run_device(&self, target: &str, operations: &[Operation]) -> Result<DeviceReport> {
        let mut addresses = self.aliases.resolve(target)?;
        if addresses.len() > 1 {
            return Err(Error::invalid_config(format!(
                "'{}' matches {} devices",
                target,
                addresses.len()
            )));
        }
        let address = addresses.remove(0);
        self.run_address(target, address, operations).await
    }

    #[tracing::instrument(level = "info", skip(self, operations), fields(count = operations.len()))]
    async fn run_address(
        &self,
        target: &str,
        address: String,
        operations: &[Operation],
    ) -> Result<DeviceReport> {
        let transport = with_retry(&self.connect_retry, "open", || self.connector.open(&address))
            .await?;
        let thermostat = Thermostat::new(transport, self.options.clone());

        let outcome = async {
            with_retry(&self.connect_retry, "connect", || thermostat.connect()).await?;
            let mut results = Vec::with_capacity(operations.len());
            for operation in operations {
                results.push(perform(&thermostat, operation).await?);
            }
            Ok::<_, Error>(results)
        }
        .await;

        let state = thermostat.state();
        if let Err(e) = thermostat.disconnect().await {
            warn!("Disconnect from {} failed: {}", address, e);
        }
        let results = outcome?;
        info!("{} operation(s) done on {}", results.len(), address);

        Ok(DeviceReport {
            target: target.to_string(),
            address,
            results,
            state,
        })
    }
}

async fn perform<T: Transport>(thermostat: &Thermostat<T>, operation: &Operation) -> Result<Outcome> {
    let today = Weekday::from(local_now().weekday());
    let outcome = match operation {
        Operation::Status => Outcome::State(thermostat.sync_status().await?),
        Operation::SetTemperature(t) => Outcome::State(thermostat.set_temperature(*t).await?),
        Operation::Preset(p) => Outcome::State(thermostat.set_preset(*p).await?),
        Operation::SetMode(m) => Outcome::State(thermostat.set_mode(*m).await?),
        Operation::SetBoost(on) => Outcome::State(thermostat.set_boost(*on).await?),
        Operation::SetVacation { end, temperature } => Outcome::State(
            thermostat
                .set_vacation(local_now(), *end, *temperature)
                .await?,
        ),
        Operation::SetSchedule { days, schedule } => Outcome::State(
            thermostat
                .set_schedule(&days.days(today), schedule)
                .await?,
        ),
        Operation::RequestSchedule(days) => {
            Outcome::Schedules(thermostat.request_schedule(&days.days(today)).await?)
        }
        Operation::SetOffset(o) => Outcome::State(thermostat.set_offset(*o).await?),
        Operation::SetComfortEco { comfort, eco } => {
            Outcome::State(thermostat.set_comfort_eco(*comfort, *eco).await?)
        }
        Operation::ConfigureOpenWindow {
            temperature,
            minutes,
        } => Outcome::State(
            thermostat
                .configure_open_window(*temperature, *minutes, *minutes > 0)
                .await?,
        ),
        Operation::SetLock(on) => Outcome::State(thermostat.set_lock(*on).await?),
        Operation::Info => Outcome::Info(thermostat.request_info().await?),
        Operation::Name => Outcome::Text(thermostat.read_name().await?),
        Operation::Vendor => Outcome::Text(thermostat.read_vendor().await?),
        Operation::Dump => Outcome::Dump(DeviceDump {
            name: thermostat.read_name().await?,
            vendor: thermostat.read_vendor().await?,
            info: thermostat.request_info().await?,
            state: thermostat.sync_status().await?,
            schedules: thermostat
                .request_schedule(&DaySelector::Everyday.days(today))
                .await?,
        }),
        Operation::FactoryReset => {
            thermostat.factory_reset().await?;
            Outcome::Done
        }
    };
    Ok(outcome)
}

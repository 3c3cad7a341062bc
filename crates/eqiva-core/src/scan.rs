//! Thermostat discovery.
//!
//! Eqiva thermostats advertise as `CC-RT-BLE` from addresses in the eQ-3
//! range `00:1A:22`. Either is enough to count a peripheral as one.

use std::time::Duration;

use btleplug::api::{Central, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{DeviceNotFoundReason, Error, Result};
use crate::util::{create_identifier, format_peripheral_id};
use eqiva_types::uuids::{ADVERTISED_NAME, EQIVA_SERVICE, is_eqiva_address};

/// Progress update for [`find_device_with_progress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindProgress {
    /// The adapter already knew the device.
    CacheHit,
    ScanAttempt {
        /// 1-based.
        attempt: u32,
        total: u32,
        duration_secs: u64,
    },
    Found { attempt: u32 },
    RetryNeeded { attempt: u32 },
}

/// Callback type for progress updates during device finding.
pub type ProgressCallback = Box<dyn Fn(FindProgress) + Send + Sync>;

/// A thermostat seen during a scan.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredThermostat {
    /// Advertised name, usually `CC-RT-BLE`.
    pub name: Option<String>,
    /// BLE address (zeros on macOS, see `identifier`).
    pub address: String,
    /// What to pass back in to connect: peripheral ID on macOS, address elsewhere.
    pub identifier: String,
    pub rssi: Option<i16>,
    #[serde(skip)]
    pub id: PeripheralId,
}

/// Options for scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to listen for advertisements.
    pub duration: Duration,
    /// Only return peripherals that look like Eqiva thermostats.
    pub thermostats_only: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            thermostats_only: true,
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration = Duration::from_secs(secs);
        self
    }

    /// Report every BLE peripheral, not just thermostats.
    #[must_use]
    pub fn all_devices(mut self) -> Self {
        self.thermostats_only = false;
        self
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Scan for thermostats in range.
///
/// An empty list is not an error.
pub async fn scan_for_thermostats(options: ScanOptions) -> Result<Vec<DiscoveredThermostat>> {
    let adapter = get_adapter().await?;
    scan_with_adapter(&adapter, options).await
}

/// Scan using a specific adapter.
#[tracing::instrument(level = "info", skip_all, fields(duration_secs = options.duration.as_secs()))]
pub async fn scan_with_adapter(
    adapter: &Adapter,
    options: ScanOptions,
) -> Result<Vec<DiscoveredThermostat>> {
    info!("Starting BLE scan for {} seconds...", options.duration.as_secs());

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(options.duration).await;
    adapter.stop_scan().await?;

    let mut discovered = Vec::new();
    for peripheral in adapter.peripherals().await? {
        match process_peripheral(&peripheral, options.thermostats_only).await {
            Ok(Some(found)) => {
                info!("Found thermostat {} ({:?})", found.identifier, found.rssi);
                discovered.push(found);
            }
            Ok(None) => {}
            Err(e) => debug!("Error processing peripheral: {}", e),
        }
    }

    // strongest signal first
    discovered.sort_by_key(|d| std::cmp::Reverse(d.rssi.unwrap_or(i16::MIN)));
    info!("Scan complete. Found {} device(s)", discovered.len());
    Ok(discovered)
}

async fn process_peripheral(
    peripheral: &Peripheral,
    thermostats_only: bool,
) -> Result<Option<DiscoveredThermostat>> {
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };
    if thermostats_only && !is_thermostat(&properties) {
        return Ok(None);
    }

    let id = peripheral.id();
    let address = properties.address.to_string();
    let identifier = create_identifier(&address, &id);
    Ok(Some(DiscoveredThermostat {
        name: properties.local_name,
        address,
        identifier,
        rssi: properties.rssi,
        id,
    }))
}

fn is_thermostat(properties: &PeripheralProperties) -> bool {
    looks_like_thermostat(
        &properties.address.to_string(),
        properties.local_name.as_deref(),
        properties.services.contains(&EQIVA_SERVICE),
    )
}

/// Classify an advertisement by address prefix, name or service.
pub(crate) fn looks_like_thermostat(address: &str, name: Option<&str>, has_service: bool) -> bool {
    is_eqiva_address(address)
        || has_service
        || name.is_some_and(|n| n.trim().eq_ignore_ascii_case(ADVERTISED_NAME))
}

/// Find one peripheral by address or platform identifier.
pub async fn find_device(identifier: &str, options: ScanOptions) -> Result<(Adapter, Peripheral)> {
    find_device_with_progress(identifier, options, None).await
}

/// Find one peripheral, reporting progress.
///
/// Checks what the adapter already knows first, then runs up to three scans
/// of increasing length, since advertisements are easily missed.
pub async fn find_device_with_progress(
    identifier: &str,
    options: ScanOptions,
    progress: Option<ProgressCallback>,
) -> Result<(Adapter, Peripheral)> {
    let adapter = get_adapter().await?;
    let wanted = identifier.to_lowercase();
    let report = |p: FindProgress| {
        if let Some(cb) = &progress {
            cb(p);
        }
    };

    info!("Looking for device: {}", identifier);
    if let Some(peripheral) = find_peripheral_by_identifier(&adapter, &wanted).await? {
        info!("Found device in cache (no scan needed)");
        report(FindProgress::CacheHit);
        return Ok((adapter, peripheral));
    }

    let max_attempts: u32 = 3;
    let base = (options.duration / 2).max(Duration::from_secs(2));

    for attempt in 1..=max_attempts {
        let duration = base * attempt;
        info!("Scan attempt {}/{} ({}s)...", attempt, max_attempts, duration.as_secs());
        report(FindProgress::ScanAttempt {
            attempt,
            total: max_attempts,
            duration_secs: duration.as_secs(),
        });

        adapter.start_scan(ScanFilter::default()).await?;
        sleep(duration).await;
        adapter.stop_scan().await?;

        if let Some(peripheral) = find_peripheral_by_identifier(&adapter, &wanted).await? {
            info!("Found device on attempt {}", attempt);
            report(FindProgress::Found { attempt });
            return Ok((adapter, peripheral));
        }
        if attempt < max_attempts {
            warn!("Device not found, retrying...");
            report(FindProgress::RetryNeeded { attempt });
        }
    }

    warn!("Device not found after {} attempts: {}", max_attempts, identifier);
    Err(Error::device_not_found(identifier))
}

/// Search the adapter's known peripherals for `identifier_lower`.
pub async fn find_peripheral_by_identifier(
    adapter: &Adapter,
    identifier_lower: &str,
) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        let peripheral_id = format_peripheral_id(&peripheral.id()).to_lowercase();
        let address = props.address.to_string().to_lowercase();
        if matches_identifier(&address, &peripheral_id, identifier_lower) {
            debug!("Matched {} as {}", identifier_lower, peripheral_id);
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

/// Compare lowercase address / peripheral ID against a lowercase identifier.
///
/// Addresses match with or without separators; `-` is accepted for `:`.
fn matches_identifier(address: &str, peripheral_id: &str, identifier: &str) -> bool {
    let bare = |s: &str| s.replace([':', '-'], "");
    if peripheral_id == identifier {
        return true;
    }
    address != "00:00:00:00:00:00" && bare(address) == bare(identifier)
}

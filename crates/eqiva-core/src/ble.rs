//! btleplug-backed [`Transport`].
//!
//! [`BleConnector`] locates a thermostat by address and hands out an
//! unconnected [`BleTransport`]; the session connects it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::scan::{ScanOptions, find_device};
use crate::transport::{Connector, Transport, TransportEvent};
use crate::util::{create_identifier, format_peripheral_id};
use eqiva_types::uuids::{NOTIFY, REQUEST};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeouts for the BLE link.
///
/// ```
/// use std::time::Duration;
/// use eqiva_core::ConnectionConfig;
///
/// let config = ConnectionConfig::default().connection_timeout(Duration::from_secs(25));
/// assert_eq!(config.connection_timeout, Duration::from_secs(25));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub connection_timeout: Duration,
    /// Service discovery after connecting.
    pub discovery_timeout: Duration,
    pub read_timeout: Duration,
    /// Link-layer acknowledgement of a write.
    pub write_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Longer timeouts for thermostats behind walls or at the edge of range.
    pub fn challenging_environment() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            discovery_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

/// A GATT link to one thermostat through the platform BLE stack.
pub struct BleTransport {
    adapter: Adapter,
    peripheral: Peripheral,
    /// MAC address, or the CoreBluetooth UUID on macOS.
    address: String,
    config: ConnectionConfig,
    characteristics: RwLock<HashMap<Uuid, Characteristic>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    disconnected: AtomicBool,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("address", &self.address)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BleTransport {
    /// Wrap an already discovered peripheral.
    pub async fn from_peripheral(
        adapter: Adapter,
        peripheral: Peripheral,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let properties = peripheral.properties().await?;
        let address = properties
            .map(|p| create_identifier(&p.address.to_string(), &peripheral.id()))
            .unwrap_or_else(|| format_peripheral_id(&peripheral.id()));

        Ok(Self {
            adapter,
            peripheral,
            address,
            config,
            characteristics: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            disconnected: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        if let Some(c) = self.characteristics.read().await.get(&uuid) {
            return Ok(c.clone());
        }
        Err(Error::characteristic_not_found(
            uuid.to_string(),
            self.peripheral.services().len(),
        ))
    }

    async fn stop_listeners(&self) {
        for handle in self.listeners.lock().await.drain(..) {
            handle.abort();
        }
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn address(&self) -> &str {
        &self.address
    }

    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address))]
    async fn connect(&self) -> Result<()> {
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            info!("Connecting to device...");
            timeout(self.config.connection_timeout, self.peripheral.connect())
                .await
                .map_err(|_| {
                    Error::timeout("connect to device", self.config.connection_timeout)
                })??;
        }

        debug!("Discovering services...");
        timeout(
            self.config.discovery_timeout,
            self.peripheral.discover_services(),
        )
        .await
        .map_err(|_| Error::timeout("discover services", self.config.discovery_timeout))??;

        let mut cache = HashMap::new();
        for service in self.peripheral.services() {
            debug!("  Service: {}", service.uuid);
            for c in service.characteristics {
                cache.insert(c.uuid, c);
            }
        }
        if !cache.contains_key(&REQUEST) || !cache.contains_key(&NOTIFY) {
            let _ = self.peripheral.disconnect().await;
            return Err(Error::connection_failed(
                Some(self.address.clone()),
                ConnectionFailureReason::NotAThermostat,
            ));
        }
        debug!("Cached {} characteristics", cache.len());
        *self.characteristics.write().await = cache;
        self.disconnected.store(false, Ordering::SeqCst);
        info!("Connected");
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<mpsc::Receiver<TransportEvent>> {
        let target = self.characteristic(characteristic).await?;
        self.peripheral.subscribe(&target).await?;

        let mut notifications = self.peripheral.notifications().await?;
        let mut central = self.adapter.events().await?;
        let id = self.peripheral.id();
        let (tx, rx) = mpsc::channel(32);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    n = notifications.next() => match n {
                        Some(n) if n.uuid == characteristic => {
                            if tx.send(TransportEvent::Notification(n.value)).await.is_err() {
                                return;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                    e = central.next() => match e {
                        Some(CentralEvent::DeviceDisconnected(gone)) if gone == id => break,
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            let _ = tx.send(TransportEvent::Disconnected).await;
        });
        self.listeners.lock().await.push(handle);
        Ok(rx)
    }

    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let target = self.characteristic(characteristic).await?;
        timeout(
            self.config.write_timeout,
            self.peripheral.write(&target, data, WriteType::WithResponse),
        )
        .await
        .map_err(|_| {
            Error::timeout(
                format!("write characteristic {}", characteristic),
                self.config.write_timeout,
            )
        })??;
        Ok(())
    }

    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>> {
        let target = self.characteristic(characteristic).await?;
        let data = timeout(self.config.read_timeout, self.peripheral.read(&target))
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("read characteristic {}", characteristic),
                    self.config.read_timeout,
                )
            })??;
        Ok(data)
    }

    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address))]
    async fn disconnect(&self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        self.stop_listeners().await;
        self.characteristics.write().await.clear();
        if self.peripheral.is_connected().await.unwrap_or(false) {
            info!("Disconnecting from device...");
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
            && self.peripheral.is_connected().await.unwrap_or(false)
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(
            address = %self.address,
            "Transport dropped while connected, disconnecting in the background"
        );
        if let Ok(mut handles) = self.listeners.try_lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
        let peripheral = self.peripheral.clone();
        let address = self.address.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!(address = %address, error = %e, "Best-effort disconnect failed");
                }
            });
        }
    }
}

/// Opens [`BleTransport`]s by scanning for the requested address.
#[derive(Debug, Clone, Default)]
pub struct BleConnector {
    pub connection: ConnectionConfig,
    pub scan: ScanOptions,
}

impl BleConnector {
    pub fn new(connection: ConnectionConfig, scan: ScanOptions) -> Self {
        Self { connection, scan }
    }
}

#[async_trait]
impl Connector for BleConnector {
    type Transport = BleTransport;

    async fn open(&self, address: &str) -> Result<BleTransport> {
        let scan = self.scan.clone().all_devices();
        let (adapter, peripheral) = find_device(address, scan).await?;
        BleTransport::from_peripheral(adapter, peripheral, self.connection.clone()).await
    }
}

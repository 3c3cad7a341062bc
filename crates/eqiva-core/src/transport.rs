//! The seam between the session engine and a radio.
//!
//! A [`Transport`] is one GATT link to one thermostat. The session only
//! ever writes frames, reads plain characteristics and listens to the
//! notification stream; everything BLE-specific lives behind this trait,
//! so the engine runs unchanged against [`crate::BleTransport`] or the
//! in-memory [`crate::MockTransport`].

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Something the link reports without being asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A notification payload from the subscribed characteristic.
    Notification(Vec<u8>),
    /// The link is gone; no further events follow.
    Disconnected,
}

/// A GATT link to a single device.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Address (or platform identifier) of the remote device.
    fn address(&self) -> &str;

    /// Establish the link and discover services.
    async fn connect(&self) -> Result<()>;

    /// Enable notifications on `characteristic`.
    ///
    /// The returned channel also carries [`TransportEvent::Disconnected`]
    /// when the link drops.
    async fn subscribe(&self, characteristic: Uuid) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Write a frame, waiting for the link-layer acknowledgement.
    async fn write(&self, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Read a characteristic value.
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Tear the link down. Safe to call on a closed link.
    async fn disconnect(&self) -> Result<()>;

    /// Whether the link is currently up.
    async fn is_connected(&self) -> bool;
}

/// Opens transports by address.
///
/// The controller uses this to get a fresh link per target device.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The transport this connector produces.
    type Transport: Transport;

    /// Locate `address` and return an unconnected transport for it.
    async fn open(&self, address: &str) -> Result<Self::Transport>;
}

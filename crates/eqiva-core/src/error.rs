//! Error types for eqiva-core.
//!
//! Every failure a caller can see while talking to a thermostat is an
//! [`Error`]. The variants fall into a few families:
//!
//! | Family | Variants | What to do |
//! |--------|----------|------------|
//! | Connection | [`Error::ConnectionFailed`], [`Error::NotConnected`], [`Error::Bluetooth`], [`Error::Timeout`] | Reconnect, then retry |
//! | Encoding | [`Error::Encoding`] | Fix the input; nothing was sent |
//! | Decoding | [`Error::Decoding`] | Report; cached state was left untouched |
//! | Command | [`Error::CommandTimeout`], [`Error::NotApplied`] | The session stays connected; retry later |
//! | Policy | [`Error::UnsupportedOperation`] | Leave the blocking mode first |
//! | Discovery | [`Error::DeviceNotFound`], [`Error::CharacteristicNotFound`] | Check address, range and firmware |
//!
//! Use [`Error::is_connection_error`] to tell the first family apart from
//! the rest.

use std::time::Duration;

use eqiva_types::{DecodeError, EffectiveMode, EncodeError};
use thiserror::Error;

/// Errors that can occur when driving an Eqiva thermostat.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found during scan or connection.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Operation attempted while no session is open.
    #[error("Not connected to device")]
    NotConnected,

    /// Required GATT characteristic not found on device.
    #[error("Characteristic not found: {uuid} (searched in {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// Input could not be turned into a frame. Nothing was written.
    #[error("Invalid input: {0}")]
    Encoding(#[from] EncodeError),

    /// The device sent a frame that could not be decoded.
    #[error("Malformed device response: {0}")]
    Decoding(#[from] DecodeError),

    /// A transport operation (connect, write, read) timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// No matching response arrived for a command, retries included.
    #[error("Command '{command}' got no response within {timeout:?} ({attempts} attempts)")]
    CommandTimeout {
        /// The command that went unanswered.
        command: &'static str,
        /// Per-attempt response window.
        timeout: Duration,
        /// Attempts made, the first one included.
        attempts: u32,
    },

    /// The device answered but its state still disagrees with the request
    /// after a fresh status read.
    #[error("{what} was not applied: expected {expected}, device reports {actual}")]
    NotApplied {
        /// The setting that was changed.
        what: &'static str,
        /// Requested value.
        expected: String,
        /// Value the device reports.
        actual: String,
    },

    /// The command conflicts with the thermostat's current mode.
    #[error("Cannot {operation} while in {mode} mode")]
    UnsupportedOperation {
        /// The refused operation.
        operation: &'static str,
        /// The mode that blocks it.
        mode: EffectiveMode,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Connection failed with specific reason.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device identifier that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Bluetooth adapter not available or powered off.
    AdapterUnavailable,
    /// Connection attempt timed out.
    Timeout,
    /// The link dropped while a session was open.
    LinkLost,
    /// The thermostat does not expose the Eqiva service.
    NotAThermostat,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdapterUnavailable => write!(f, "Bluetooth adapter unavailable"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::LinkLost => write!(f, "link lost"),
            Self::NotAThermostat => write!(f, "device does not expose the thermostat service"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// No thermostats found during scan.
    NoDevicesInRange,
    /// Device with specified name, alias or address not found.
    NotFound { identifier: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDevicesInRange => write!(f, "no thermostats in range"),
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    /// Create a policy refusal.
    pub fn unsupported(operation: &'static str, mode: EffectiveMode) -> Self {
        Self::UnsupportedOperation { operation, mode }
    }

    /// Whether this error means the link is unusable.
    ///
    /// Connection errors are the only ones a reconnect can fix.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Bluetooth(_)
                | Self::NotConnected
                | Self::ConnectionFailed { .. }
                | Self::Timeout { .. }
        )
    }
}

/// Result type alias using eqiva-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("kitchen");
        assert!(err.to_string().contains("kitchen"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Not connected to device");

        let err = Error::characteristic_not_found("d0e8434d", 3);
        assert!(err.to_string().contains("d0e8434d"));
        assert!(err.to_string().contains("3 services"));

        let err = Error::CommandTimeout {
            command: "set_temperature",
            timeout: Duration::from_secs(3),
            attempts: 2,
        };
        assert_eq!(
            err.to_string(),
            "Command 'set_temperature' got no response within 3s (2 attempts)"
        );
    }

    #[test]
    fn test_not_applied_display() {
        let err = Error::NotApplied {
            what: "Target temperature",
            expected: "21.5°C".to_string(),
            actual: "20.0°C".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Target temperature was not applied: expected 21.5°C, device reports 20.0°C"
        );
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_unsupported_operation_names_mode() {
        let err = Error::unsupported("set_temperature", EffectiveMode::BoostActive);
        assert_eq!(err.to_string(), "Cannot set_temperature while in boost mode");
    }

    #[test]
    fn test_codec_errors_convert() {
        let err: Error = EncodeError::TemperatureOutOfRange(40.0).into();
        assert!(matches!(err, Error::Encoding(_)));
        assert!(!err.is_connection_error());

        let err: Error = DecodeError::Empty.into();
        assert!(matches!(err, Error::Decoding(DecodeError::Empty)));
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::timeout("connect", Duration::from_secs(10)).is_connection_error());
        assert!(
            Error::connection_failed(None, ConnectionFailureReason::LinkLost)
                .is_connection_error()
        );
        assert!(!Error::Cancelled.is_connection_error());
        assert!(
            !Error::CommandTimeout {
                command: "pair",
                timeout: Duration::from_secs(3),
                attempts: 2
            }
            .is_connection_error()
        );
    }

    #[test]
    fn test_device_not_found_reasons() {
        let err = Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter);
        assert!(err.to_string().contains("no Bluetooth adapter"));
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}

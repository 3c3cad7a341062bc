//! Bluetooth UUIDs and identifiers for Eqiva thermostats.
//!
//! The thermostat exposes one vendor service with a write-only request
//! characteristic and a notify characteristic on which every reply arrives.

use uuid::{Uuid, uuid};

// --- Eqiva vendor service ---

/// Vendor service carrying the request/notify pair.
pub const EQIVA_SERVICE: Uuid = uuid!("3e135142-654f-9090-134a-a6ff5bb77046");

/// Request characteristic. Every command frame is written here.
pub const REQUEST: Uuid = uuid!("3fa4585a-ce4a-3bad-db4b-b8df8179ea09");

/// Notify characteristic. Status, program and identification frames arrive here.
pub const NOTIFY: Uuid = uuid!("d0e8434d-cd29-0996-af41-6c90f4e0eb2a");

// --- Standard Device Information characteristics ---

/// Model number string, which the thermostat fills with its product name.
pub const DEVICE_NAME: Uuid = uuid!("00002a24-0000-1000-8000-00805f9b34fb");

/// Manufacturer name string.
pub const VENDOR: Uuid = uuid!("00002a29-0000-1000-8000-00805f9b34fb");

// --- Discovery ---

/// MAC address prefix (OUI) of eQ-3 devices.
pub const MAC_PREFIX: &str = "00:1A:22";

/// Name the thermostat advertises.
pub const ADVERTISED_NAME: &str = "CC-RT-BLE";

/// Whether an address belongs to an eQ-3 device.
pub fn is_eqiva_address(address: &str) -> bool {
    address
        .get(..MAC_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(MAC_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_characteristics_are_distinct() {
        assert_ne!(REQUEST, NOTIFY);
        assert_ne!(DEVICE_NAME, VENDOR);
    }

    #[test]
    fn test_is_eqiva_address() {
        assert!(is_eqiva_address("00:1A:22:0C:12:34"));
        assert!(is_eqiva_address("00:1a:22:0c:12:34"));
        assert!(!is_eqiva_address("AA:BB:CC:DD:EE:FF"));
        assert!(!is_eqiva_address("00:1A"));
    }
}

//! Utility functions for eqiva-core.

use btleplug::platform::PeripheralId;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they are MAC
/// addresses; the `PeripheralId(..)` wrapper is stripped either way.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create an identifier string from an address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if address == "00:00:00:00:00:00" {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

/// Whether `s` is a MAC address or a CoreBluetooth UUID rather than an alias.
pub fn looks_like_address(s: &str) -> bool {
    let is_mac = s.len() == 17
        && s.split([':', '-'])
            .filter(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
            .count()
            == 6;
    is_mac || uuid::Uuid::parse_str(s).is_ok()
}

/// Space-separated hex for frame logging.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wall-clock time in the local zone, as the thermostat displays it.
///
/// Falls back to UTC where the local offset cannot be determined.
pub fn local_now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    PrimitiveDateTime::new(now.date(), now.time())
}

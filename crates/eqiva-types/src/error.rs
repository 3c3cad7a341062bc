//! Error types for the Eqiva frame codec.

use thiserror::Error;

/// Errors raised while turning domain values into outbound frames.
///
/// These are always produced before any byte reaches the radio, so a caller
/// can correct its input and try again.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// Temperature outside the settable 4.5..=30.0 °C range.
    #[error("Temperature {0} °C is outside the supported range 4.5..=30.0 °C")]
    TemperatureOutOfRange(f32),

    /// Offset outside the -3.5..=3.5 °C range.
    #[error("Offset {0} °C is outside the supported range -3.5..=3.5 °C")]
    OffsetOutOfRange(f32),

    /// A numeric field outside what its byte can carry.
    #[error("{field} value {value} is out of range ({constraint})")]
    OutOfRange {
        /// The field being encoded.
        field: &'static str,
        /// The rejected value.
        value: i64,
        /// Human-readable constraint.
        constraint: &'static str,
    },

    /// Schedule change points violate the day-program invariants.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Date or time that cannot be expressed in the device's calendar.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Text that does not parse into the requested value.
    #[error("Cannot parse '{input}' as {expected}")]
    Parse {
        /// The offending input.
        input: String,
        /// What the input should have looked like.
        expected: &'static str,
    },
}

impl EncodeError {
    /// Create an out-of-range error for a named field.
    pub fn out_of_range(field: &'static str, value: i64, constraint: &'static str) -> Self {
        Self::OutOfRange {
            field,
            value,
            constraint,
        }
    }

    /// Create a parse error.
    pub fn parse(input: impl Into<String>, expected: &'static str) -> Self {
        Self::Parse {
            input: input.into(),
            expected,
        }
    }
}

/// Errors raised while decoding a notification frame.
///
/// A frame that fails to decode never touches cached device state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// Notification carried no bytes at all.
    #[error("Empty notification frame")]
    Empty,

    /// Frame length does not match the layout for its opcode.
    #[error("Frame 0x{opcode:02X} has length {actual}, expected {expected}")]
    LengthMismatch {
        /// The leading opcode byte.
        opcode: u8,
        /// Accepted length(s), e.g. "6, 10 or 15".
        expected: &'static str,
        /// Length actually received.
        actual: usize,
    },

    /// A bit that must be clear was set.
    #[error("Reserved bits set in {field}: 0x{value:02X}")]
    ReservedBits {
        /// The field holding the reserved bits.
        field: &'static str,
        /// The raw byte.
        value: u8,
    },

    /// An outbound frame with an opcode the device does not define.
    #[error("Unknown command opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    /// A field decoded to a value outside its legal range.
    #[error("{field} value 0x{value:02X} is out of range")]
    OutOfRange {
        /// The offending field.
        field: &'static str,
        /// The raw byte.
        value: u8,
    },
}

impl DecodeError {
    /// Leading opcode of the frame this error refers to, when known.
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Self::LengthMismatch { opcode, .. } => Some(*opcode),
            Self::UnknownOpcode(opcode) => Some(*opcode),
            _ => None,
        }
    }
}

/// Result type alias for encoding.
pub type EncodeResult<T> = std::result::Result<T, EncodeError>;

/// Result type alias for decoding.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

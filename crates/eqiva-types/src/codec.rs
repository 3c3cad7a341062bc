//! Frame codec for the Eqiva request/notify characteristics.
//!
//! Stateless translation between [`Command`]s and outbound frames, and
//! between inbound notification frames and [`Notification`]s. Every
//! half-degree byte crosses this module through [`Temperature`]; nothing
//! else in the workspace does raw byte-to-degree arithmetic.
//!
//! # Example
//!
//! ```
//! use eqiva_types::{Command, Notification, Temperature, decode, encode};
//!
//! let frame = encode(&Command::SetTemperature(Temperature::new(21.5).unwrap())).unwrap();
//! assert_eq!(frame, vec![0x41, 0x2B]);
//!
//! let status = decode(&[0x02, 0x01, 0x09, 0x00, 0x04, 0x2B]).unwrap();
//! assert!(matches!(status, Notification::Status(s) if s.target.celsius() == 21.5));
//! ```

use bytes::{Buf, BufMut};
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
use crate::types::{
    BaseMode, ChangePoint, DaySchedule, DeviceConfig, DeviceInfo, MAX_CHANGE_POINTS,
    OffsetTemperature, OpenWindowConfig, ScheduleTime, StatusReport, Temperature, Vacation,
    Weekday, clock_bytes, mode_from_byte, mode_to_byte,
};

/// Outbound opcodes.
pub mod opcode {
    pub const INFO: u8 = 0x00;
    pub const STATUS: u8 = 0x03;
    pub const SET_SCHEDULE: u8 = 0x10;
    pub const SET_COMFORT_ECO: u8 = 0x11;
    pub const SET_OFFSET: u8 = 0x13;
    pub const SET_OPEN_WINDOW: u8 = 0x14;
    pub const REQUEST_SCHEDULE: u8 = 0x20;
    pub const SET_MODE: u8 = 0x40;
    pub const SET_TEMPERATURE: u8 = 0x41;
    pub const COMFORT: u8 = 0x43;
    pub const ECO: u8 = 0x44;
    pub const BOOST: u8 = 0x45;
    pub const LOCK: u8 = 0x80;
    pub const FACTORY_RESET: u8 = 0xF0;
}

/// Inbound frame type bytes.
pub mod notify {
    pub const INFO: u8 = 0x01;
    pub const REPLY: u8 = 0x02;
    pub const REPLY_STATUS: u8 = 0x01;
    pub const REPLY_SCHEDULE_SAVED: u8 = 0x02;
    pub const SCHEDULE: u8 = 0x21;
}

/// Named set points selectable in one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    /// The stored comfort temperature.
    Comfort,
    /// The stored eco temperature.
    Eco,
    /// Valve fully open.
    On,
    /// Valve closed.
    Off,
}

impl std::str::FromStr for Preset {
    type Err = EncodeError;

    fn from_str(s: &str) -> EncodeResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "comfort" => Ok(Self::Comfort),
            "eco" => Ok(Self::Eco),
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            _ => Err(EncodeError::parse(s, "comfort, eco, on or off")),
        }
    }
}

/// Every request the thermostat understands.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Command {
    /// Identification handshake; answered with firmware and serial.
    Pair,
    /// Sync the device clock and request a status frame.
    RequestStatus(PrimitiveDateTime),
    SetTemperature(Temperature),
    Preset(Preset),
    SetMode(BaseMode),
    SetBoost(bool),
    SetVacation(Vacation),
    SetSchedule { day: Weekday, schedule: DaySchedule },
    RequestSchedule(Weekday),
    SetComfortEco { comfort: Temperature, eco: Temperature },
    SetOffset(OffsetTemperature),
    SetOpenWindow(OpenWindowConfig),
    SetLock(bool),
    FactoryReset,
}

impl Command {
    /// Short name for logs and timeout errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pair => "pair",
            Self::RequestStatus(_) => "request_status",
            Self::SetTemperature(_) => "set_temperature",
            Self::Preset(_) => "preset",
            Self::SetMode(_) => "set_mode",
            Self::SetBoost(_) => "set_boost",
            Self::SetVacation(_) => "set_vacation",
            Self::SetSchedule { .. } => "set_schedule",
            Self::RequestSchedule(_) => "request_schedule",
            Self::SetComfortEco { .. } => "set_comfort_eco",
            Self::SetOffset(_) => "set_offset",
            Self::SetOpenWindow(_) => "set_open_window",
            Self::SetLock(_) => "set_lock",
            Self::FactoryReset => "factory_reset",
        }
    }
}

/// A decoded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Notification {
    /// Full or partial status frame (`02 01`).
    Status(StatusReport),
    /// A day program was stored (`02 02`).
    ScheduleConfirmed(Weekday),
    /// A day program read back (`21`).
    Schedule { day: Weekday, schedule: DaySchedule },
    /// Firmware and serial (`01`).
    DeviceInfo(DeviceInfo),
    /// A frame this codec has no layout for.
    Unrecognized { opcode: u8, payload: Vec<u8> },
}

/// Encode a command into its outbound frame.
///
/// Validation happens before any byte is produced.
pub fn encode(command: &Command) -> EncodeResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(16);
    match command {
        Command::Pair => buf.put_u8(opcode::INFO),
        Command::RequestStatus(now) => {
            let clock = clock_bytes(*now)?;
            buf.put_u8(opcode::STATUS);
            buf.put_slice(&clock);
        }
        Command::SetTemperature(t) => {
            buf.put_u8(opcode::SET_TEMPERATURE);
            buf.put_u8(t.raw());
        }
        Command::Preset(Preset::Comfort) => buf.put_u8(opcode::COMFORT),
        Command::Preset(Preset::Eco) => buf.put_u8(opcode::ECO),
        Command::Preset(Preset::On) => {
            buf.put_u8(opcode::SET_TEMPERATURE);
            buf.put_u8(Temperature::ON.raw());
        }
        Command::Preset(Preset::Off) => {
            buf.put_u8(opcode::SET_TEMPERATURE);
            buf.put_u8(Temperature::OFF.raw());
        }
        Command::SetMode(mode) => {
            buf.put_u8(opcode::SET_MODE);
            buf.put_u8(match mode {
                BaseMode::Auto => 0x00,
                BaseMode::Manual => 0x40,
            });
        }
        Command::SetBoost(on) => {
            buf.put_u8(opcode::BOOST);
            buf.put_u8(if *on { 0xFF } else { 0x00 });
        }
        Command::SetVacation(vacation) => {
            let [day, year, half_hours, month] = vacation.until_bytes();
            buf.put_u8(opcode::SET_MODE);
            buf.put_u8(vacation.temperature().raw() | 0x80);
            buf.put_u8(day);
            buf.put_u8(year);
            buf.put_u8(half_hours);
            buf.put_u8(month);
        }
        Command::SetSchedule { day, schedule } => {
            if schedule.is_empty() {
                return Err(EncodeError::InvalidSchedule("no change points".to_string()));
            }
            buf.put_u8(opcode::SET_SCHEDULE);
            buf.put_u8(day.as_byte());
            for (_, until, temperature) in schedule.periods() {
                buf.put_u8(temperature.raw());
                buf.put_u8(until.raw());
            }
            buf.put_bytes(0, 2 + 2 * MAX_CHANGE_POINTS - buf.len());
        }
        Command::RequestSchedule(day) => {
            buf.put_u8(opcode::REQUEST_SCHEDULE);
            buf.put_u8(day.as_byte());
        }
        Command::SetComfortEco { comfort, eco } => {
            buf.put_u8(opcode::SET_COMFORT_ECO);
            buf.put_u8(comfort.raw());
            buf.put_u8(eco.raw());
        }
        Command::SetOffset(offset) => {
            buf.put_u8(opcode::SET_OFFSET);
            buf.put_u8(offset.raw());
        }
        Command::SetOpenWindow(cfg) => {
            buf.put_u8(opcode::SET_OPEN_WINDOW);
            buf.put_u8(cfg.temperature().raw());
            buf.put_u8(cfg.duration_byte());
        }
        Command::SetLock(on) => {
            buf.put_u8(opcode::LOCK);
            buf.put_u8(u8::from(*on));
        }
        Command::FactoryReset => buf.put_u8(opcode::FACTORY_RESET),
    }
    Ok(buf)
}

/// Decode one notification frame.
///
/// Unknown leading bytes decode to [`Notification::Unrecognized`]; known
/// frames with the wrong shape are a [`DecodeError`].
pub fn decode(frame: &[u8]) -> DecodeResult<Notification> {
    let (&first, rest) = frame.split_first().ok_or(DecodeError::Empty)?;
    match (first, rest.first().copied()) {
        (notify::REPLY, Some(notify::REPLY_STATUS)) => decode_status(frame).map(Notification::Status),
        (notify::REPLY, Some(notify::REPLY_SCHEDULE_SAVED)) => {
            expect_len(frame, 3, "3")?;
            day_from_byte(frame[2]).map(Notification::ScheduleConfirmed)
        }
        (notify::SCHEDULE, _) => {
            expect_len(frame, 16, "16")?;
            let day = day_from_byte(frame[1])?;
            let schedule = decode_schedule(&frame[2..])?;
            Ok(Notification::Schedule { day, schedule })
        }
        (notify::INFO, _) => decode_info(frame).map(Notification::DeviceInfo),
        (opcode, _) => Ok(Notification::Unrecognized {
            opcode,
            payload: rest.to_vec(),
        }),
    }
}

fn expect_len(frame: &[u8], len: usize, expected: &'static str) -> DecodeResult<()> {
    if frame.len() != len {
        return Err(DecodeError::LengthMismatch {
            opcode: frame[0],
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

fn day_from_byte(byte: u8) -> DecodeResult<Weekday> {
    Weekday::from_byte(byte).ok_or(DecodeError::OutOfRange {
        field: "day",
        value: byte,
    })
}

fn decode_status(frame: &[u8]) -> DecodeResult<StatusReport> {
    if !matches!(frame.len(), 6 | 10 | 15) {
        return Err(DecodeError::LengthMismatch {
            opcode: frame[0],
            expected: "6, 10 or 15",
            actual: frame.len(),
        });
    }

    let mut buf = &frame[2..];
    let (mode, flags) = mode_from_byte(buf.get_u8());
    let valve = buf.get_u8();
    if valve > 100 {
        return Err(DecodeError::OutOfRange {
            field: "valve",
            value: valve,
        });
    }
    let _reserved = buf.get_u8();
    let target = Temperature::from_raw("target temperature", buf.get_u8())?;

    let vacation = if buf.remaining() >= 4 {
        let until = [buf.get_u8(), buf.get_u8(), buf.get_u8(), buf.get_u8()];
        Vacation::from_bytes(target, &until)?
    } else {
        None
    };

    let config = if buf.remaining() >= 5 {
        let window_temp = buf.get_u8();
        let window_fives = buf.get_u8();
        let open_window = OpenWindowConfig::from_bytes(window_temp, window_fives)?;
        let comfort = Temperature::from_raw("comfort temperature", buf.get_u8())?;
        let eco = Temperature::from_raw("eco temperature", buf.get_u8())?;
        let offset = OffsetTemperature::from_raw(buf.get_u8())?;
        Some(DeviceConfig {
            comfort,
            eco,
            offset,
            open_window,
        })
    } else {
        None
    };

    Ok(StatusReport {
        mode,
        flags,
        valve,
        target,
        vacation,
        config,
    })
}

/// A day program always ends at 24:00. A program whose last period stops
/// early is read as lasting until midnight.
fn decode_schedule(mut buf: &[u8]) -> DecodeResult<DaySchedule> {
    let mut points = Vec::with_capacity(MAX_CHANGE_POINTS);
    let mut start = ScheduleTime::MIDNIGHT;
    while buf.remaining() >= 2 {
        let temperature = buf.get_u8();
        let until = buf.get_u8();
        if until == 0 {
            break;
        }
        let until = ScheduleTime::from_raw(until)?;
        if until <= start {
            return Err(DecodeError::OutOfRange {
                field: "schedule time",
                value: until.raw(),
            });
        }
        let temperature = Temperature::from_raw("schedule temperature", temperature)?;
        points.push(ChangePoint::new(start, temperature));
        if until == ScheduleTime::END_OF_DAY {
            break;
        }
        start = until;
    }
    Ok(DaySchedule::from_decoded(points))
}

fn decode_info(frame: &[u8]) -> DecodeResult<DeviceInfo> {
    if frame.len() < 5 {
        return Err(DecodeError::LengthMismatch {
            opcode: frame[0],
            expected: "at least 5",
            actual: frame.len(),
        });
    }
    let firmware = frame[1];
    let serial = frame[4..frame.len() - 1]
        .iter()
        .map(|&b| {
            let c = b.wrapping_sub(0x30);
            if c.is_ascii_graphic() {
                Ok(char::from(c))
            } else {
                Err(DecodeError::OutOfRange {
                    field: "serial",
                    value: b,
                })
            }
        })
        .collect::<DecodeResult<String>>()?;
    Ok(DeviceInfo { firmware, serial })
}

/// Parse an outbound frame back into the command that produced it.
///
/// Used to inspect captured traffic and by device simulators. A frame
/// written for [`Preset::On`] or [`Preset::Off`] parses as the equivalent
/// [`Command::SetTemperature`].
pub fn decode_command(frame: &[u8]) -> DecodeResult<Command> {
    let (&op, body) = frame.split_first().ok_or(DecodeError::Empty)?;
    let fixed = |len: usize, expected: &'static str| expect_len(frame, len, expected);
    let temperature = |field, raw| Temperature::from_raw(field, raw);
    let toggle = |field, raw: u8, on: u8| match raw {
        0x00 => Ok(false),
        r if r == on => Ok(true),
        r => Err(DecodeError::OutOfRange { field, value: r }),
    };

    match op {
        opcode::INFO => fixed(1, "1").map(|_| Command::Pair),
        opcode::STATUS => {
            fixed(7, "7")?;
            decode_clock(body).map(Command::RequestStatus)
        }
        opcode::SET_MODE => match body {
            [0x00] => Ok(Command::SetMode(BaseMode::Auto)),
            [0x40] => Ok(Command::SetMode(BaseMode::Manual)),
            [t, until @ ..] if t & 0x80 != 0 && until.len() == 4 => {
                let temp = temperature("vacation temperature", t & 0x7F)?;
                Vacation::from_bytes(temp, until)?
                    .map(Command::SetVacation)
                    .ok_or(DecodeError::OutOfRange {
                        field: "vacation day",
                        value: 0,
                    })
            }
            _ => Err(DecodeError::LengthMismatch {
                opcode: op,
                expected: "2 or 6",
                actual: frame.len(),
            }),
        },
        opcode::SET_TEMPERATURE => {
            fixed(2, "2")?;
            temperature("temperature", body[0]).map(Command::SetTemperature)
        }
        opcode::COMFORT => fixed(1, "1").map(|_| Command::Preset(Preset::Comfort)),
        opcode::ECO => fixed(1, "1").map(|_| Command::Preset(Preset::Eco)),
        opcode::BOOST => {
            fixed(2, "2")?;
            toggle("boost", body[0], 0xFF).map(Command::SetBoost)
        }
        opcode::LOCK => {
            fixed(2, "2")?;
            toggle("lock", body[0], 0x01).map(Command::SetLock)
        }
        opcode::SET_SCHEDULE => {
            fixed(16, "16")?;
            let day = day_from_byte(body[0])?;
            let schedule = decode_schedule(&body[1..])?;
            Ok(Command::SetSchedule { day, schedule })
        }
        opcode::REQUEST_SCHEDULE => {
            fixed(2, "2")?;
            day_from_byte(body[0]).map(Command::RequestSchedule)
        }
        opcode::SET_COMFORT_ECO => {
            fixed(3, "3")?;
            Ok(Command::SetComfortEco {
                comfort: temperature("comfort temperature", body[0])?,
                eco: temperature("eco temperature", body[1])?,
            })
        }
        opcode::SET_OFFSET => {
            fixed(2, "2")?;
            OffsetTemperature::from_raw(body[0]).map(Command::SetOffset)
        }
        opcode::SET_OPEN_WINDOW => {
            fixed(3, "3")?;
            OpenWindowConfig::from_bytes(body[0], body[1]).map(Command::SetOpenWindow)
        }
        opcode::FACTORY_RESET => fixed(1, "1").map(|_| Command::FactoryReset),
        other => Err(DecodeError::UnknownOpcode(other)),
    }
}

fn decode_clock(b: &[u8]) -> DecodeResult<PrimitiveDateTime> {
    let out_of_range = |field, value| DecodeError::OutOfRange { field, value };
    let month = Month::try_from(b[1]).map_err(|_| out_of_range("month", b[1]))?;
    let date = Date::from_calendar_date(2000 + i32::from(b[0]), month, b[2])
        .map_err(|_| out_of_range("day", b[2]))?;
    let time = Time::from_hms(b[3], b[4], b[5]).map_err(|_| out_of_range("time", b[3]))?;
    Ok(PrimitiveDateTime::new(date, time))
}

impl StatusReport {
    /// Encode as the device would send it.
    ///
    /// Produces the 15-byte layout when a config is present, the 10-byte
    /// layout when only a vacation is, and the 6-byte layout otherwise.
    pub fn to_frame(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(15);
        buf.put_u8(notify::REPLY);
        buf.put_u8(notify::REPLY_STATUS);
        buf.put_u8(mode_to_byte(&self.mode, &self.flags));
        buf.put_u8(self.valve);
        buf.put_u8(0x04);
        buf.put_u8(self.target.raw());
        if self.vacation.is_some() || self.config.is_some() {
            let until = self.vacation.map(|v| v.until_bytes()).unwrap_or([0; 4]);
            buf.put_slice(&until);
        }
        if let Some(cfg) = &self.config {
            buf.put_u8(cfg.open_window.temperature().raw());
            buf.put_u8(cfg.open_window.duration_byte());
            buf.put_u8(cfg.comfort.raw());
            buf.put_u8(cfg.eco.raw());
            buf.put_u8(cfg.offset.raw());
        }
        buf
    }
}

/// Frame for a stored-program confirmation.
pub fn schedule_confirmed_frame(day: Weekday) -> Vec<u8> {
    vec![notify::REPLY, notify::REPLY_SCHEDULE_SAVED, day.as_byte()]
}

/// Frame for a program read-back.
pub fn schedule_frame(day: Weekday, schedule: &DaySchedule) -> EncodeResult<Vec<u8>> {
    let mut frame = encode(&Command::SetSchedule {
        day,
        schedule: schedule.clone(),
    })?;
    frame[0] = notify::SCHEDULE;
    Ok(frame)
}

/// Frame for the identification reply.
pub fn device_info_frame(info: &DeviceInfo) -> Vec<u8> {
    let mut buf = Vec::with_capacity(info.serial.len() + 5);
    buf.put_u8(notify::INFO);
    buf.put_u8(info.firmware);
    buf.put_u8(0x00);
    buf.put_u8(0x00);
    for b in info.serial.bytes() {
        buf.put_u8(b.wrapping_add(0x30));
    }
    buf.put_u8(0x00);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Mode, Overlays, StatusFlags};
    use proptest::prelude::*;
    use time::macros::datetime;

    fn t(c: f32) -> Temperature {
        Temperature::new(c).unwrap()
    }

    #[test]
    fn test_encode_simple_commands() {
        assert_eq!(encode(&Command::Pair).unwrap(), vec![0x00]);
        assert_eq!(
            encode(&Command::SetMode(BaseMode::Auto)).unwrap(),
            vec![0x40, 0x00]
        );
        assert_eq!(
            encode(&Command::SetMode(BaseMode::Manual)).unwrap(),
            vec![0x40, 0x40]
        );
        assert_eq!(encode(&Command::SetBoost(true)).unwrap(), vec![0x45, 0xFF]);
        assert_eq!(encode(&Command::SetBoost(false)).unwrap(), vec![0x45, 0x00]);
        assert_eq!(encode(&Command::SetLock(true)).unwrap(), vec![0x80, 0x01]);
        assert_eq!(encode(&Command::SetLock(false)).unwrap(), vec![0x80, 0x00]);
        assert_eq!(encode(&Command::FactoryReset).unwrap(), vec![0xF0]);
        assert_eq!(
            encode(&Command::RequestSchedule(Weekday::Monday)).unwrap(),
            vec![0x20, 0x02]
        );
    }

    #[test]
    fn test_encode_presets() {
        assert_eq!(encode(&Command::Preset(Preset::Comfort)).unwrap(), vec![0x43]);
        assert_eq!(encode(&Command::Preset(Preset::Eco)).unwrap(), vec![0x44]);
        assert_eq!(encode(&Command::Preset(Preset::On)).unwrap(), vec![0x41, 0x3C]);
        assert_eq!(encode(&Command::Preset(Preset::Off)).unwrap(), vec![0x41, 0x09]);
    }

    #[test]
    fn test_encode_request_status_carries_clock() {
        let frame = encode(&Command::RequestStatus(datetime!(2025-01-31 23:04:05))).unwrap();
        assert_eq!(frame, vec![0x03, 25, 1, 31, 23, 4, 5]);
    }

    #[test]
    fn test_encode_configuration() {
        assert_eq!(
            encode(&Command::SetComfortEco {
                comfort: t(21.0),
                eco: t(17.0)
            })
            .unwrap(),
            vec![0x11, 42, 34]
        );
        assert_eq!(
            encode(&Command::SetOffset(OffsetTemperature::new(-1.5).unwrap())).unwrap(),
            vec![0x13, 4]
        );
        assert_eq!(
            encode(&Command::SetOpenWindow(
                OpenWindowConfig::new(t(12.0), 15).unwrap()
            ))
            .unwrap(),
            vec![0x14, 24, 3]
        );
        assert_eq!(
            encode(&Command::SetOpenWindow(OpenWindowConfig::disabled(t(12.0)))).unwrap(),
            vec![0x14, 24, 0]
        );
    }

    #[test]
    fn test_encode_vacation() {
        let vacation = Vacation::new(datetime!(2025-08-15 18:45), t(16.0)).unwrap();
        assert_eq!(
            encode(&Command::SetVacation(vacation)).unwrap(),
            vec![0x40, 32 | 0x80, 15, 25, 37, 8]
        );
    }

    #[test]
    fn test_encode_schedule_uses_end_times() {
        let schedule = DaySchedule::new(vec![
            ChangePoint::new("00:00".parse().unwrap(), t(17.0)),
            ChangePoint::new("06:00".parse().unwrap(), t(21.0)),
            ChangePoint::new("22:30".parse().unwrap(), t(17.0)),
        ])
        .unwrap();
        let frame = encode(&Command::SetSchedule {
            day: Weekday::Saturday,
            schedule,
        })
        .unwrap();
        assert_eq!(
            frame,
            vec![0x10, 0x00, 34, 36, 42, 135, 34, 144, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_encode_empty_schedule_fails() {
        let result = encode(&Command::SetSchedule {
            day: Weekday::Sunday,
            schedule: DaySchedule::default(),
        });
        assert!(matches!(result, Err(EncodeError::InvalidSchedule(_))));
    }

    #[test]
    fn test_decode_short_status() {
        let Notification::Status(s) = decode(&[0x02, 0x01, 0x09, 0x32, 0x04, 0x2A]).unwrap() else {
            panic!("expected status");
        };
        assert_eq!(s.mode.base, BaseMode::Manual);
        assert!(s.flags.dst);
        assert_eq!(s.valve, 50);
        assert_eq!(s.target, t(21.0));
        assert_eq!(s.vacation, None);
        assert_eq!(s.config, None);
    }

    #[test]
    fn test_decode_full_status() {
        let frame = [
            0x02, 0x01, 0x2A, 0x00, 0x04, 0x20, // vacation + locked, 16.0
            15, 25, 37, 8, // until 2025-08-15 18:30
            24, 3, // open window 12.0 for 15 minutes
            42, 34, 9, // comfort 21, eco 17, offset +1.0
        ];
        let Notification::Status(s) = decode(&frame).unwrap() else {
            panic!("expected status");
        };
        assert!(s.mode.overlays.vacation);
        assert!(s.flags.locked);
        let vacation = s.vacation.unwrap();
        assert_eq!(vacation.until(), datetime!(2025-08-15 18:30));
        assert_eq!(vacation.temperature(), t(16.0));
        let cfg = s.config.unwrap();
        assert_eq!(cfg.comfort, t(21.0));
        assert_eq!(cfg.eco, t(17.0));
        assert_eq!(cfg.offset.celsius(), 1.0);
        assert_eq!(cfg.open_window.minutes(), 15);
        assert!(cfg.open_window.enabled());
    }

    #[test]
    fn test_decode_status_wrong_length() {
        let err = decode(&[0x02, 0x01, 0x09, 0x32, 0x04, 0x2A, 0x00, 0x00]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::LengthMismatch {
                opcode: 0x02,
                expected: "6, 10 or 15",
                actual: 8
            }
        );
        assert!(decode(&[0x02, 0x01, 0x09]).is_err());
    }

    #[test]
    fn test_decode_status_bad_fields() {
        assert!(matches!(
            decode(&[0x02, 0x01, 0x00, 0x00, 0x04, 0xAA]),
            Err(DecodeError::ReservedBits { .. })
        ));
        assert!(matches!(
            decode(&[0x02, 0x01, 0x00, 0x00, 0x04, 0x7A]),
            Err(DecodeError::OutOfRange { .. })
        ));
        assert!(matches!(
            decode(&[0x02, 0x01, 0x00, 0xC8, 0x04, 0x2A]),
            Err(DecodeError::OutOfRange { field: "valve", .. })
        ));
    }

    #[test]
    fn test_decode_schedule_confirmation() {
        assert_eq!(
            decode(&[0x02, 0x02, 0x04]).unwrap(),
            Notification::ScheduleConfirmed(Weekday::Wednesday)
        );
        assert!(decode(&[0x02, 0x02, 0x09]).is_err());
        assert!(decode(&[0x02, 0x02]).is_err());
    }

    #[test]
    fn test_decode_schedule() {
        let frame = [
            0x21, 0x02, 34, 36, 42, 135, 34, 144, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let Notification::Schedule { day, schedule } = decode(&frame).unwrap() else {
            panic!("expected schedule");
        };
        assert_eq!(day, Weekday::Monday);
        assert_eq!(
            schedule.to_string(),
            "00:00-06:00 17.0°C, 06:00-22:30 21.0°C, 22:30-24:00 17.0°C"
        );
        assert_eq!(schedule_frame(day, &schedule).unwrap(), frame.to_vec());
    }

    #[test]
    fn test_decode_schedule_extends_short_program_to_midnight() {
        // 17.0°C until 06:00, 21.0°C until 20:00, then padding
        let frame = [
            0x21, 0x03, 34, 36, 42, 120, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let Notification::Schedule { schedule, .. } = decode(&frame).unwrap() else {
            panic!("expected schedule");
        };
        assert_eq!(
            schedule.to_string(),
            "00:00-06:00 17.0°C, 06:00-24:00 21.0°C"
        );
        let resent = schedule_frame(Weekday::Tuesday, &schedule).unwrap();
        assert_eq!(&resent[..6], &[0x21, 0x03, 34, 36, 42, 144]);
    }

    #[test]
    fn test_decode_schedule_rejects_backwards_times() {
        let frame = [
            0x21, 0x02, 34, 36, 42, 30, 34, 144, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        assert!(decode(&frame).is_err());
    }

    #[test]
    fn test_decode_device_info() {
        let info = DeviceInfo {
            firmware: 146,
            serial: "OEQ0123456".to_string(),
        };
        let frame = device_info_frame(&info);
        assert_eq!(frame.len(), 15);
        assert_eq!(decode(&frame).unwrap(), Notification::DeviceInfo(info));
    }

    #[test]
    fn test_decode_unrecognized_and_empty() {
        assert_eq!(
            decode(&[0x7E, 0x01, 0x02]).unwrap(),
            Notification::Unrecognized {
                opcode: 0x7E,
                payload: vec![0x01, 0x02]
            }
        );
        assert_eq!(
            decode(&[0x02, 0x09]).unwrap(),
            Notification::Unrecognized {
                opcode: 0x02,
                payload: vec![0x09]
            }
        );
        assert_eq!(decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn test_set_temperature_echo_round_trip() {
        let frame = encode(&Command::SetTemperature(t(21.5))).unwrap();
        let mut echo = StatusReport::new(Temperature::new(18.0).unwrap());
        echo.mode.base = BaseMode::Manual;
        echo.target = Temperature::from_raw("echo", frame[1]).unwrap();
        let Notification::Status(s) = decode(&echo.to_frame()).unwrap() else {
            panic!("expected status");
        };
        assert_eq!(s.target.celsius(), 21.5);
    }

    #[test]
    fn test_status_frame_round_trip_with_config() {
        let report = StatusReport {
            mode: Mode {
                base: BaseMode::Auto,
                overlays: Overlays {
                    boost: true,
                    vacation: false,
                    open_window: false,
                },
            },
            flags: StatusFlags {
                locked: false,
                dst: true,
                battery_low: true,
            },
            valve: 100,
            target: t(20.0),
            vacation: None,
            config: Some(DeviceConfig {
                comfort: t(21.0),
                eco: t(16.5),
                offset: OffsetTemperature::new(-0.5).unwrap(),
                open_window: OpenWindowConfig::disabled(t(12.0)),
            }),
        };
        let frame = report.to_frame();
        assert_eq!(frame.len(), 15);
        assert_eq!(decode(&frame).unwrap(), Notification::Status(report));
    }

    #[test]
    fn test_decode_command_inverts_encode() {
        let commands = [
            Command::Pair,
            Command::RequestStatus(datetime!(2025-01-31 23:04:05)),
            Command::SetTemperature(t(19.5)),
            Command::Preset(Preset::Eco),
            Command::SetMode(BaseMode::Manual),
            Command::SetBoost(true),
            Command::SetVacation(Vacation::new(datetime!(2025-08-15 18:30), t(16.0)).unwrap()),
            Command::RequestSchedule(Weekday::Friday),
            Command::SetComfortEco {
                comfort: t(22.0),
                eco: t(16.0),
            },
            Command::SetOffset(OffsetTemperature::new(2.0).unwrap()),
            Command::SetOpenWindow(OpenWindowConfig::new(t(10.0), 30).unwrap()),
            Command::SetLock(false),
            Command::FactoryReset,
        ];
        for command in commands {
            let frame = encode(&command).unwrap();
            assert_eq!(decode_command(&frame).unwrap(), command, "frame {:02X?}", frame);
        }
    }

    #[test]
    fn test_decode_command_rejects_garbage() {
        assert_eq!(decode_command(&[0x99]), Err(DecodeError::UnknownOpcode(0x99)));
        assert!(decode_command(&[0x45, 0x10]).is_err());
        assert!(decode_command(&[0x41]).is_err());
        assert_eq!(decode_command(&[]), Err(DecodeError::Empty));
    }

    proptest! {
        #[test]
        fn prop_valid_half_steps_encode(raw in 9u8..=60) {
            let celsius = f32::from(raw) / 2.0;
            let frame = encode(&Command::SetTemperature(Temperature::new(celsius).unwrap())).unwrap();
            prop_assert_eq!(frame, vec![0x41, raw]);
        }

        #[test]
        fn prop_out_of_range_rejected(celsius in prop_oneof![-100.0f32..4.25, 30.25f32..100.0]) {
            prop_assert!(Temperature::new(celsius).is_err());
        }

        #[test]
        fn prop_decode_never_panics(frame in proptest::collection::vec(any::<u8>(), 0..20)) {
            let _ = decode(&frame);
        }

        #[test]
        fn prop_status_frames_decode_target(raw in 9u8..=60, valve in 0u8..=100, mode in 0u8..=0x3F) {
            let frame = [0x02, 0x01, mode, valve, 0x04, raw];
            match decode(&frame).unwrap() {
                Notification::Status(s) => {
                    prop_assert_eq!(s.target.celsius(), f32::from(raw) / 2.0);
                    prop_assert_eq!(s.valve, valve);
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}

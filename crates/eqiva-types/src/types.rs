//! Core domain types for Eqiva radiator thermostats.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::error::{DecodeError, DecodeResult, EncodeError, EncodeResult};

/// Lowest settable set point in °C. Doubles as the "off" sentinel.
pub const MIN_TEMPERATURE: f32 = 4.5;

/// Highest settable set point in °C. Doubles as the "on" sentinel.
pub const MAX_TEMPERATURE: f32 = 30.0;

const MIN_RAW: u8 = 9;
const MAX_RAW: u8 = 60;

/// A set point in half-degree Celsius steps.
///
/// Construction rounds to the nearest 0.5 °C and rejects anything that lands
/// outside 4.5..=30.0 °C. The raw half-degree byte never leaves this crate.
///
/// # Example
///
/// ```
/// use eqiva_types::Temperature;
///
/// let t = Temperature::new(21.4).unwrap();
/// assert_eq!(t.celsius(), 21.5);
/// assert!(Temperature::new(31.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "f32", into = "f32")
)]
pub struct Temperature(u8);

impl Temperature {
    /// The "off" sentinel (valve closed), 4.5 °C.
    pub const OFF: Self = Self(MIN_RAW);

    /// The "on" sentinel (valve fully open), 30.0 °C.
    pub const ON: Self = Self(MAX_RAW);

    /// Create a temperature from degrees Celsius.
    pub fn new(celsius: f32) -> EncodeResult<Self> {
        if !celsius.is_finite() {
            return Err(EncodeError::TemperatureOutOfRange(celsius));
        }
        let raw = (celsius * 2.0).round();
        if raw < f32::from(MIN_RAW) || raw > f32::from(MAX_RAW) {
            return Err(EncodeError::TemperatureOutOfRange(celsius));
        }
        Ok(Self(raw as u8))
    }

    pub(crate) fn from_raw(field: &'static str, raw: u8) -> DecodeResult<Self> {
        if raw & 0x80 != 0 {
            return Err(DecodeError::ReservedBits { field, value: raw });
        }
        if !(MIN_RAW..=MAX_RAW).contains(&raw) {
            return Err(DecodeError::OutOfRange { field, value: raw });
        }
        Ok(Self(raw))
    }

    pub(crate) fn raw(self) -> u8 {
        self.0
    }

    /// Value in degrees Celsius.
    pub fn celsius(self) -> f32 {
        f32::from(self.0) / 2.0
    }

    /// Value in degrees Fahrenheit.
    pub fn fahrenheit(self) -> f32 {
        self.celsius() * 9.0 / 5.0 + 32.0
    }

    /// Whether this is the "off" sentinel.
    pub fn is_off(self) -> bool {
        self == Self::OFF
    }

    /// Whether this is the "on" sentinel.
    pub fn is_on(self) -> bool {
        self == Self::ON
    }
}

impl TryFrom<f32> for Temperature {
    type Error = EncodeError;

    fn try_from(value: f32) -> EncodeResult<Self> {
        Self::new(value)
    }
}

impl From<Temperature> for f32 {
    fn from(value: Temperature) -> Self {
        value.celsius()
    }
}

impl FromStr for Temperature {
    type Err = EncodeError;

    fn from_str(s: &str) -> EncodeResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Self::ON),
            "off" => Ok(Self::OFF),
            other => other
                .parse::<f32>()
                .map_err(|_| EncodeError::parse(s, "a temperature in °C"))
                .and_then(Self::new),
        }
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C", self.celsius())
    }
}

/// Measurement offset in half-degree steps, -3.5..=3.5 °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "f32", into = "f32")
)]
pub struct OffsetTemperature(i8);

impl OffsetTemperature {
    /// Create an offset from degrees Celsius, rounded to 0.5 °C.
    pub fn new(celsius: f32) -> EncodeResult<Self> {
        if !celsius.is_finite() {
            return Err(EncodeError::OffsetOutOfRange(celsius));
        }
        let half = (celsius * 2.0).round();
        if !(-7.0..=7.0).contains(&half) {
            return Err(EncodeError::OffsetOutOfRange(celsius));
        }
        Ok(Self(half as i8))
    }

    pub(crate) fn from_raw(raw: u8) -> DecodeResult<Self> {
        if raw > 14 {
            return Err(DecodeError::OutOfRange {
                field: "offset",
                value: raw,
            });
        }
        Ok(Self(raw as i8 - 7))
    }

    pub(crate) fn raw(self) -> u8 {
        (self.0 + 7) as u8
    }

    /// Offset in degrees Celsius.
    pub fn celsius(self) -> f32 {
        f32::from(self.0) / 2.0
    }
}

impl TryFrom<f32> for OffsetTemperature {
    type Error = EncodeError;

    fn try_from(value: f32) -> EncodeResult<Self> {
        Self::new(value)
    }
}

impl From<OffsetTemperature> for f32 {
    fn from(value: OffsetTemperature) -> Self {
        value.celsius()
    }
}

impl FromStr for OffsetTemperature {
    type Err = EncodeError;

    fn from_str(s: &str) -> EncodeResult<Self> {
        s.trim()
            .parse::<f32>()
            .map_err(|_| EncodeError::parse(s, "an offset in °C"))
            .and_then(Self::new)
    }
}

impl fmt::Display for OffsetTemperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+.1}°C", self.celsius())
    }
}

// --- Mode ---

/// Scheduling mode the user selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum BaseMode {
    /// Follow the weekly program.
    #[default]
    Auto,
    /// Hold the manually set temperature.
    Manual,
}

impl FromStr for BaseMode {
    type Err = EncodeError;

    fn from_str(s: &str) -> EncodeResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            _ => Err(EncodeError::parse(s, "auto or manual")),
        }
    }
}

impl fmt::Display for BaseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Transient states reported by the device on top of the base mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Overlays {
    /// Boost (valve fully open for a few minutes).
    pub boost: bool,
    /// Vacation hold until a point in time.
    pub vacation: bool,
    /// Open-window detection lowered the set point.
    pub open_window: bool,
}

/// Mode as reported by the device: a base mode plus active overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mode {
    /// The selected base mode.
    pub base: BaseMode,
    /// Overlays currently in effect.
    pub overlays: Overlays,
}

/// The single mode currently in control of the valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum EffectiveMode {
    Auto,
    Manual,
    BoostActive,
    VacationActive,
    OpenWindowActive,
}

impl Mode {
    /// Collapse base mode and overlays into the mode actually in control.
    ///
    /// Boost supersedes everything, then open window, then vacation.
    pub fn effective(&self) -> EffectiveMode {
        if self.overlays.boost {
            EffectiveMode::BoostActive
        } else if self.overlays.open_window {
            EffectiveMode::OpenWindowActive
        } else if self.overlays.vacation {
            EffectiveMode::VacationActive
        } else {
            match self.base {
                BaseMode::Auto => EffectiveMode::Auto,
                BaseMode::Manual => EffectiveMode::Manual,
            }
        }
    }
}

impl fmt::Display for EffectiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::BoostActive => "boost",
            Self::VacationActive => "vacation",
            Self::OpenWindowActive => "open window",
        };
        f.write_str(s)
    }
}

/// Status bits that are not modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusFlags {
    /// Child lock engaged.
    pub locked: bool,
    /// Daylight saving time in effect.
    pub dst: bool,
    /// Battery needs replacing.
    pub battery_low: bool,
}

pub(crate) mod mode_bits {
    pub const MANUAL: u8 = 0x01;
    pub const VACATION: u8 = 0x02;
    pub const BOOST: u8 = 0x04;
    pub const DST: u8 = 0x08;
    pub const OPEN_WINDOW: u8 = 0x10;
    pub const LOCKED: u8 = 0x20;
    pub const BATTERY_LOW: u8 = 0x80;
}

pub(crate) fn mode_from_byte(byte: u8) -> (Mode, StatusFlags) {
    use mode_bits::*;
    let base = if byte & MANUAL != 0 {
        BaseMode::Manual
    } else {
        BaseMode::Auto
    };
    let mode = Mode {
        base,
        overlays: Overlays {
            boost: byte & BOOST != 0,
            vacation: byte & VACATION != 0,
            open_window: byte & OPEN_WINDOW != 0,
        },
    };
    let flags = StatusFlags {
        locked: byte & LOCKED != 0,
        dst: byte & DST != 0,
        battery_low: byte & BATTERY_LOW != 0,
    };
    (mode, flags)
}

pub(crate) fn mode_to_byte(mode: &Mode, flags: &StatusFlags) -> u8 {
    use mode_bits::*;
    let mut byte = 0;
    if mode.base == BaseMode::Manual {
        byte |= MANUAL;
    }
    if mode.overlays.vacation {
        byte |= VACATION;
    }
    if mode.overlays.boost {
        byte |= BOOST;
    }
    if mode.overlays.open_window {
        byte |= OPEN_WINDOW;
    }
    if flags.dst {
        byte |= DST;
    }
    if flags.locked {
        byte |= LOCKED;
    }
    if flags.battery_low {
        byte |= BATTERY_LOW;
    }
    byte
}

// --- Days ---

/// Day of week in the device's numbering (Saturday = 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
#[repr(u8)]
pub enum Weekday {
    Saturday = 0,
    Sunday = 1,
    Monday = 2,
    Tuesday = 3,
    Wednesday = 4,
    Thursday = 5,
    Friday = 6,
}

impl Weekday {
    /// All days in device order.
    pub const ALL: [Weekday; 7] = [
        Weekday::Saturday,
        Weekday::Sunday,
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
    ];

    /// Day for a device byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    /// Device byte for this day.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Following day.
    pub fn next(self) -> Self {
        Self::ALL[(usize::from(self.as_byte()) + 1) % 7]
    }

    /// Three-letter name.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Saturday => "sat",
            Self::Sunday => "sun",
            Self::Monday => "mon",
            Self::Tuesday => "tue",
            Self::Wednesday => "wed",
            Self::Thursday => "thu",
            Self::Friday => "fri",
        }
    }
}

impl From<time::Weekday> for Weekday {
    fn from(day: time::Weekday) -> Self {
        Self::ALL[(usize::from(day.number_days_from_monday()) + 2) % 7]
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
        };
        f.write_str(s)
    }
}

impl FromStr for Weekday {
    type Err = EncodeError;

    fn from_str(s: &str) -> EncodeResult<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| {
                lower == d.short_name() || lower == d.to_string().to_ascii_lowercase()
            })
            .ok_or_else(|| EncodeError::parse(s, "a weekday (sat..fri)"))
    }
}

/// A set of days named the way a user would name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaySelector {
    Day(Weekday),
    Weekend,
    Work,
    Everyday,
    Today,
    Tomorrow,
}

impl DaySelector {
    /// Resolve to concrete days, given today's weekday.
    pub fn days(self, today: Weekday) -> Vec<Weekday> {
        use Weekday::*;
        match self {
            Self::Day(day) => vec![day],
            Self::Weekend => vec![Saturday, Sunday],
            Self::Work => vec![Monday, Tuesday, Wednesday, Thursday, Friday],
            Self::Everyday => Weekday::ALL.to_vec(),
            Self::Today => vec![today],
            Self::Tomorrow => vec![today.next()],
        }
    }
}

impl FromStr for DaySelector {
    type Err = EncodeError;

    fn from_str(s: &str) -> EncodeResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekend" => Ok(Self::Weekend),
            "work" | "workday" | "workdays" => Ok(Self::Work),
            "everyday" | "all" => Ok(Self::Everyday),
            "today" => Ok(Self::Today),
            "tomorrow" => Ok(Self::Tomorrow),
            _ => s
                .parse::<Weekday>()
                .map(Self::Day)
                .map_err(|_| EncodeError::parse(s, "a day, weekend, work, everyday, today or tomorrow")),
        }
    }
}

// --- Schedule ---

/// Time of day on the 10-minute grid the device programs use.
///
/// 24:00 is representable and marks the end of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct ScheduleTime(u8);

impl ScheduleTime {
    /// 00:00.
    pub const MIDNIGHT: Self = Self(0);

    /// 24:00.
    pub const END_OF_DAY: Self = Self(144);

    /// Create from hour and minute. Minutes must be a multiple of 10.
    pub fn new(hour: u8, minute: u8) -> EncodeResult<Self> {
        if minute >= 60 || minute % 10 != 0 {
            return Err(EncodeError::out_of_range(
                "schedule minute",
                i64::from(minute),
                "multiple of 10 below 60",
            ));
        }
        if hour > 24 || (hour == 24 && minute != 0) {
            return Err(EncodeError::out_of_range(
                "schedule hour",
                i64::from(hour),
                "00:00..=24:00",
            ));
        }
        Ok(Self(hour * 6 + minute / 10))
    }

    pub(crate) fn from_raw(raw: u8) -> DecodeResult<Self> {
        if raw > 144 {
            return Err(DecodeError::OutOfRange {
                field: "schedule time",
                value: raw,
            });
        }
        Ok(Self(raw))
    }

    pub(crate) fn raw(self) -> u8 {
        self.0
    }

    pub fn hour(self) -> u8 {
        self.0 / 6
    }

    pub fn minute(self) -> u8 {
        (self.0 % 6) * 10
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ScheduleTime {
    type Err = EncodeError;

    fn from_str(s: &str) -> EncodeResult<Self> {
        let (h, m) = s.trim().split_once(':').unwrap_or((s.trim(), "0"));
        let hour = h
            .parse::<u8>()
            .map_err(|_| EncodeError::parse(s, "a time as hh:mm"))?;
        let minute = m
            .parse::<u8>()
            .map_err(|_| EncodeError::parse(s, "a time as hh:mm"))?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for ScheduleTime {
    type Error = EncodeError;

    fn try_from(value: String) -> EncodeResult<Self> {
        value.parse()
    }
}

impl From<ScheduleTime> for String {
    fn from(value: ScheduleTime) -> Self {
        value.to_string()
    }
}

/// Maximum number of change points in one day program.
pub const MAX_CHANGE_POINTS: usize = 7;

/// From `start` until the next change point, hold `temperature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangePoint {
    pub start: ScheduleTime,
    pub temperature: Temperature,
}

impl ChangePoint {
    pub fn new(start: ScheduleTime, temperature: Temperature) -> Self {
        Self { start, temperature }
    }
}

/// The program for one day: up to seven change points.
///
/// The first change point starts at 00:00 and starts are strictly
/// increasing. The last change point holds until 24:00.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DaySchedule {
    points: Vec<ChangePoint>,
}

impl DaySchedule {
    /// Build a day program, enforcing the change-point invariants.
    pub fn new(points: Vec<ChangePoint>) -> EncodeResult<Self> {
        let first = points
            .first()
            .ok_or_else(|| EncodeError::InvalidSchedule("no change points".to_string()))?;
        if first.start != ScheduleTime::MIDNIGHT {
            return Err(EncodeError::InvalidSchedule(format!(
                "first change point starts at {}, expected 00:00",
                first.start
            )));
        }
        if points.len() > MAX_CHANGE_POINTS {
            return Err(EncodeError::InvalidSchedule(format!(
                "{} change points, the device holds at most {}",
                points.len(),
                MAX_CHANGE_POINTS
            )));
        }
        for pair in points.windows(2) {
            if pair[1].start <= pair[0].start {
                return Err(EncodeError::InvalidSchedule(format!(
                    "change point at {} does not follow {}",
                    pair[1].start, pair[0].start
                )));
            }
        }
        if let Some(last) = points.last()
            && last.start == ScheduleTime::END_OF_DAY
        {
            return Err(EncodeError::InvalidSchedule(
                "change point at 24:00 never takes effect".to_string(),
            ));
        }
        Ok(Self { points })
    }

    /// One temperature for the whole day.
    pub fn constant(temperature: Temperature) -> Self {
        Self {
            points: vec![ChangePoint::new(ScheduleTime::MIDNIGHT, temperature)],
        }
    }

    /// Build from "temperature until time" periods, the way the device and
    /// most users describe a program. The final temperature runs to 24:00.
    pub fn from_periods(periods: &[(Temperature, ScheduleTime)], last: Temperature) -> EncodeResult<Self> {
        let mut points = Vec::with_capacity(periods.len() + 1);
        let mut start = ScheduleTime::MIDNIGHT;
        for &(temperature, until) in periods {
            points.push(ChangePoint::new(start, temperature));
            start = until;
        }
        points.push(ChangePoint::new(start, last));
        Self::new(points)
    }

    pub(crate) fn from_decoded(points: Vec<ChangePoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[ChangePoint] {
        &self.points
    }

    /// True for a day the device reports with no program.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Set point in effect at `time`.
    pub fn temperature_at(&self, time: ScheduleTime) -> Option<Temperature> {
        self.points
            .iter()
            .take_while(|p| p.start <= time)
            .last()
            .map(|p| p.temperature)
    }

    /// Iterate `(start, until, temperature)` periods.
    pub fn periods(&self) -> impl Iterator<Item = (ScheduleTime, ScheduleTime, Temperature)> + '_ {
        self.points.iter().enumerate().map(|(i, p)| {
            let until = self
                .points
                .get(i + 1)
                .map(|n| n.start)
                .unwrap_or(ScheduleTime::END_OF_DAY);
            (p.start, until, p.temperature)
        })
    }
}

impl fmt::Display for DaySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.points.is_empty() {
            return f.write_str("(not programmed)");
        }
        for (i, (start, until, temperature)) in self.periods().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}-{} {}", start, until, temperature)?;
        }
        Ok(())
    }
}

// --- Vacation ---

/// A vacation hold: keep `temperature` until `until`.
///
/// The device resolves the end to 30 minutes; construction rounds down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vacation {
    until: PrimitiveDateTime,
    temperature: Temperature,
}

impl Vacation {
    /// Create a vacation hold starting now.
    pub fn new(until: PrimitiveDateTime, temperature: Temperature) -> EncodeResult<Self> {
        let year = until.year();
        if !(2000..=2255).contains(&year) {
            return Err(EncodeError::InvalidDate(format!(
                "year {} is outside 2000..=2255",
                year
            )));
        }
        let minute = if until.minute() >= 30 { 30 } else { 0 };
        let time = Time::from_hms(until.hour(), minute, 0)
            .map_err(|e| EncodeError::InvalidDate(e.to_string()))?;
        Ok(Self {
            until: PrimitiveDateTime::new(until.date(), time),
            temperature,
        })
    }

    /// Create a vacation hold for the period `start..end`.
    ///
    /// The device has no deferred start, so `start` must not lie after
    /// `now`, and `end` must lie after both.
    pub fn between(
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
        temperature: Temperature,
        now: PrimitiveDateTime,
    ) -> EncodeResult<Self> {
        if start > now {
            return Err(EncodeError::InvalidDate(format!(
                "vacation start {} is in the future; the device starts vacation immediately",
                start
            )));
        }
        let vacation = Self::new(end, temperature)?;
        if vacation.until <= now {
            return Err(EncodeError::InvalidDate(format!(
                "vacation end {} is not in the future",
                vacation.until
            )));
        }
        Ok(vacation)
    }

    pub(crate) fn from_bytes(temperature: Temperature, b: &[u8]) -> DecodeResult<Option<Self>> {
        let (day, year, half_hours, month) = (b[0], b[1], b[2], b[3]);
        if day == 0 {
            return Ok(None);
        }
        let month = Month::try_from(month).map_err(|_| DecodeError::OutOfRange {
            field: "vacation month",
            value: month,
        })?;
        let date = Date::from_calendar_date(2000 + i32::from(year), month, day).map_err(|_| {
            DecodeError::OutOfRange {
                field: "vacation day",
                value: day,
            }
        })?;
        let time = Time::from_hms(half_hours / 2, (half_hours % 2) * 30, 0).map_err(|_| {
            DecodeError::OutOfRange {
                field: "vacation time",
                value: half_hours,
            }
        })?;
        Ok(Some(Self {
            until: PrimitiveDateTime::new(date, time),
            temperature,
        }))
    }

    /// `[day, year - 2000, half hours, month]`.
    pub(crate) fn until_bytes(&self) -> [u8; 4] {
        let u = self.until;
        [
            u.day(),
            (u.year() - 2000) as u8,
            u.hour() * 2 + u.minute() / 30,
            u8::from(u.month()),
        ]
    }

    pub fn until(&self) -> PrimitiveDateTime {
        self.until
    }

    pub fn temperature(&self) -> Temperature {
        self.temperature
    }
}

// --- Configuration ---

/// Open-window detection settings.
///
/// When disabled the device stores a duration of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OpenWindowConfig {
    temperature: Temperature,
    minutes: u16,
    enabled: bool,
}

/// Longest open-window duration the device stores.
pub const MAX_OPEN_WINDOW_MINUTES: u16 = 995;

impl OpenWindowConfig {
    /// Enabled detection: drop to `temperature` for `minutes` (multiple of 5,
    /// at most 995).
    pub fn new(temperature: Temperature, minutes: u16) -> EncodeResult<Self> {
        if minutes == 0 || minutes > MAX_OPEN_WINDOW_MINUTES || minutes % 5 != 0 {
            return Err(EncodeError::out_of_range(
                "open window duration",
                i64::from(minutes),
                "multiple of 5 in 5..=995 minutes",
            ));
        }
        Ok(Self {
            temperature,
            minutes,
            enabled: true,
        })
    }

    /// Detection switched off. The temperature is still stored.
    pub fn disabled(temperature: Temperature) -> Self {
        Self {
            temperature,
            minutes: 0,
            enabled: false,
        }
    }

    pub(crate) fn from_bytes(temperature: u8, fives: u8) -> DecodeResult<Self> {
        let temperature = Temperature::from_raw("open window temperature", temperature)?;
        let minutes = u16::from(fives) * 5;
        if minutes > MAX_OPEN_WINDOW_MINUTES {
            return Err(DecodeError::OutOfRange {
                field: "open window duration",
                value: fives,
            });
        }
        Ok(Self {
            temperature,
            minutes,
            enabled: minutes > 0,
        })
    }

    pub(crate) fn duration_byte(&self) -> u8 {
        if self.enabled {
            (self.minutes / 5) as u8
        } else {
            0
        }
    }

    pub fn temperature(&self) -> Temperature {
        self.temperature
    }

    pub fn minutes(&self) -> u16 {
        if self.enabled { self.minutes } else { 0 }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Persistent configuration reported by newer firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceConfig {
    pub comfort: Temperature,
    pub eco: Temperature,
    pub offset: OffsetTemperature,
    pub open_window: OpenWindowConfig,
}

/// Firmware version and serial number from the identification frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceInfo {
    /// Firmware version times 100 (e.g. 146 is 1.46).
    pub firmware: u8,
    /// Serial number as printed on the device.
    pub serial: String,
}

impl DeviceInfo {
    /// Firmware as "1.46".
    pub fn firmware_version(&self) -> String {
        format!("{}.{:02}", self.firmware / 100, self.firmware % 100)
    }
}

/// One decoded status frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusReport {
    pub mode: Mode,
    pub flags: StatusFlags,
    /// Valve opening in percent.
    pub valve: u8,
    /// Current set point (vacation temperature while on vacation).
    pub target: Temperature,
    /// Present while a vacation hold is programmed.
    pub vacation: Option<Vacation>,
    /// Only reported by newer firmware.
    pub config: Option<DeviceConfig>,
}

impl StatusReport {
    /// A report in auto mode with everything else idle.
    pub fn new(target: Temperature) -> Self {
        Self {
            mode: Mode::default(),
            flags: StatusFlags::default(),
            valve: 0,
            target,
            vacation: None,
            config: None,
        }
    }
}

/// Weekday and time from a local date-time, for the clock-sync command.
pub(crate) fn clock_bytes(now: PrimitiveDateTime) -> EncodeResult<[u8; 6]> {
    let year = now.year();
    if !(2000..=2099).contains(&year) {
        return Err(EncodeError::InvalidDate(format!(
            "clock year {} is outside 2000..=2099",
            year
        )));
    }
    Ok([
        (year % 100) as u8,
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_temperature_rounds_to_half_degree() {
        assert_eq!(Temperature::new(21.4).unwrap().celsius(), 21.5);
        assert_eq!(Temperature::new(21.2).unwrap().celsius(), 21.0);
        assert_eq!(Temperature::new(4.5).unwrap(), Temperature::OFF);
        assert_eq!(Temperature::new(30.0).unwrap(), Temperature::ON);
    }

    #[test]
    fn test_temperature_rejects_out_of_range() {
        assert!(Temperature::new(3.0).is_err());
        assert!(Temperature::new(31.0).is_err());
        assert!(Temperature::new(f32::NAN).is_err());
        assert!(Temperature::new(4.0).is_err());
    }

    #[test]
    fn test_temperature_from_str() {
        assert_eq!("on".parse::<Temperature>().unwrap(), Temperature::ON);
        assert_eq!("OFF".parse::<Temperature>().unwrap(), Temperature::OFF);
        assert_eq!("19.5".parse::<Temperature>().unwrap().celsius(), 19.5);
        assert!("warm".parse::<Temperature>().is_err());
    }

    #[test]
    fn test_temperature_fahrenheit() {
        let t = Temperature::new(20.0).unwrap();
        assert!((t.fahrenheit() - 68.0).abs() < 0.01);
        assert_eq!(t.to_string(), "20.0°C");
    }

    #[test]
    fn test_offset_range() {
        assert_eq!(OffsetTemperature::new(-3.5).unwrap().raw(), 0);
        assert_eq!(OffsetTemperature::new(3.5).unwrap().raw(), 14);
        assert_eq!(OffsetTemperature::new(0.0).unwrap().raw(), 7);
        assert!(OffsetTemperature::new(4.0).is_err());
        assert_eq!(OffsetTemperature::from_raw(9).unwrap().celsius(), 1.0);
        assert!(OffsetTemperature::from_raw(15).is_err());
    }

    #[test]
    fn test_mode_byte_round_trip() {
        let (mode, flags) = mode_from_byte(0x09 | 0x80);
        assert_eq!(mode.base, BaseMode::Manual);
        assert!(flags.dst);
        assert!(flags.battery_low);
        assert!(!flags.locked);
        assert_eq!(mode_to_byte(&mode, &flags), 0x89);
    }

    #[test]
    fn test_effective_mode_precedence() {
        let mut mode = Mode::default();
        assert_eq!(mode.effective(), EffectiveMode::Auto);
        mode.base = BaseMode::Manual;
        assert_eq!(mode.effective(), EffectiveMode::Manual);
        mode.overlays.vacation = true;
        assert_eq!(mode.effective(), EffectiveMode::VacationActive);
        mode.overlays.open_window = true;
        assert_eq!(mode.effective(), EffectiveMode::OpenWindowActive);
        mode.overlays.boost = true;
        assert_eq!(mode.effective(), EffectiveMode::BoostActive);
    }

    #[test]
    fn test_weekday_from_time_weekday() {
        assert_eq!(Weekday::from(time::Weekday::Monday), Weekday::Monday);
        assert_eq!(Weekday::from(time::Weekday::Saturday), Weekday::Saturday);
        assert_eq!(Weekday::from(time::Weekday::Friday), Weekday::Friday);
        assert_eq!(Weekday::Monday.as_byte(), 2);
        assert_eq!(Weekday::Friday.next(), Weekday::Saturday);
    }

    #[test]
    fn test_day_selector() {
        assert_eq!(
            "weekend".parse::<DaySelector>().unwrap().days(Weekday::Monday),
            vec![Weekday::Saturday, Weekday::Sunday]
        );
        assert_eq!(
            "work".parse::<DaySelector>().unwrap().days(Weekday::Monday).len(),
            5
        );
        assert_eq!(
            DaySelector::Tomorrow.days(Weekday::Friday),
            vec![Weekday::Saturday]
        );
        assert_eq!(
            "Tue".parse::<DaySelector>().unwrap(),
            DaySelector::Day(Weekday::Tuesday)
        );
        assert!("someday".parse::<DaySelector>().is_err());
    }

    #[test]
    fn test_schedule_time() {
        let t: ScheduleTime = "06:30".parse().unwrap();
        assert_eq!(t.raw(), 39);
        assert_eq!(t.to_string(), "06:30");
        assert_eq!("24:00".parse::<ScheduleTime>().unwrap(), ScheduleTime::END_OF_DAY);
        assert_eq!("7".parse::<ScheduleTime>().unwrap().to_string(), "07:00");
        assert!("06:35".parse::<ScheduleTime>().is_err());
        assert!("24:10".parse::<ScheduleTime>().is_err());
    }

    fn t(c: f32) -> Temperature {
        Temperature::new(c).unwrap()
    }

    fn at(s: &str) -> ScheduleTime {
        s.parse().unwrap()
    }

    #[test]
    fn test_day_schedule_invariants() {
        let ok = DaySchedule::new(vec![
            ChangePoint::new(at("00:00"), t(17.0)),
            ChangePoint::new(at("06:00"), t(21.0)),
            ChangePoint::new(at("22:00"), t(17.0)),
        ])
        .unwrap();
        assert_eq!(ok.temperature_at(at("07:00")), Some(t(21.0)));
        assert_eq!(ok.temperature_at(at("23:50")), Some(t(17.0)));

        let late_start = DaySchedule::new(vec![ChangePoint::new(at("01:00"), t(17.0))]);
        assert!(matches!(late_start, Err(EncodeError::InvalidSchedule(_))));

        let unordered = DaySchedule::new(vec![
            ChangePoint::new(at("00:00"), t(17.0)),
            ChangePoint::new(at("08:00"), t(21.0)),
            ChangePoint::new(at("08:00"), t(19.0)),
        ]);
        assert!(unordered.is_err());

        let too_many: Vec<_> = (0..8)
            .map(|i| ChangePoint::new(ScheduleTime::new(i, 0).unwrap(), t(20.0)))
            .collect();
        assert!(DaySchedule::new(too_many).is_err());
        assert!(DaySchedule::new(Vec::new()).is_err());
    }

    #[test]
    fn test_day_schedule_from_periods() {
        let schedule =
            DaySchedule::from_periods(&[(t(17.0), at("06:00")), (t(21.0), at("22:00"))], t(17.0))
                .unwrap();
        assert_eq!(schedule.points().len(), 3);
        assert_eq!(
            schedule.to_string(),
            "00:00-06:00 17.0°C, 06:00-22:00 21.0°C, 22:00-24:00 17.0°C"
        );
    }

    #[test]
    fn test_vacation_rounds_down_to_half_hour() {
        let v = Vacation::new(datetime!(2025-12-24 17:59), t(12.0)).unwrap();
        assert_eq!(v.until(), datetime!(2025-12-24 17:30));
        assert_eq!(v.until_bytes(), [24, 25, 35, 12]);
    }

    #[test]
    fn test_vacation_between_rejects_deferred_start() {
        let now = datetime!(2025-06-01 12:00);
        let deferred = Vacation::between(
            datetime!(2025-06-02 12:00),
            datetime!(2025-06-05 12:00),
            t(15.0),
            now,
        );
        assert!(matches!(deferred, Err(EncodeError::InvalidDate(_))));

        let past_end = Vacation::between(now, datetime!(2025-06-01 11:00), t(15.0), now);
        assert!(past_end.is_err());

        let ok = Vacation::between(now, datetime!(2025-06-05 08:00), t(15.0), now).unwrap();
        assert_eq!(ok.temperature(), t(15.0));
    }

    #[test]
    fn test_vacation_from_bytes() {
        let v = Vacation::from_bytes(t(12.0), &[24, 25, 35, 12]).unwrap().unwrap();
        assert_eq!(v.until(), datetime!(2025-12-24 17:30));
        assert_eq!(Vacation::from_bytes(t(12.0), &[0, 0, 0, 0]).unwrap(), None);
        assert!(Vacation::from_bytes(t(12.0), &[24, 25, 35, 13]).is_err());
        assert!(Vacation::from_bytes(t(12.0), &[31, 25, 35, 2]).is_err());
    }

    #[test]
    fn test_open_window_config() {
        let cfg = OpenWindowConfig::new(t(12.0), 15).unwrap();
        assert_eq!(cfg.duration_byte(), 3);
        assert!(OpenWindowConfig::new(t(12.0), 17).is_err());
        assert!(OpenWindowConfig::new(t(12.0), 1000).is_err());
        assert!(OpenWindowConfig::new(t(12.0), 0).is_err());

        let off = OpenWindowConfig::disabled(t(12.0));
        assert_eq!(off.duration_byte(), 0);
        assert!(!OpenWindowConfig::from_bytes(24, 0).unwrap().enabled());
        assert_eq!(OpenWindowConfig::from_bytes(24, 3).unwrap(), cfg);
    }

    #[test]
    fn test_device_info_firmware_version() {
        let info = DeviceInfo {
            firmware: 146,
            serial: "OEQ1234567".to_string(),
        };
        assert_eq!(info.firmware_version(), "1.46");
    }

    #[test]
    fn test_clock_bytes() {
        assert_eq!(
            clock_bytes(datetime!(2024-03-09 07:05:42)).unwrap(),
            [24, 3, 9, 7, 5, 42]
        );
        assert!(clock_bytes(datetime!(1999-12-31 23:59:59)).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_temperature_serde_as_celsius() {
        let json = serde_json::to_string(&t(21.5)).unwrap();
        assert_eq!(json, "21.5");
        let back: Temperature = serde_json::from_str("18.0").unwrap();
        assert_eq!(back, t(18.0));
        assert!(serde_json::from_str::<Temperature>("35.0").is_err());
    }
}

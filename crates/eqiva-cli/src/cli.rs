//! CLI argument definitions using clap.
//!
//! Device operations are plain flags; they run in the order they appear on
//! the command line, which is recovered from the argument indices.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgMatches, Parser, ValueEnum};
use eqiva_core::{Operation, local_now};
use eqiva_types::{
    BaseMode, DaySchedule, DaySelector, Preset, ScheduleTime, Temperature,
};
use time::macros::format_description;
use time::{Duration as TimeDuration, PrimitiveDateTime};

#[derive(Debug, Parser)]
#[command(name = "eqiva")]
#[command(author, version, about = "Control Eqiva Bluetooth radiator thermostats", long_about = None)]
pub struct Cli {
    /// Thermostat address or alias; several may be given
    #[arg(value_name = "DEVICE")]
    pub devices: Vec<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level; overrides -v, -q and RUST_LOG
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log: Option<LogLevel>,

    /// Config file [default: <config dir>/eqiva/config.toml]
    #[arg(long, env = "EQIVA_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, conflicts_with_all = ["print", "commands"])]
    pub json: bool,

    /// Print the collected data (the default output)
    #[arg(long)]
    pub print: bool,

    /// Print the collected data as eqiva flags for easy re-use
    #[arg(long)]
    pub commands: bool,

    /// Show temperatures in Fahrenheit (overrides config)
    #[arg(long, conflicts_with = "celsius")]
    pub fahrenheit: bool,

    /// Show temperatures in Celsius (overrides config)
    #[arg(long)]
    pub celsius: bool,

    /// Connection timeout in seconds
    #[arg(short = 'T', long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Read status (the default when no operation is given)
    #[arg(long, help_heading = "Operations")]
    pub status: bool,

    /// Set target temperature in °C, or select comfort, eco, on or off
    #[arg(long, value_name = "T|comfort|eco|on|off", value_parser = parse_target, help_heading = "Operations")]
    pub temp: Option<TargetArg>,

    /// Switch between the weekly program and manual control
    #[arg(long, value_parser = parse_mode, value_name = "auto|manual", help_heading = "Operations")]
    pub mode: Option<BaseMode>,

    /// Boost: valve fully open for five minutes
    #[arg(long, value_enum, value_name = "on|off", help_heading = "Operations")]
    pub boost: Option<Switch>,

    /// Hold TEMP until UNTIL ("YYYY-MM-DD HH:MM", or +Nh / +Nd from now)
    #[arg(long, num_args = 2, value_names = ["UNTIL", "TEMP"], help_heading = "Operations")]
    pub vacation: Option<Vec<String>>,

    /// Read the weekly program, or set one: DAY [TEMP HH:MM]... TEMP
    #[arg(long, num_args = 0.., value_name = "DAY [TEMP HH:MM]... TEMP", help_heading = "Operations")]
    pub program: Option<Vec<String>>,

    /// Measured-temperature offset in °C (-3.5 to 3.5)
    #[arg(long, allow_negative_numbers = true, value_name = "T", help_heading = "Operations")]
    pub offset: Option<f32>,

    /// Comfort and eco temperatures
    #[arg(long, num_args = 2, value_names = ["COMFORT", "ECO"], help_heading = "Operations")]
    pub comforteco: Option<Vec<f32>>,

    /// Open-window temperature and duration (multiple of 5 min, 0 disables)
    #[arg(long, num_args = 2, value_names = ["TEMP", "MINUTES"], help_heading = "Operations")]
    pub openwindow: Option<Vec<String>>,

    /// Child lock
    #[arg(long, value_enum, value_name = "on|off", help_heading = "Operations")]
    pub lock: Option<Switch>,

    /// Firmware version and serial number
    #[arg(long, help_heading = "Operations")]
    pub serial: bool,

    /// Device name string
    #[arg(long, help_heading = "Operations")]
    pub name: bool,

    /// Vendor string
    #[arg(long, help_heading = "Operations")]
    pub vendor: bool,

    /// Read everything: name, vendor, serial, status and all programs
    #[arg(long, help_heading = "Operations")]
    pub dump: bool,

    /// Factory reset
    #[arg(long, help_heading = "Operations")]
    pub reset: bool,

    /// Scan for thermostats
    #[arg(long, value_name = "SECS", num_args = 0..=1, default_missing_value = "10", help_heading = "Discovery")]
    pub scan: Option<u64>,

    /// List aliases
    #[arg(long, help_heading = "Aliases")]
    pub aliases: bool,

    /// Add or replace an alias
    #[arg(long, num_args = 2, value_names = ["NAME", "ADDRESS"], help_heading = "Aliases")]
    pub alias_set: Option<Vec<String>>,

    /// Remove an alias
    #[arg(long, value_name = "NAME", help_heading = "Aliases")]
    pub alias_remove: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

/// How a run's results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStyle {
    Text,
    Commands,
    Json,
}

/// Value of `--temp`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetArg {
    Celsius(Temperature),
    Preset(Preset),
}

fn parse_target(s: &str) -> Result<TargetArg, String> {
    match s.to_ascii_lowercase().as_str() {
        "comfort" => Ok(TargetArg::Preset(Preset::Comfort)),
        "eco" => Ok(TargetArg::Preset(Preset::Eco)),
        "on" => Ok(TargetArg::Preset(Preset::On)),
        "off" => Ok(TargetArg::Preset(Preset::Off)),
        _ => s
            .parse::<Temperature>()
            .map(TargetArg::Celsius)
            .map_err(|e| e.to_string()),
    }
}

fn parse_mode(s: &str) -> Result<BaseMode, String> {
    s.parse().map_err(|e: eqiva_types::EncodeError| e.to_string())
}

/// Parse a vacation end: an absolute local time or an offset from `now`.
pub fn parse_until(s: &str, now: PrimitiveDateTime) -> Result<PrimitiveDateTime> {
    let s = s.trim();
    if let Some(rel) = s.strip_prefix('+') {
        let (number, unit) = rel.split_at(rel.len().saturating_sub(1));
        let n: i64 = number
            .parse()
            .with_context(|| format!("Invalid relative time '{}'", s))?;
        return match unit {
            "h" => Ok(now + TimeDuration::hours(n)),
            "d" => Ok(now + TimeDuration::days(n)),
            _ => bail!("Relative time '{}' must end in h or d", s),
        };
    }
    let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let iso = format_description!("[year]-[month]-[day]T[hour]:[minute]");
    PrimitiveDateTime::parse(s, spaced)
        .or_else(|_| PrimitiveDateTime::parse(s, iso))
        .with_context(|| format!("Invalid time '{}', expected YYYY-MM-DD HH:MM", s))
}

/// Parse `--program` arguments.
///
/// No arguments reads every day, a lone DAY reads that day, and
/// `DAY TEMP HH:MM ... TEMP` writes a program where each TEMP holds until
/// the following time and the last one until midnight.
pub fn parse_program(args: &[String]) -> Result<Operation> {
    let Some((day, rest)) = args.split_first() else {
        return Ok(Operation::RequestSchedule(DaySelector::Everyday));
    };
    let days: DaySelector = day.parse()?;
    if rest.is_empty() {
        return Ok(Operation::RequestSchedule(days));
    }
    if rest.len() % 2 == 0 {
        bail!("A program is DAY followed by TEMP HH:MM pairs and a final TEMP");
    }

    let (pairs, last) = rest.split_at(rest.len() - 1);
    let periods = pairs
        .chunks(2)
        .map(|pair| Ok((pair[0].parse::<Temperature>()?, pair[1].parse::<ScheduleTime>()?)))
        .collect::<Result<Vec<_>>>()?;
    let schedule = DaySchedule::from_periods(&periods, last[0].parse()?)?;
    Ok(Operation::SetSchedule { days, schedule })
}

impl Cli {
    /// Device operations in command-line order.
    pub fn operations(&self, matches: &ArgMatches) -> Result<Vec<Operation>> {
        let mut ops: Vec<(usize, Operation)> = Vec::new();
        let mut push = |id: &str, op: Operation| {
            ops.push((matches.index_of(id).unwrap_or(usize::MAX), op));
        };

        if self.status {
            push("status", Operation::Status);
        }
        match self.temp {
            Some(TargetArg::Celsius(t)) => push("temp", Operation::SetTemperature(t.celsius())),
            Some(TargetArg::Preset(p)) => push("temp", Operation::Preset(p)),
            None => {}
        }
        if let Some(mode) = self.mode {
            push("mode", Operation::SetMode(mode));
        }
        if let Some(boost) = self.boost {
            push("boost", Operation::SetBoost(boost.is_on()));
        }
        if let Some([until, temp]) = self.vacation.as_deref() {
            let end = parse_until(until, local_now())?;
            let temperature = temp.parse::<Temperature>()?.celsius();
            push("vacation", Operation::SetVacation { end, temperature });
        }
        if let Some(args) = &self.program {
            push("program", parse_program(args)?);
        }
        if let Some(offset) = self.offset {
            eqiva_types::OffsetTemperature::new(offset)?;
            push("offset", Operation::SetOffset(offset));
        }
        if let Some([comfort, eco]) = self.comforteco.as_deref() {
            Temperature::new(*comfort)?;
            Temperature::new(*eco)?;
            push(
                "comforteco",
                Operation::SetComfortEco {
                    comfort: *comfort,
                    eco: *eco,
                },
            );
        }
        if let Some([temp, minutes]) = self.openwindow.as_deref() {
            let temperature = temp.parse::<Temperature>()?.celsius();
            let minutes: u16 = minutes
                .parse()
                .with_context(|| format!("Invalid duration '{}'", minutes))?;
            push(
                "openwindow",
                Operation::ConfigureOpenWindow {
                    temperature,
                    minutes,
                },
            );
        }
        if let Some(lock) = self.lock {
            push("lock", Operation::SetLock(lock.is_on()));
        }
        if self.serial {
            push("serial", Operation::Info);
        }
        if self.name {
            push("name", Operation::Name);
        }
        if self.vendor {
            push("vendor", Operation::Vendor);
        }
        if self.dump {
            push("dump", Operation::Dump);
        }
        if self.reset {
            push("reset", Operation::FactoryReset);
        }

        ops.sort_by_key(|(index, _)| *index);
        Ok(ops.into_iter().map(|(_, op)| op).collect())
    }

    /// Output styles in command-line order; text when none is chosen.
    pub fn output_styles(&self, matches: &ArgMatches) -> Vec<OutputStyle> {
        if self.json {
            return vec![OutputStyle::Json];
        }
        let mut styles = Vec::new();
        if self.print {
            styles.push((matches.index_of("print"), OutputStyle::Text));
        }
        if self.commands {
            styles.push((matches.index_of("commands"), OutputStyle::Commands));
        }
        if styles.is_empty() {
            return vec![OutputStyle::Text];
        }
        styles.sort_by_key(|(index, _)| *index);
        styles.into_iter().map(|(_, style)| style).collect()
    }

    /// Fahrenheit display: explicit flags override config.
    pub fn resolve_fahrenheit(&self, config_fahrenheit: bool) -> bool {
        if self.fahrenheit {
            true
        } else if self.celsius {
            false
        } else {
            config_fahrenheit
        }
    }

    /// Tracing filter: `--log`, then `-v`/`-q`, then `RUST_LOG`, then info.
    pub fn log_filter(&self) -> Option<&'static str> {
        if let Some(level) = self.log {
            Some(level.as_filter())
        } else if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("warn")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};
    use eqiva_types::Weekday;
    use time::macros::datetime;

    fn parse(args: &[&str]) -> (Cli, ArgMatches) {
        let matches = Cli::command()
            .try_get_matches_from(std::iter::once("eqiva").chain(args.iter().copied()))
            .unwrap();
        let cli = Cli::from_arg_matches(&matches).unwrap();
        (cli, matches)
    }

    fn ops(args: &[&str]) -> Vec<Operation> {
        let (cli, matches) = parse(args);
        cli.operations(&matches).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_operations_keep_command_line_order() {
        assert_eq!(
            ops(&["kitchen", "--boost", "off", "--temp", "21.5", "--status"]),
            vec![
                Operation::SetBoost(false),
                Operation::SetTemperature(21.5),
                Operation::Status
            ]
        );
        assert_eq!(
            ops(&["kitchen", "--status", "--mode", "manual", "--temp", "eco"]),
            vec![
                Operation::Status,
                Operation::SetMode(BaseMode::Manual),
                Operation::Preset(Preset::Eco)
            ]
        );
    }

    #[test]
    fn test_dump_is_an_operation() {
        assert_eq!(
            ops(&["kitchen", "--dump", "--lock", "on"]),
            vec![Operation::Dump, Operation::SetLock(true)]
        );
    }

    #[test]
    fn test_output_styles() {
        let (cli, matches) = parse(&["x"]);
        assert_eq!(cli.output_styles(&matches), vec![OutputStyle::Text]);
        let (cli, matches) = parse(&["x", "--commands", "--print"]);
        assert_eq!(
            cli.output_styles(&matches),
            vec![OutputStyle::Commands, OutputStyle::Text]
        );
        let (cli, matches) = parse(&["x", "--json"]);
        assert_eq!(cli.output_styles(&matches), vec![OutputStyle::Json]);
        assert!(
            Cli::command()
                .try_get_matches_from(["eqiva", "x", "--json", "--commands"])
                .is_err()
        );
    }

    #[test]
    fn test_devices_and_defaults() {
        let (cli, matches) = parse(&["living", "bedroom"]);
        assert_eq!(cli.devices, vec!["living", "bedroom"]);
        assert!(cli.operations(&matches).unwrap().is_empty());

        let (cli, _) = parse(&["--scan"]);
        assert_eq!(cli.scan, Some(10));
        let (cli, _) = parse(&["--scan", "4"]);
        assert_eq!(cli.scan, Some(4));
    }

    #[test]
    fn test_invalid_temperature_rejected_at_parse() {
        let result = Cli::command().try_get_matches_from(["eqiva", "x", "--temp", "31"]);
        assert!(result.is_err());
        let result = Cli::command().try_get_matches_from(["eqiva", "x", "--temp", "warm"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_offset() {
        assert_eq!(ops(&["x", "--offset", "-1.5"]), vec![Operation::SetOffset(-1.5)]);
        let (cli, matches) = parse(&["x", "--offset", "5"]);
        assert!(cli.operations(&matches).is_err());
    }

    #[test]
    fn test_program_forms() {
        assert_eq!(
            parse_program(&[]).unwrap(),
            Operation::RequestSchedule(DaySelector::Everyday)
        );
        assert_eq!(
            parse_program(&["sun".to_string()]).unwrap(),
            Operation::RequestSchedule(DaySelector::Day(Weekday::Sunday))
        );

        let args: Vec<String> = ["work", "17", "06:00", "21", "22:00", "17"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let Operation::SetSchedule { days, schedule } = parse_program(&args).unwrap() else {
            panic!("expected a program write");
        };
        assert_eq!(days, DaySelector::Work);
        assert_eq!(schedule.points().len(), 3);
        assert_eq!(
            schedule.temperature_at("12:00".parse().unwrap()),
            Some(Temperature::new(21.0).unwrap())
        );

        let dangling: Vec<String> = ["mon", "17", "06:00"].iter().map(|s| s.to_string()).collect();
        assert!(parse_program(&dangling).is_err());
    }

    #[test]
    fn test_until_forms() {
        let now = datetime!(2026-10-17 12:00);
        assert_eq!(
            parse_until("2026-10-20 18:30", now).unwrap(),
            datetime!(2026-10-20 18:30)
        );
        assert_eq!(
            parse_until("2026-10-20T18:30", now).unwrap(),
            datetime!(2026-10-20 18:30)
        );
        assert_eq!(parse_until("+3d", now).unwrap(), datetime!(2026-10-20 12:00));
        assert_eq!(parse_until("+6h", now).unwrap(), datetime!(2026-10-17 18:00));
        assert!(parse_until("+6w", now).is_err());
        assert!(parse_until("tomorrow", now).is_err());
    }

    #[test]
    fn test_log_filter_precedence() {
        let (cli, _) = parse(&["-v", "--log", "error"]);
        assert_eq!(cli.log_filter(), Some("error"));
        let (cli, _) = parse(&["-q"]);
        assert_eq!(cli.log_filter(), Some("warn"));
        let (cli, _) = parse(&[]);
        assert_eq!(cli.log_filter(), None);
    }

    #[test]
    fn test_fahrenheit_resolution() {
        let (cli, _) = parse(&["--celsius"]);
        assert!(!cli.resolve_fahrenheit(true));
        let (cli, _) = parse(&[]);
        assert!(cli.resolve_fahrenheit(true));
    }
}

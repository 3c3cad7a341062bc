//! Output formatting utilities for text and JSON output.

use anyhow::Result;
use eqiva_core::{Aliases, DeviceReport, DeviceState, DiscoveredThermostat, Outcome};
use eqiva_types::{DaySchedule, DeviceInfo, EffectiveMode, ScheduleTime, Temperature, Weekday};
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;
use time::macros::format_description;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use Fahrenheit for temperatures.
    pub fahrenheit: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool, fahrenheit: bool) -> Self {
        Self {
            no_color,
            fahrenheit,
        }
    }

    /// Serialize value to pretty-printed JSON.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)? + "\n")
    }

    /// Format a set-point; the valve sentinels print as words.
    #[must_use]
    pub fn format_temp(&self, temperature: Temperature) -> String {
        if temperature.is_off() {
            return "off".to_string();
        }
        if temperature.is_on() {
            return "on".to_string();
        }
        if self.fahrenheit {
            format!("{:.1}°F", temperature.fahrenheit())
        } else {
            format!("{:.1}°C", temperature.celsius())
        }
    }

    fn paint_mode(&self, mode: EffectiveMode) -> String {
        let text = mode.to_string();
        if self.no_color {
            return text;
        }
        match mode {
            EffectiveMode::Auto => format!("{}", text.green()),
            EffectiveMode::Manual => format!("{}", text.cyan()),
            EffectiveMode::BoostActive => format!("{}", text.red().bold()),
            EffectiveMode::VacationActive | EffectiveMode::OpenWindowActive => {
                format!("{}", text.yellow())
            }
        }
    }

    fn label(&self, text: &str) -> String {
        if self.no_color {
            format!("{}:", text)
        } else {
            format!("{}", format!("{}:", text).bold())
        }
    }

    fn heading(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            format!("{}", text.cyan().bold())
        }
    }

    fn schedule_text(&self, schedule: &DaySchedule) -> String {
        if schedule.is_empty() {
            return "(not programmed)".to_string();
        }
        schedule
            .periods()
            .map(|(start, until, t)| format!("{}-{} {}", start, until, self.format_temp(t)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Format the state block for one device.
#[must_use]
pub fn format_state_text(state: &DeviceState, opts: &FormatOptions) -> String {
    let mut out = String::new();
    let Some(status) = &state.status else {
        out.push_str("  (no status received)\n");
        return out;
    };

    let mode = status.mode.effective();
    out.push_str(&format!(
        "  {:<12} {}\n",
        opts.label("Mode"),
        opts.paint_mode(mode)
    ));
    out.push_str(&format!(
        "  {:<12} {}\n",
        opts.label("Target"),
        opts.format_temp(status.target)
    ));
    out.push_str(&format!("  {:<12} {}%\n", opts.label("Valve"), status.valve));
    if let Some(vacation) = status.vacation {
        let until = vacation
            .until()
            .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
            .unwrap_or_else(|_| "?".to_string());
        out.push_str(&format!(
            "  {:<12} until {} at {}\n",
            opts.label("Vacation"),
            until,
            opts.format_temp(vacation.temperature())
        ));
    }

    let mut flags = Vec::new();
    if status.flags.locked {
        flags.push("locked");
    }
    if status.flags.dst {
        flags.push("dst");
    }
    if status.flags.battery_low {
        flags.push("battery low");
    }
    if !flags.is_empty() {
        let flags = flags.join(", ");
        let flags = if opts.no_color || !status.flags.battery_low {
            flags
        } else {
            format!("{}", flags.red())
        };
        out.push_str(&format!("  {:<12} {}\n", opts.label("Flags"), flags));
    }

    if let Some(config) = &state.config {
        out.push_str(&format!(
            "  {:<12} {} / {}\n",
            opts.label("Comfort/Eco"),
            opts.format_temp(config.comfort),
            opts.format_temp(config.eco)
        ));
        out.push_str(&format!("  {:<12} {}\n", opts.label("Offset"), config.offset));
        let window = &config.open_window;
        let window = if window.enabled() {
            format!(
                "{} for {} min",
                opts.format_temp(window.temperature()),
                window.minutes()
            )
        } else {
            "disabled".to_string()
        };
        out.push_str(&format!("  {:<12} {}\n", opts.label("Open window"), window));
    }

    out
}

/// Format weekly programs as a table.
#[must_use]
pub fn format_schedules_text(programs: &[(Weekday, DaySchedule)], opts: &FormatOptions) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Day", "Program"]);
    for (day, schedule) in programs {
        builder.push_record([day.to_string(), opts.schedule_text(schedule)]);
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    format!("{}\n", table)
}

fn format_info_text(info: &DeviceInfo, opts: &FormatOptions) -> String {
    format!(
        "  {:<12} {}\n  {:<12} {}\n",
        opts.label("Firmware"),
        info.firmware_version(),
        opts.label("Serial"),
        info.serial
    )
}

/// Format the reports of a run as text.
///
/// Every operation that returned something is shown; the final state
/// closes each device block.
#[must_use]
pub fn format_reports_text(reports: &[&DeviceReport], opts: &FormatOptions) -> String {
    let mut out = String::new();
    for (i, report) in reports.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let title = if report.target == report.address {
            report.address.clone()
        } else {
            format!("{} ({})", report.target, report.address)
        };
        out.push_str(&opts.heading(&title));
        out.push('\n');

        for outcome in &report.results {
            match outcome {
                Outcome::Schedules(programs) => {
                    out.push_str(&format_schedules_text(programs, opts));
                }
                Outcome::Info(info) => out.push_str(&format_info_text(info, opts)),
                Outcome::Text(text) => out.push_str(&format!("  {}\n", text)),
                Outcome::Dump(dump) => {
                    out.push_str(&format!("  {:<12} {}\n", opts.label("Name"), dump.name));
                    out.push_str(&format!("  {:<12} {}\n", opts.label("Vendor"), dump.vendor));
                    out.push_str(&format_info_text(&dump.info, opts));
                    out.push_str(&format_schedules_text(&dump.schedules, opts));
                }
                Outcome::State(_) | Outcome::Done => {}
            }
        }
        out.push_str(&format_state_text(&report.state, opts));
    }
    out
}

/// A set-point as `--temp` accepts it.
fn command_temp(temperature: Temperature) -> String {
    if temperature.is_off() {
        "off".to_string()
    } else if temperature.is_on() {
        "on".to_string()
    } else {
        format!("{:.1}", temperature.celsius())
    }
}

fn command_program(schedule: &DaySchedule) -> String {
    schedule
        .periods()
        .map(|(_, until, t)| {
            if until == ScheduleTime::END_OF_DAY {
                command_temp(t)
            } else {
                format!("{} {}", command_temp(t), until)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn command_flags(state: &DeviceState) -> Vec<String> {
    let mut flags = Vec::new();
    let Some(status) = &state.status else {
        return flags;
    };

    // Replayable order: programs go in before a vacation hold, boost last.
    flags.push(format!("--mode {}", status.mode.base));
    if status.vacation.is_none() {
        flags.push(format!("--temp {}", command_temp(status.target)));
    }
    if let Some(config) = &state.config {
        flags.push(format!(
            "--comforteco {:.1} {:.1}",
            config.comfort.celsius(),
            config.eco.celsius()
        ));
        flags.push(format!(
            "--openwindow {:.1} {}",
            config.open_window.temperature().celsius(),
            config.open_window.minutes()
        ));
        flags.push(format!("--offset {:.1}", config.offset.celsius()));
    }
    for day in Weekday::ALL {
        if let Some(schedule) = state.schedule(day).filter(|s| !s.is_empty()) {
            flags.push(format!("--program {} {}", day.short_name(), command_program(schedule)));
        }
    }
    if let Some(vacation) = status.vacation {
        let until = vacation
            .until()
            .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
            .unwrap_or_else(|_| "?".to_string());
        flags.push(format!(
            "--vacation \"{}\" {:.1}",
            until,
            vacation.temperature().celsius()
        ));
    }
    let on_off = |on: bool| if on { "on" } else { "off" };
    flags.push(format!("--boost {}", on_off(status.mode.overlays.boost)));
    flags.push(format!("--lock {}", on_off(status.flags.locked)));
    flags
}

/// Format each device's collected state as an `eqiva` command line that
/// restores it. Temperatures are always in Celsius.
#[must_use]
pub fn format_commands_text(reports: &[&DeviceReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let flags = command_flags(&report.state);
        if flags.is_empty() {
            out.push_str(&format!("# {}: no status received\n", report.address));
            continue;
        }
        out.push_str(&format!("eqiva {}", report.address));
        for flag in flags {
            out.push_str(" \\\n    ");
            out.push_str(&flag);
        }
        out.push('\n');
    }
    out
}

/// One entry of the JSON run output; failures keep their place.
#[derive(Debug, Serialize)]
struct ReportJson<'a> {
    target: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<&'a [Outcome]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a DeviceState>,
}

/// Format a whole run as JSON. Temperatures stay in Celsius.
pub fn format_reports_json(
    reports: &[(String, eqiva_core::Result<DeviceReport>)],
    opts: &FormatOptions,
) -> Result<String> {
    #[derive(Serialize)]
    struct RunJson<'a> {
        count: usize,
        devices: Vec<ReportJson<'a>>,
    }

    let devices = reports
        .iter()
        .map(|(target, result)| match result {
            Ok(report) => ReportJson {
                target,
                ok: true,
                address: Some(report.address.as_str()),
                error: None,
                results: Some(report.results.as_slice()),
                state: Some(&report.state),
            },
            Err(e) => ReportJson {
                target,
                ok: false,
                address: None,
                error: Some(e.to_string()),
                results: None,
                state: None,
            },
        })
        .collect();

    opts.as_json(&RunJson {
        count: reports.len(),
        devices,
    })
}

fn alias_for<'a>(aliases: &'a Aliases, identifier: &str) -> Option<&'a str> {
    aliases
        .iter()
        .find(|(_, address)| address.eq_ignore_ascii_case(identifier))
        .map(|(name, _)| name)
}

/// Format scan results with the alias of each known device.
#[must_use]
pub fn format_scan_text(
    devices: &[DiscoveredThermostat],
    aliases: &Aliases,
    opts: &FormatOptions,
) -> String {
    if devices.is_empty() {
        return "No thermostats found.\n".to_string();
    }

    let count = if opts.no_color {
        devices.len().to_string()
    } else {
        format!("{}", devices.len().to_string().green().bold())
    };

    let mut builder = Builder::default();
    builder.push_record(["Name", "Alias", "RSSI", "Identifier"]);
    for d in devices {
        let name = d.name.as_deref().unwrap_or("Unknown");
        builder.push_record([
            if opts.no_color {
                name.to_string()
            } else {
                format!("{}", name.cyan())
            },
            alias_for(aliases, &d.identifier).unwrap_or("-").to_string(),
            d.rssi
                .map(|r| format!("{} dBm", r))
                .unwrap_or_else(|| "N/A".to_string()),
            d.identifier.clone(),
        ]);
    }
    let mut table = builder.build();
    table.with(Style::rounded());

    format!("Found {} thermostat(s)\n\n{}\n", count, table)
}

pub fn format_scan_json(
    devices: &[DiscoveredThermostat],
    aliases: &Aliases,
    opts: &FormatOptions,
) -> Result<String> {
    #[derive(Serialize)]
    struct ScanResult<'a> {
        count: usize,
        devices: Vec<DeviceJson<'a>>,
    }

    #[derive(Serialize)]
    struct DeviceJson<'a> {
        #[serde(flatten)]
        device: &'a DiscoveredThermostat,
        alias: Option<&'a str>,
    }

    opts.as_json(&ScanResult {
        count: devices.len(),
        devices: devices
            .iter()
            .map(|device| DeviceJson {
                device,
                alias: alias_for(aliases, &device.identifier),
            })
            .collect(),
    })
}

/// Format the alias table.
#[must_use]
pub fn format_aliases_text(aliases: &Aliases, opts: &FormatOptions) -> String {
    if aliases.is_empty() {
        return "No aliases configured.\n".to_string();
    }
    let mut builder = Builder::default();
    builder.push_record(["Alias", "Address"]);
    for (name, address) in aliases.iter() {
        let name = if opts.no_color {
            name.to_string()
        } else {
            format!("{}", name.cyan())
        };
        builder.push_record([name, address.to_string()]);
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    format!("{}\n", table)
}

//! Device operations: connect to each target, run the operations, report.

use std::time::Duration;

use anyhow::{Result, bail};
use eqiva_core::{
    BleConnector, ConnectionConfig, Controller, Operation, ScanOptions, SessionConfig,
    ThermostatOptions,
};
use tracing::debug;

use crate::cli::OutputStyle;
use crate::config::Config;
use crate::format::{
    FormatOptions, format_commands_text, format_reports_json, format_reports_text,
};

/// Slack on top of the link timeout for service discovery and subscribing.
const SUBSCRIBE_SLACK: Duration = Duration::from_secs(10);

/// Connector and session settings from config and flags.
pub fn build_controller(config: &Config, timeout: Option<u64>) -> Controller<BleConnector> {
    let mut connection = ConnectionConfig::default();
    let mut session = SessionConfig::default();
    let mut scan = ScanOptions::new();

    if let Some(secs) = timeout.or(config.timeout) {
        let link = Duration::from_secs(secs);
        connection = connection.connection_timeout(link);
        session = session.connect_timeout(link + SUBSCRIBE_SLACK);
        scan = scan.duration(link);
    }
    if let Some(reply) = config.response_timeout() {
        session = session.response_timeout(reply);
    }
    debug!(?connection, ?session, "Controller settings");

    Controller::new(
        BleConnector::new(connection, scan),
        config.aliases.clone(),
        ThermostatOptions::default().session(session),
    )
}

pub async fn cmd_control(
    targets: &[String],
    operations: &[Operation],
    config: &Config,
    timeout: Option<u64>,
    styles: &[OutputStyle],
    opts: &FormatOptions,
) -> Result<()> {
    let controller = build_controller(config, timeout);
    let reports = controller.run(targets, operations).await;

    let done: Vec<_> = reports.iter().filter_map(|(_, r)| r.as_ref().ok()).collect();
    for style in styles {
        match style {
            OutputStyle::Json => print!("{}", format_reports_json(&reports, opts)?),
            OutputStyle::Text => print!("{}", format_reports_text(&done, opts)),
            OutputStyle::Commands => print!("{}", format_commands_text(&done)),
        }
    }

    let failed: Vec<_> = reports
        .iter()
        .filter_map(|(target, r)| r.as_ref().err().map(|e| (target, e)))
        .collect();
    for (target, e) in &failed {
        eprintln!("{}: {}", target, e);
    }
    if !failed.is_empty() {
        bail!("{} of {} device(s) failed", failed.len(), reports.len());
    }
    Ok(())
}

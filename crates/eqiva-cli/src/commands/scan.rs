//! Scan command implementation.

use anyhow::{Context, Result};
use eqiva_core::{ScanOptions, scan};

use crate::config::Config;
use crate::format::{FormatOptions, format_scan_json, format_scan_text};

pub async fn cmd_scan(secs: u64, json: bool, opts: &FormatOptions, config: &Config) -> Result<()> {
    if !json {
        eprintln!("Scanning for {} seconds...", secs);
    }

    let options = ScanOptions::new().duration_secs(secs);
    let devices = scan::scan_for_thermostats(options)
        .await
        .context("Failed to scan for devices")?;

    let content = if json {
        format_scan_json(&devices, &config.aliases, opts)?
    } else {
        format_scan_text(&devices, &config.aliases, opts)
    };
    print!("{}", content);
    Ok(())
}

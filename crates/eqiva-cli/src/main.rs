use std::io::IsTerminal;

use anyhow::{Result, bail};
use clap::{CommandFactory, FromArgMatches};
use eqiva_core::Operation;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;

use cli::Cli;
use commands::{AliasAction, cmd_alias, cmd_control, cmd_scan};
use config::Config;
use format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    let filter = match cli.log_filter() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::path);
    let mut config = Config::load_from(&config_path);
    let no_color = std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal();
    let opts = FormatOptions::new(no_color, cli.resolve_fahrenheit(config.fahrenheit));

    // Parse operations before touching the radio so bad values fail fast.
    let operations = cli.operations(&matches)?;

    let mut handled = false;
    let mut alias_actions = Vec::new();
    if let Some([name, address]) = cli.alias_set.as_deref() {
        alias_actions.push(AliasAction::Set {
            name: name.clone(),
            address: address.clone(),
        });
    }
    if let Some(name) = &cli.alias_remove {
        alias_actions.push(AliasAction::Remove { name: name.clone() });
    }
    if cli.aliases {
        alias_actions.push(AliasAction::List);
    }
    for action in alias_actions {
        cmd_alias(action, &mut config, &config_path, &opts, cli.json, cli.quiet)?;
        handled = true;
    }

    if let Some(secs) = cli.scan {
        cmd_scan(secs, cli.json, &opts, &config).await?;
        handled = true;
    }

    let targets: Vec<String> = if cli.devices.is_empty() {
        config.device.iter().cloned().collect()
    } else {
        cli.devices.clone()
    };

    if targets.is_empty() {
        if !operations.is_empty() {
            bail!("No device given and no default device configured");
        }
        if !handled {
            Cli::command().print_help()?;
        }
        return Ok(());
    }
    if handled && cli.devices.is_empty() && operations.is_empty() {
        return Ok(());
    }

    let operations = if operations.is_empty() {
        vec![Operation::Status]
    } else {
        operations
    };
    let styles = cli.output_styles(&matches);
    cmd_control(&targets, &operations, &config, cli.timeout, &styles, &opts).await
}

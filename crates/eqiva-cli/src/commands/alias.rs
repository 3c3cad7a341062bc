//! Alias command implementation.
//!
//! Manages friendly device names (aliases) that map to device addresses.

use std::path::Path;

use anyhow::{Result, bail};
use eqiva_core::looks_like_address;

use crate::config::Config;
use crate::format::{FormatOptions, format_aliases_text};

/// Alias actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasAction {
    /// List all aliases
    List,
    /// Set an alias
    Set { name: String, address: String },
    /// Remove an alias
    Remove { name: String },
}

pub fn cmd_alias(
    action: AliasAction,
    config: &mut Config,
    path: &Path,
    opts: &FormatOptions,
    json: bool,
    quiet: bool,
) -> Result<()> {
    match action {
        AliasAction::List => {
            if json {
                print!("{}", opts.as_json(&config.aliases)?);
            } else if !config.aliases.is_empty() {
                print!("{}", format_aliases_text(&config.aliases, opts));
            } else if !quiet {
                print!("{}", format_aliases_text(&config.aliases, opts));
                println!();
                println!("Add an alias with: eqiva --alias-set <name> <address>");
            }
        }
        AliasAction::Set { name, address } => {
            if looks_like_address(&name) {
                bail!(
                    "Alias name '{}' looks like a device address. \
                     Use a friendly name instead (e.g., 'living-room', 'office').",
                    name
                );
            }
            if !looks_like_address(&address) {
                bail!("'{}' is not a device address", address);
            }

            let previous = config.aliases.insert(name.clone(), address.clone());
            config.save_to(path)?;

            if !quiet {
                if previous.is_some() {
                    println!("Updated alias '{}' → {}", name, address);
                } else {
                    println!("Added alias '{}' → {}", name, address);
                }
            }
        }
        AliasAction::Remove { name } => {
            if config.aliases.remove(&name).is_some() {
                config.save_to(path)?;
                if !quiet {
                    println!("Removed alias '{}'", name);
                }
            } else {
                bail!("Alias '{}' not found", name);
            }
        }
    }

    Ok(())
}

//! Command implementations for the CLI.

mod alias;
mod control;
mod scan;

pub use alias::{AliasAction, cmd_alias};
pub use control::cmd_control;
pub use scan::cmd_scan;

//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::OutputFormat;
use crate::domain::{ConfigureReason, DataType, TypeSet};

/// syncctl - drive the data type configuration manager against simulated
/// collaborators.
///
/// Example: syncctl simulate --types bookmarks,preferences --priority preferences
#[derive(Parser, Debug)]
#[command(name = "syncctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (defaults to ~/.sync-configurator/config.toml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one configure call against the simulated sync engine.
    Simulate {
        /// Desired data types, comma separated (e.g. bookmarks,preferences).
        #[arg(short, long, value_delimiter = ',', default_value = "bookmarks,preferences,passwords")]
        types: Vec<String>,

        /// Priority types, overriding the configuration file.
        #[arg(short, long, value_delimiter = ',')]
        priority: Vec<String>,

        /// Configure reason.
        #[arg(short, long, default_value = "new_client")]
        reason: String,

        /// Re-enable this type after the first call and report both.
        #[arg(long)]
        reenable: Option<String>,

        /// Output format: table or json.
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// List every data type with its group and role.
    Types,

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write the default configuration file if missing.
    Init,
    /// Print the effective configuration.
    Show,
    /// Print the configuration file path.
    Path,
}

/// Parse a comma-separated list of type names.
///
/// # Errors
/// Returns the first name that is not a data type.
pub fn parse_types(names: &[String]) -> Result<TypeSet, String> {
    names
        .iter()
        .map(|name| parse_type(name))
        .collect::<Result<TypeSet, String>>()
}

/// Parse one data type name, case-insensitively.
///
/// # Errors
/// Returns error if the name is not a data type.
pub fn parse_type(name: &str) -> Result<DataType, String> {
    name.parse::<DataType>()
        .map_err(|e| format!("{e}. See `syncctl types`"))
}

/// Parse a configure reason such as `new_client` or `backup-rollback`.
///
/// # Errors
/// Returns error if the name is not a configure reason.
pub fn parse_reason(name: &str) -> Result<ConfigureReason, String> {
    name.parse()
}

/// Parse the output format argument.
///
/// # Errors
/// Returns error if the format is not supported.
pub fn parse_format(format: &str) -> Result<OutputFormat, String> {
    format.parse()
}

//! CLI argument definitions for the Spellbee application.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use spellbee_core::config::SpellbeeConfig;

/// Spellbee - weekly spelling practice: week windows, scoring, practice
/// tracking and audio housekeeping.
#[derive(Parser, Debug)]
#[command(name = "spellbee", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the database and stored audio.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Print results as JSON where available.
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Show the spelling week containing a moment (default: now).
    Week {
        /// RFC 3339 timestamp, e.g. 2025-03-06T11:59:00Z.
        #[arg(long = "at")]
        at: Option<String>,
    },
    /// Normalise a comma or newline separated word list.
    Words { text: String },
    /// Evaluate a score out of a total.
    Score { score: u32, total: u32 },
    /// Show the configured groups, or replace them.
    Groups {
        /// Comma separated group names.
        #[arg(long = "set")]
        set: Option<String>,
    },
    /// Manage the known children.
    Children {
        #[command(subcommand)]
        action: ChildrenAction,
    },
    /// Summarise this week's spelling list for a group.
    List { group: String },
    /// Show this week's practice tracker for a group.
    Practice { group: String },
    /// Log one practice attempt for this week.
    Record {
        group: String,
        child: String,
        score: u32,
        total: u32,
    },
    /// Delete stored audio from previous weeks.
    Cleanup,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ChildrenAction {
    List,
    Add { name: String },
    Remove { name: String },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SPELLBEE_CONFIG env var > ~/.spellbee/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SPELLBEE_CONFIG") {
            return PathBuf::from(p);
        }
        SpellbeeConfig::default_path()
    }

    /// Resolve the data directory path.
    ///
    /// Returns `None` if not overridden (use config value).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log level: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

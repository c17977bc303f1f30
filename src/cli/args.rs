//! Command-line argument parsing for failsight
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// failsight - learn from service failures, predict the next ones
#[derive(Parser, Debug)]
#[command(name = "failsight")]
#[command(version)]
#[command(about = "Adaptive failure learning and prediction engine", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Store file, overrides the configured path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run all background loops until Ctrl-C
    Run,

    /// Show learned patterns ranked by occurrence count
    Patterns {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show recent failure events
    Events {
        /// Only events newer than this many seconds
        #[arg(long, default_value_t = 3600)]
        since_secs: u64,
    },

    /// Show recent failure predictions
    Predictions {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show recent pattern evolution forecasts
    Evolutions {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Mark elapsed predictions as correct or incorrect
    Reconcile,

    /// Report the outcome of a manual recovery for a stored event
    Report {
        /// Event id
        id: i64,

        /// Remedy that was applied
        #[arg(long)]
        attempt: String,

        /// The remedy worked
        #[arg(long, conflicts_with = "failed")]
        success: bool,

        /// The remedy did not work
        #[arg(long)]
        failed: bool,

        /// Seconds the remedy took
        #[arg(long, default_value_t = 0.0)]
        duration: f64,
    },

    /// Historical recovery success rate for a service and error type
    SuccessRate { service: String, error_type: String },

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Check flag combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if let Commands::Report { success, failed, duration, .. } = &self.command {
            if !success && !failed {
                return Err("Report requires --success or --failed.".to_string());
            }
            if *duration < 0.0 {
                return Err("Duration cannot be negative.".to_string());
            }
        }
        Ok(())
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Log level overriding the configured one, `None` keeps the config
    pub fn log_level(&self) -> Option<&'static str> {
        match self {
            Verbosity::Quiet => Some("error"),
            Verbosity::Normal => None,
            Verbosity::Verbose => Some("debug"),
            Verbosity::VeryVerbose => Some("trace"),
        }
    }
}

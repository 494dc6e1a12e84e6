//! Command-line surface for `pagewarm`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pagewarm_core::config::LogFormat;

#[derive(Parser, Debug)]
#[command(name = "pagewarm", version, about = "Full-page cache maintenance and warm-up", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "PAGEWARM_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Log output format (overrides the configured one)
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Remove every cached variant of one URL
    Delete {
        url: String,
    },
    /// Remove the whole cache and schedule a warm-up
    Flush {
        /// Also forget the size aggregate and skip the warm-up
        #[arg(long)]
        full: bool,
    },
    /// Print the cache size in bytes
    Size {
        /// Use IEC units (KiB, MiB, ...)
        #[arg(long, short = 'H')]
        human_readable: bool,
        /// Walk the tree instead of trusting the tracked aggregate
        #[arg(long)]
        precise: bool,
    },
    /// List cached URLs with size and modification time
    Inspect {
        #[arg(long, short = 'H')]
        human_readable: bool,
        /// Print JSON instead of tab-separated lines
        #[arg(long, conflicts_with = "human_readable")]
        json: bool,
    },
    /// Run the warm-up crawler now
    Warm {
        /// Stop after this many seconds (unlimited when omitted)
        #[arg(long)]
        budget_secs: Option<u64>,
    },
    /// Run the warm-up crawler if it is due, within one tick interval
    Tick,
    /// Call `tick` every tick interval until interrupted
    Daemon,
    /// Show crawler state and queue progress
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Json,
    Compact,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Compact => LogFormat::Compact,
        }
    }
}

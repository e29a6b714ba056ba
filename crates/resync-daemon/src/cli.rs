//! CLI argument parsing for the resync daemon.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Index/database resync
///
/// Repairs divergence between the search index and the system of record.
#[derive(Parser, Debug)]
#[command(name = "resync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/index-resync/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override system-of-record database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    /// Override search index path
    #[arg(long, global = true)]
    pub index_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one reconciliation to completion and print the report
    Run {
        /// Decide and count, but do not modify the index
        #[arg(long)]
        dry_run: bool,

        /// Entries per page
        #[arg(long)]
        batch_size: Option<usize>,

        /// Grace period for provisional entries, in milliseconds
        #[arg(long)]
        time_until_reindex_ms: Option<i64>,

        /// Entries processed in parallel within a page
        #[arg(long)]
        concurrency: Option<usize>,

        /// Skip the pass that purges confirmed entries without a record
        #[arg(long)]
        skip_confirmed_orphans: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the reconciliation on the configured cron schedule
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Show index and system-of-record counts
    Status,

    /// Print the effective configuration as TOML
    ShowConfig,
}

/// Reconcile overrides collected from `resync run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    pub dry_run: bool,
    pub batch_size: Option<usize>,
    pub time_until_reindex_ms: Option<i64>,
    pub concurrency: Option<usize>,
    pub skip_confirmed_orphans: bool,
}

//! Index/database resync
//!
//! Repairs divergence between the search index and the system of record.
//!
//! # Usage
//!
//! ```bash
//! resync run [--dry-run] [--batch-size N] [--time-until-reindex-ms MS] [--json]
//! resync start [--foreground]
//! resync status
//! resync show-config
//! ```
//!
//! `run` exits 0 on success, 2 when some entries errored, 1 on a hard
//! failure and 3 when another run holds the lease.
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/index-resync/config.toml)
//! 3. `--config` file
//! 4. Environment variables (RESYNC_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use resync_daemon::{
    run_once, show_config, show_status, start_daemon, Cli, Commands, GlobalOverrides,
    RunOverrides,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let globals = GlobalOverrides {
        config_path: cli.config,
        log_level: cli.log_level,
        db_path: cli.db_path,
        index_path: cli.index_path,
    };

    match cli.command {
        Commands::Run {
            dry_run,
            batch_size,
            time_until_reindex_ms,
            concurrency,
            skip_confirmed_orphans,
            json,
        } => {
            let overrides = RunOverrides {
                dry_run,
                batch_size,
                time_until_reindex_ms,
                concurrency,
                skip_confirmed_orphans,
            };
            let code = run_once(&globals, &overrides, json).await?;
            std::process::exit(code);
        }
        Commands::Start { foreground } => {
            start_daemon(&globals, foreground).await?;
        }
        Commands::Status => {
            show_status(&globals)?;
        }
        Commands::ShowConfig => {
            show_config(&globals)?;
        }
    }

    Ok(())
}

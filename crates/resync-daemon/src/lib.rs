//! Resync daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, start, status, show-config)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, RunOverrides};
pub use commands::{
    exit_code, format_report, run_once, show_config, show_status, start_daemon, GlobalOverrides,
    ResyncStack, EXIT_ALREADY_RUNNING, EXIT_HARD_FAILURE, EXIT_PARTIAL_FAILURE, EXIT_SUCCESS,
};

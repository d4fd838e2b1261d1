//! Command-line interface for mailmover.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};

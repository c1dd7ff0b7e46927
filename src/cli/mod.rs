//! Command-line interface for viewforge.
//!
//! Provides the full pipeline command plus one command per stage so each
//! step can be run and re-run individually.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};

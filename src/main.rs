//! Curfew: a self-imposed access lock daemon for a local command-line tool.
//!
//! This is the main entry point for the `curfew` binary. It parses
//! arguments, dispatches to the appropriate command handler, and maps
//! errors to exit codes.

mod challenge;
mod cli;
mod clock;
mod collaborators;
mod commands;
pub mod config;
pub mod context;
mod engine;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fs;
mod protocol;
mod record;
mod schedule;
mod server;
mod timer;

#[cfg(test)]
mod test_support;

use cli::Cli;
use error::CurfewError;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match commands::dispatch(cli.command) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            eprintln!("Error: {:#}", err);

            let code = err
                .downcast_ref::<CurfewError>()
                .map_or(exit_codes::DAEMON_FAILURE, CurfewError::exit_code);
            ExitCode::from(code as u8)
        }
    }
}

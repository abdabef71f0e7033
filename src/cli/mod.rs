//! CLI argument parsing for curfew.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Curfew: a self-imposed access lock for a local command-line tool.
///
/// The daemon owns the lock state and answers newline-delimited JSON
/// requests on a local socket (a named pipe on Windows).
#[derive(Parser, Debug)]
#[command(name = "curfew")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for curfew.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the lock daemon in the foreground.
    ///
    /// Recovers the persisted lock, serves IPC requests, fires lock timers
    /// and evaluates schedules until SIGINT or SIGTERM.
    Daemon(DaemonArgs),

    /// Send one raw JSON request to the running daemon and print the reply.
    Send(SendArgs),
}

/// Arguments for the `daemon` command.
#[derive(Parser, Debug)]
pub struct DaemonArgs {
    /// Daemon home directory (defaults to $CURFEW_HOME, then ~/.curfew).
    #[arg(long)]
    pub home: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Append logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Arguments for the `send` command.
#[derive(Parser, Debug)]
pub struct SendArgs {
    /// Request line, e.g. '{"type":"status"}'.
    pub request: String,

    /// Daemon home directory used to locate the socket.
    #[arg(long)]
    pub home: Option<PathBuf>,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_daemon_defaults() {
        let cli = Cli::try_parse_from(["curfew", "daemon"]).unwrap();
        if let Command::Daemon(args) = cli.command {
            assert!(args.home.is_none());
            assert_eq!(args.log_level, "info");
            assert!(args.log_file.is_none());
        } else {
            panic!("Expected Daemon command");
        }
    }

    #[test]
    fn parse_daemon_full() {
        let cli = Cli::try_parse_from([
            "curfew",
            "daemon",
            "--home",
            "/tmp/curfew",
            "--log-level",
            "debug",
            "--log-file",
            "/tmp/curfew.log",
        ])
        .unwrap();
        if let Command::Daemon(args) = cli.command {
            assert_eq!(args.home, Some(PathBuf::from("/tmp/curfew")));
            assert_eq!(args.log_level, "debug");
            assert_eq!(args.log_file, Some(PathBuf::from("/tmp/curfew.log")));
        } else {
            panic!("Expected Daemon command");
        }
    }

    #[test]
    fn parse_send() {
        let cli = Cli::try_parse_from(["curfew", "send", r#"{"type":"status"}"#]).unwrap();
        if let Command::Send(args) = cli.command {
            assert_eq!(args.request, r#"{"type":"status"}"#);
            assert!(args.home.is_none());
        } else {
            panic!("Expected Send command");
        }
    }

    #[test]
    fn send_requires_a_request() {
        assert!(Cli::try_parse_from(["curfew", "send"]).is_err());
    }
}

//! Command implementations for curfew.
//!
//! `daemon` runs the lock daemon in the foreground; `send` is a one-shot
//! client that forwards a raw request line to a running daemon.

mod daemon;
mod send;

use crate::cli::Command;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Daemon(args) => daemon::cmd_daemon(args),
        Command::Send(args) => send::cmd_send(args),
    }
}

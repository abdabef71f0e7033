//! Filesystem utilities for curfew.
//!
//! Every durable file the daemon owns (lock record, config, schedules,
//! enforcement marker) is replaced atomically so a crash mid-write never
//! leaves a truncated record behind.

pub mod atomic;

pub use atomic::atomic_write;
pub use atomic::atomic_write_file;

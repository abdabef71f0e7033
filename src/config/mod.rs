//! Configuration model for curfew.
//!
//! This module defines the Config struct that represents `<home>/config.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! documented defaults for every field, validation, and single-key updates
//! for the `config-set` request.

mod model;
mod operations;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use model::Config;
pub use types::EnforcementMode;

//! Config loading, validation, persistence, and single-key updates.

use super::model::Config;
use super::types::REDACTED;
use crate::error::{CurfewError, Result};
use crate::fs::atomic_write_file;
use serde_json::Value;
use std::path::Path;

impl Config {
    /// Load config from a YAML file.
    ///
    /// A missing file yields the defaults; a file that exists but fails to
    /// parse or validate is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CurfewError::InvalidRequest(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    ///
    /// Unknown fields are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml).map_err(|e| {
            CurfewError::InvalidRequest(format!("failed to parse config YAML: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            CurfewError::InvalidRequest(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Atomically write the config to disk.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        atomic_write_file(path, &self.to_yaml()?)
    }

    /// Validate config values.
    ///
    /// Validation rules:
    /// - `grace_minutes`, `schedule_tick_seconds`, `justification_min_words` must be positive
    /// - `weekend_days` entries must be within 0..=6
    /// - `bypass_cooldowns` must not be empty
    /// - an enabled payment bypass needs a `payment_bypass_url`
    pub fn validate(&self) -> Result<()> {
        if self.grace_minutes == 0 {
            return Err(invalid("grace_minutes must be greater than 0"));
        }

        if self.schedule_tick_seconds == 0 {
            return Err(invalid("schedule_tick_seconds must be greater than 0"));
        }

        if self.justification_min_words == 0 {
            return Err(invalid("justification_min_words must be greater than 0"));
        }

        if let Some(day) = self.weekend_days.iter().find(|d| **d > 6) {
            return Err(CurfewError::InvalidRequest(format!(
                "config validation failed: weekend_days entries must be 0 (Sun) to 6 (Sat), found {}",
                day
            )));
        }

        if self.bypass_cooldowns.is_empty() {
            return Err(invalid("bypass_cooldowns must have at least one entry"));
        }

        if self.payment_bypass_enabled && self.payment_bypass_url.trim().is_empty() {
            return Err(invalid(
                "payment_bypass_url is required when payment_bypass_enabled is true",
            ));
        }

        Ok(())
    }

    /// Return a copy of this config with one top-level key replaced.
    ///
    /// The key must already exist in the config; the value must deserialize
    /// into the field's type and the result must validate.
    pub fn with_key(&self, key: &str, value: Value) -> Result<Self> {
        let current = serde_json::to_value(self).map_err(|e| {
            CurfewError::InvalidRequest(format!("failed to serialize config: {}", e))
        })?;

        let Value::Object(mut fields) = current else {
            return Err(CurfewError::InvalidRequest(
                "config did not serialize to an object".to_string(),
            ));
        };

        if !fields.contains_key(key) {
            return Err(CurfewError::InvalidRequest(format!(
                "unknown config key '{}'",
                key
            )));
        }
        fields.insert(key.to_string(), value);

        let updated: Config = serde_json::from_value(Value::Object(fields)).map_err(|e| {
            CurfewError::InvalidRequest(format!("invalid value for '{}': {}", key, e))
        })?;

        updated.validate()?;
        Ok(updated)
    }

    /// Copy of the config safe to send to clients.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.payment_bypass_stripe_key.is_some() {
            copy.payment_bypass_stripe_key = Some(REDACTED.to_string());
        }
        copy
    }
}

fn invalid(message: &str) -> CurfewError {
    CurfewError::InvalidRequest(format!("config validation failed: {}", message))
}

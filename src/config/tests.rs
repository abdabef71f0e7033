//! Tests for config functionality.

use crate::config::types::REDACTED;
use crate::config::{Config, EnforcementMode};
use crate::error::CurfewError;
use serde_json::json;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.grace_minutes, 5);
    assert!(config.challenge_bypass_enabled);
    assert_eq!(config.bypass_cooldowns, vec![60, 120, 180, 300, 600]);
    assert_eq!(config.justification_min_words, 50);
    assert!(!config.payment_bypass_enabled);
    assert_eq!(config.payment_bypass_amount, 500);
    assert_eq!(config.payment_bypass_currency, "USD");
    assert!(config.payment_bypass_stripe_key.is_none());
    assert_eq!(config.weekend_days, vec![0, 6]);
    assert_eq!(config.schedule_tick_seconds, 30);
    assert_eq!(config.schedule_warning_minutes, 5);
    assert_eq!(config.enforcement, EnforcementMode::Marker);
    assert!(config.notify_command.is_none());
    assert!(config.socket_path.is_none());
}

#[test]
fn test_parse_empty_yaml_uses_defaults() {
    let config = Config::from_yaml("").unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_parse_partial_yaml() {
    let yaml = r#"
grace_minutes: 15
weekend_days: [5, 6]
enforcement: none
"#;
    let config = Config::from_yaml(yaml).unwrap();

    assert_eq!(config.grace_minutes, 15);
    assert_eq!(config.weekend_days, vec![5, 6]);
    assert_eq!(config.enforcement, EnforcementMode::Off);
    // Unspecified values keep their defaults
    assert_eq!(config.schedule_tick_seconds, 30);
    assert!(config.challenge_bypass_enabled);
}

#[test]
fn test_unknown_fields_are_ignored() {
    let yaml = r#"
grace_minutes: 7
installation_type: standalone
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.grace_minutes, 7);
}

#[test]
fn test_validation_rejects_zero_grace() {
    let err = Config::from_yaml("grace_minutes: 0").unwrap_err();
    assert!(err.to_string().contains("grace_minutes"));
}

#[test]
fn test_validation_rejects_out_of_range_weekend_day() {
    let err = Config::from_yaml("weekend_days: [0, 7]").unwrap_err();
    assert!(err.to_string().contains("weekend_days"));
}

#[test]
fn test_validation_rejects_empty_cooldown_table() {
    let err = Config::from_yaml("bypass_cooldowns: []").unwrap_err();
    assert!(err.to_string().contains("bypass_cooldowns"));
}

#[test]
fn test_validation_requires_payment_url() {
    let err = Config::from_yaml("payment_bypass_enabled: true").unwrap_err();
    assert!(err.to_string().contains("payment_bypass_url"));

    let config = Config::from_yaml(
        "payment_bypass_enabled: true\npayment_bypass_url: https://pay.example/curfew",
    )
    .unwrap();
    assert!(config.payment_bypass_enabled);
}

#[test]
fn test_load_missing_file_is_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load(temp_dir.path().join("config.yaml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.yaml");

    let config = Config {
        grace_minutes: 10,
        notify_command: Some("notify-send {title} {body}".to_string()),
        ..Config::default()
    };
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_with_key_updates_single_field() {
    let config = Config::default();
    let updated = config.with_key("grace_minutes", json!(12)).unwrap();

    assert_eq!(updated.grace_minutes, 12);
    assert_eq!(updated.weekend_days, config.weekend_days);
}

#[test]
fn test_with_key_can_clear_optional_field() {
    let config = Config {
        payment_bypass_stripe_key: Some("sk_test_123".to_string()),
        ..Config::default()
    };
    let updated = config
        .with_key("payment_bypass_stripe_key", json!(null))
        .unwrap();
    assert!(updated.payment_bypass_stripe_key.is_none());
}

#[test]
fn test_with_key_rejects_unknown_key() {
    let err = Config::default()
        .with_key("chmod_guard", json!(true))
        .unwrap_err();
    assert!(matches!(err, CurfewError::InvalidRequest(_)));
    assert!(err.to_string().contains("unknown config key"));
}

#[test]
fn test_with_key_rejects_wrong_type() {
    let err = Config::default()
        .with_key("grace_minutes", json!("soon"))
        .unwrap_err();
    assert!(err.to_string().contains("invalid value for 'grace_minutes'"));
}

#[test]
fn test_with_key_revalidates() {
    let err = Config::default()
        .with_key("weekend_days", json!([9]))
        .unwrap_err();
    assert!(err.to_string().contains("weekend_days"));
}

#[test]
fn test_redacted_hides_stripe_key() {
    let config = Config {
        payment_bypass_stripe_key: Some("sk_live_secret".to_string()),
        ..Config::default()
    };

    let redacted = config.redacted();

    assert_eq!(redacted.payment_bypass_stripe_key.as_deref(), Some(REDACTED));
    assert!(Config::default().redacted().payment_bypass_stripe_key.is_none());
}

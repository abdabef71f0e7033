//! Tests for the lock record and its store.

use super::*;
use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

fn locked_record() -> LockRecord {
    let locked_at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    LockRecord {
        status: LockStatus::Locked,
        locked_at: Some(locked_at),
        expires_at: Some(locked_at + Duration::minutes(30)),
        bypass_attempts: 2,
        grace_expires_at: None,
        source_id: Some("sched-1".to_string()),
        hard_lock: false,
        pending_handoff_keys: vec!["session-a".to_string()],
    }
}

#[test]
fn test_default_record_is_unlocked() {
    let record = LockRecord::default();
    assert_eq!(record.status, LockStatus::Unlocked);
    assert!(record.locked_at.is_none());
    assert!(record.expires_at.is_none());
    assert_eq!(record.bypass_attempts, 0);
    assert!(record.bypassable());
}

#[test]
fn test_record_serializes_camel_case() {
    let json = serde_json::to_value(locked_record()).unwrap();

    assert_eq!(json["status"], "locked");
    assert_eq!(json["bypassAttempts"], 2);
    assert_eq!(json["sourceId"], "sched-1");
    assert_eq!(json["hardLock"], false);
    assert!(json["graceExpiresAt"].is_null());
    assert_eq!(json["pendingHandoffKeys"][0], "session-a");
    assert!(json["expiresAt"].as_str().unwrap().starts_with("2024-01-01T09:30:00"));
}

#[test]
fn test_record_tolerates_missing_fields() {
    // Records written before hard locks or handoff keys existed.
    let record: LockRecord = serde_json::from_str(
        r#"{"status":"grace","lockedAt":null,"expiresAt":null,"bypassAttempts":1,"graceExpiresAt":null}"#,
    )
    .unwrap();
    assert_eq!(record.status, LockStatus::Grace);
    assert!(!record.hard_lock);
    assert!(record.pending_handoff_keys.is_empty());
}

#[test]
fn test_remaining_only_while_lock_period_runs() {
    let record = locked_record();
    let now = record.locked_at.unwrap() + Duration::minutes(10);

    assert_eq!(record.remaining(now), Some(Duration::minutes(20)));
    assert_eq!(record.remaining(now + Duration::hours(1)), None);
    assert_eq!(LockRecord::default().remaining(now), None);
}

#[test]
fn test_merge_handoff_keys_dedupes() {
    let mut record = locked_record();
    record.merge_handoff_keys(vec!["session-a".to_string(), "session-b".to_string()]);
    assert_eq!(record.pending_handoff_keys, vec!["session-a", "session-b"]);
}

#[test]
fn test_unlocked_with_keys_resets_everything_else() {
    let record = LockRecord::unlocked_with_keys(vec!["session-a".to_string()]);
    assert_eq!(record.status, LockStatus::Unlocked);
    assert!(record.expires_at.is_none());
    assert_eq!(record.pending_handoff_keys, vec!["session-a"]);
}

#[test]
fn test_store_load_missing_is_none() {
    let temp_dir = TempDir::new().unwrap();
    let store = StateStore::new(temp_dir.path().join("state.json"));
    assert!(store.load().unwrap().is_none());
}

#[test]
fn test_store_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let store = StateStore::new(temp_dir.path().join("state.json"));

    store.save(&locked_record()).unwrap();

    assert_eq!(store.load().unwrap(), Some(locked_record()));
}

#[test]
fn test_store_reports_corrupt_record() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");
    std::fs::write(&path, "{not json").unwrap();

    let err = StateStore::new(&path).load().unwrap_err();
    assert!(err.to_string().contains("failed to parse lock record"));
}

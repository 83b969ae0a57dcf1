//! On-disk checkpoint format and the watchdog reading it back.

use std::fs;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use picsync_core::{
    load_lenient, timefmt, CheckpointStore, JsonFileStore, ServerCheckpoint, SyncCheckpoint,
    Watchdog,
};
use rstest::rstest;
use tempfile::TempDir;

#[test]
fn server_checkpoint_file_has_a_single_timestamp_field() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("server_progress.json");
    let store = JsonFileStore::<ServerCheckpoint>::new(&path);

    store
        .save(&ServerCheckpoint {
            last_send_time: timefmt::parse("2025-11-01 08:30:00").unwrap(),
        })
        .expect("save");

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
    assert_eq!(raw, serde_json::json!({"last_send_time": "2025-11-01 08:30:00"}));
    assert!(!dir.path().join("server_progress.json.tmp").exists());
}

#[test]
fn sync_checkpoint_reads_legacy_file_without_download_time() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("sync_progress.json");
    fs::write(
        &path,
        r#"{"last_created_time": "2025-11-01 08:00:00", "last_task_id": "42"}"#,
    )
    .expect("write");

    let record = JsonFileStore::<SyncCheckpoint>::new(&path)
        .load()
        .expect("load")
        .expect("present");
    assert_eq!(record.last_task_id.as_deref(), Some("42"));
    assert_eq!(record.last_download_time, None);
    assert_eq!(record.cursor().unwrap().to_string(), "(2025-11-01 08:00:00, 42)");
}

#[test]
fn sync_checkpoint_with_nulls_has_no_cursor() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("sync_progress.json");
    fs::write(&path, r#"{"last_created_time": null, "last_task_id": null}"#).expect("write");

    let record = JsonFileStore::<SyncCheckpoint>::new(&path)
        .load()
        .expect("load")
        .expect("present");
    assert_eq!(record.cursor(), None);
}

#[test]
fn corrupt_file_is_an_error_but_lenient_load_starts_fresh() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("server_progress.json");
    fs::write(&path, "{\"last_send_time\": 17").expect("write");

    let store = JsonFileStore::<ServerCheckpoint>::new(&path);
    assert!(store.load().is_err());
    assert_eq!(load_lenient(&store), None);
}

#[rstest]
#[case::just_past_threshold(25, true)]
#[case::just_inside_threshold(23, false)]
fn watchdog_reads_persisted_send_time(#[case] hours_ago: i64, #[case] trips: bool) {
    let dir = TempDir::new().expect("tempdir");
    let store = JsonFileStore::<ServerCheckpoint>::new(dir.path().join("server_progress.json"));
    let now = timefmt::now();
    store
        .save(&ServerCheckpoint {
            last_send_time: now - ChronoDuration::hours(hours_ago),
        })
        .expect("save");

    let watchdog = Watchdog::started_at(
        "daemon",
        Duration::from_secs(24 * 3600),
        now - ChronoDuration::days(7),
    );
    assert_eq!(watchdog.check(&store).is_some(), trips);
}

#[test]
fn watchdog_ignores_missing_checkpoint() {
    let dir = TempDir::new().expect("tempdir");
    let store = JsonFileStore::<SyncCheckpoint>::new(dir.path().join("sync_progress.json"));
    let watchdog = Watchdog::started_at(
        "poller",
        Duration::from_secs(3600),
        timefmt::now() - ChronoDuration::days(30),
    );
    assert!(watchdog.check(&store).is_none());
}

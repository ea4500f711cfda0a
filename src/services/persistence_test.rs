use super::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use time::macros::datetime;

use crate::config::Config;
use crate::services::palette::Palette;
use crate::state::test_helpers::{self, temp_dir};

fn store() -> GridStore {
    GridStore::new(5, 5, Arc::new(Palette::default()))
}

async fn paint(grid: &GridStore, x: i64, y: i64, color: &str) {
    grid.set(grid.validate(x, y, color).unwrap()).await;
}

// =============================================================================
// file naming
// =============================================================================

#[test]
fn file_name_embeds_sortable_utc_timestamp() {
    let name = snapshot_file_name(datetime!(2024-03-05 07:08:09.123 UTC)).unwrap();
    assert_eq!(name, "grid_state_2024-03-05_07-08-09-123.json");
}

#[test]
fn file_name_is_normalized_to_utc() {
    let name = snapshot_file_name(datetime!(2024-03-05 09:08:09 +02:00)).unwrap();
    assert_eq!(name, "grid_state_2024-03-05_07-08-09-000.json");
}

#[test]
fn later_timestamps_sort_greater() {
    let a = snapshot_file_name(datetime!(2024-12-31 23:59:59.999 UTC)).unwrap();
    let b = snapshot_file_name(datetime!(2025-01-01 00:00:00 UTC)).unwrap();
    assert!(b > a);
}

// =============================================================================
// save / load
// =============================================================================

#[tokio::test]
async fn snapshot_round_trip_restores_cells() {
    let dir = temp_dir("roundtrip");
    let grid = store();
    paint(&grid, 1, 1, "red").await;
    paint(&grid, 2, 2, "blue").await;

    save_snapshot(&grid, &dir, OffsetDateTime::now_utc()).await.unwrap();

    let fresh = store();
    let (_, snapshot) = load_latest(&dir).await.unwrap().expect("snapshot should exist");
    let summary = fresh.replace_all(&snapshot.grid).await;

    assert_eq!(summary, ReplaceSummary { applied: 2, skipped: 0 });
    assert_eq!(fresh.get(1, 1).await, Some("red"));
    assert_eq!(fresh.get(2, 2).await, Some("blue"));
    assert_eq!(fresh.sparse_snapshot().await.len(), 2, "every other cell stays default");

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn saved_file_is_sparse_json_with_rfc3339_timestamp() {
    let dir = temp_dir("format");
    let grid = store();
    paint(&grid, 4, 0, "teal").await;
    let now = datetime!(2024-06-01 12:00:00 UTC);

    let path = save_snapshot(&grid, &dir, now).await.unwrap();

    let raw = tokio::fs::read_to_string(&path).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["grid"], serde_json::json!({"4,0": "teal"}));
    assert_eq!(value["timestamp"], "2024-06-01T12:00:00Z");
    assert!(raw.contains("\n  \"grid\""), "pretty-printed with two-space indent");

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn load_latest_picks_greatest_name() {
    let dir = temp_dir("latest");
    let grid = store();
    paint(&grid, 0, 0, "red").await;
    save_snapshot(&grid, &dir, datetime!(2024-01-01 00:00:00 UTC)).await.unwrap();
    paint(&grid, 0, 0, "green").await;
    save_snapshot(&grid, &dir, datetime!(2024-01-02 00:00:00 UTC)).await.unwrap();

    let (name, snapshot) = load_latest(&dir).await.unwrap().unwrap();
    assert_eq!(name, "grid_state_2024-01-02_00-00-00-000.json");
    assert_eq!(snapshot.grid.get("0,0").map(String::as_str), Some("green"));

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn missing_directory_means_no_snapshot() {
    let dir = temp_dir("missing");
    assert!(load_latest(&dir).await.unwrap().is_none());
    assert!(list_snapshots(&dir).await.unwrap().is_empty());
}

#[tokio::test]
async fn listing_ignores_foreign_files_and_directories() {
    let dir = temp_dir("foreign");
    tokio::fs::create_dir_all(dir.join("grid_state_dir.json")).await.unwrap();
    tokio::fs::write(dir.join("notes.txt"), b"hello").await.unwrap();
    tokio::fs::write(dir.join("grid_state_x.json.bak"), b"{}").await.unwrap();
    tokio::fs::write(dir.join("grid_state_2024-01-01_00-00-00-000.json"), b"{\"grid\":{}}")
        .await
        .unwrap();

    let names = list_snapshots(&dir).await.unwrap();
    assert_eq!(names, vec!["grid_state_2024-01-01_00-00-00-000.json".to_owned()]);

    prune_snapshots(&dir, 1).await.unwrap();
    assert!(tokio::fs::metadata(dir.join("notes.txt")).await.is_ok());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn failed_rename_leaves_no_temp_file() {
    let dir = temp_dir("rename-fail");
    let grid = store();
    let now = datetime!(2024-02-02 02:02:02 UTC);
    // A non-empty directory where the snapshot should land makes the rename fail.
    let blocker = dir.join(snapshot_file_name(now).unwrap());
    tokio::fs::create_dir_all(&blocker).await.unwrap();
    tokio::fs::write(blocker.join("keep"), b"x").await.unwrap();

    assert!(matches!(save_snapshot(&grid, &dir, now).await, Err(PersistenceError::Io(_))));

    let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    assert!(names.iter().all(|n| !n.ends_with(".tmp")), "temp file left behind: {names:?}");

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

// =============================================================================
// retention
// =============================================================================

#[tokio::test]
async fn twenty_five_ticks_keep_newest_twenty() {
    let dir = temp_dir("retention");
    let grid = store();
    let start = datetime!(2024-05-01 10:00:00 UTC);
    let mut written = Vec::new();

    for i in 0..25 {
        let now = start + time::Duration::seconds(i);
        let path = persist_once(&grid, &dir, 20, now).await.unwrap();
        written.push(path.file_name().unwrap().to_string_lossy().into_owned());
    }

    let mut remaining = list_snapshots(&dir).await.unwrap();
    remaining.reverse();
    assert_eq!(remaining.len(), 20);
    assert_eq!(remaining, written[5..].to_vec());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn prune_reports_removed_files() {
    let dir = temp_dir("prune");
    let grid = store();
    for i in 0..3 {
        save_snapshot(&grid, &dir, datetime!(2024-01-01 00:00:00 UTC) + time::Duration::minutes(i))
            .await
            .unwrap();
    }

    let removed = prune_snapshots(&dir, 1).await.unwrap();
    assert_eq!(
        removed,
        vec![
            "grid_state_2024-01-01_00-01-00-000.json".to_owned(),
            "grid_state_2024-01-01_00-00-00-000.json".to_owned(),
        ]
    );

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

// =============================================================================
// restore_latest
// =============================================================================

fn state_with_dir(dir: &Path) -> AppState {
    AppState::new(Config { states_dir: dir.to_path_buf(), ..test_helpers::test_config() })
}

#[tokio::test]
async fn restore_applies_newest_snapshot_through_validation() {
    let dir = temp_dir("restore");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let doc = GridState {
        grid: BTreeMap::from([
            ("1,1".to_owned(), "red".to_owned()),
            ("99,99".to_owned(), "red".to_owned()),
            ("0,0".to_owned(), "magenta".to_owned()),
        ]),
        timestamp: "2024-01-01T00:00:00Z".to_owned(),
    };
    tokio::fs::write(dir.join("grid_state_2024-01-01_00-00-00-000.json"), serde_json::to_vec(&doc).unwrap())
        .await
        .unwrap();
    let state = state_with_dir(&dir);

    let summary = restore_latest(&state).await.unwrap();

    assert_eq!(summary, ReplaceSummary { applied: 1, skipped: 2 });
    assert_eq!(state.grid.get(1, 1).await, Some("red"));
    assert_eq!(state.grid.get(0, 0).await, Some("black"));

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn restore_with_malformed_newest_file_keeps_default_grid() {
    let dir = temp_dir("malformed");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("grid_state_2024-01-01_00-00-00-000.json"), b"{\"grid\":{\"1,1\":\"red\"}}")
        .await
        .unwrap();
    tokio::fs::write(dir.join("grid_state_2024-01-02_00-00-00-000.json"), b"{ not json")
        .await
        .unwrap();
    let state = state_with_dir(&dir);

    assert!(restore_latest(&state).await.is_none());
    assert!(state.grid.sparse_snapshot().await.is_empty());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn restore_without_directory_keeps_default_grid() {
    let state = state_with_dir(&temp_dir("absent"));
    assert!(restore_latest(&state).await.is_none());
    assert!(state.grid.sparse_snapshot().await.is_empty());
}

// =============================================================================
// background task
// =============================================================================

#[tokio::test]
async fn background_task_writes_snapshots() {
    let dir = temp_dir("task");
    let state = AppState::new(Config {
        states_dir: dir.clone(),
        persist_interval: Duration::from_millis(50),
        persist_retention: 2,
        ..test_helpers::test_config()
    });
    paint(&state.grid, 0, 0, "yellow").await;

    let handle = spawn_persistence_task(state.clone());
    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.abort();

    let names = list_snapshots(&dir).await.unwrap();
    assert!(!names.is_empty(), "at least one tick should have saved");
    assert!(names.len() <= 2, "retention applied on every tick");
    let (_, snapshot) = load_latest(&dir).await.unwrap().unwrap();
    assert_eq!(snapshot.grid.get("0,0").map(String::as_str), Some("yellow"));

    let _ = tokio::fs::remove_dir_all(&dir).await;
}

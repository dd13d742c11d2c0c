//! End-to-end run against the on-disk backends used by the CLI.
//!
//! Every test works in its own temporary data directory: SQLite database,
//! object directory and weekly marker file.

use chrono::{Duration, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use taskquest_core::league::WeeklyCheck;
use taskquest_core::store::{ObjectStore, ProfileStore, TaskStore};
use taskquest_core::{
    AchievementId, Collaborators, Config, FileMarkerStore, FixedClock, FsObjectStore,
    Notification, SqliteBackend, SyncLayer, TaskOutcome, WeekMarkerStore,
};
use tempfile::TempDir;

struct Install {
    backend: Arc<SqliteBackend>,
    layer: SyncLayer,
}

fn open(dir: &Path, clock: &Arc<FixedClock>) -> Install {
    let backend = Arc::new(SqliteBackend::open(&dir.join("taskquest.db")).unwrap());
    let objects: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.join("objects")));
    let stores = Collaborators::shared(
        backend.clone(),
        objects,
        Arc::new(FileMarkerStore::at(dir)),
    );
    let layer = SyncLayer::new("local", Config::default(), clock.clone(), stores);
    Install { backend, layer }
}

#[tokio::test]
async fn test_session_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 10, 23, 30, 0).unwrap(),
    ));

    let first = open(temp_dir.path(), &clock);
    first.layer.load().await.unwrap();
    let task = first.layer.add_task("Read a chapter").await.unwrap();
    assert!(!task.is_provisional());

    let outcome = first
        .layer
        .complete_task_with_upload(&task.id, vec![0x89, b'P', b'N', b'G'], "png")
        .await
        .unwrap();
    assert_eq!(outcome, TaskOutcome::Awarded { xp: 50 });

    let proof = first.layer.tasks()[0].proof_url.clone().unwrap();
    let file = proof.strip_prefix("file://").unwrap();
    assert_eq!(std::fs::read(file).unwrap(), vec![0x89, b'P', b'N', b'G']);
    assert!(first.layer.drain_notifications().iter().any(|n| matches!(
        n,
        Notification::AchievementUnlocked {
            id: AchievementId::NightOwl,
            ..
        }
    )));
    drop(first);

    // Next day, fresh process.
    clock.advance(Duration::hours(12));
    let second = open(temp_dir.path(), &clock);
    let profile = second.layer.load().await.unwrap();
    assert_eq!(profile.xp, 50);
    assert_eq!(profile.completed_tasks, 1);
    assert_eq!(profile.night_owl_count, 1);
    assert_eq!(profile.streak, 2);

    let tasks = second.layer.tasks();
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].completed);
    assert_eq!(tasks[0].proof_url.as_deref(), Some(proof.as_str()));

    let stored = second.backend.fetch("local").await.unwrap().unwrap();
    assert_eq!(stored.streak, 2);
    assert_eq!(second.backend.schema_version(), 2);
}

#[tokio::test]
async fn test_weekly_marker_is_written_to_disk() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap(),
    ));

    let install = open(temp_dir.path(), &clock);
    install.layer.load().await.unwrap();
    drop(install);

    let marker = FileMarkerStore::at(temp_dir.path()).load().unwrap().unwrap();
    assert_eq!((marker.year, marker.week), (2025, 11));

    // Next week the transition runs as part of loading.
    clock.advance(Duration::days(6));
    let install = open(temp_dir.path(), &clock);
    let profile = install.layer.load().await.unwrap();
    assert_eq!(profile.finals_won, 1);
    assert!(install.layer.drain_notifications().iter().any(|n| matches!(
        n,
        Notification::LeagueTransition { .. }
    )));
    assert_eq!(
        install.layer.check_weekly_transition().await.unwrap(),
        WeeklyCheck::UpToDate
    );

    let stored = install.backend.fetch("local").await.unwrap().unwrap();
    assert_eq!(stored.league, profile.league);
    assert_eq!(stored.finals_won, 1);
    assert_eq!(stored.top3_finishes, 1);
    let marker = FileMarkerStore::at(temp_dir.path()).load().unwrap().unwrap();
    assert_eq!((marker.year, marker.week), (2025, 12));
}

#[tokio::test]
async fn test_corrupt_marker_file_is_replaced_on_load() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("league_marker.json"), "not json").unwrap();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap(),
    ));

    let install = open(temp_dir.path(), &clock);
    install.layer.load().await.unwrap();
    let marker = FileMarkerStore::at(temp_dir.path()).load().unwrap().unwrap();
    assert_eq!((marker.year, marker.week), (2025, 11));
}

#[tokio::test]
async fn test_deleted_and_edited_tasks_persist() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(),
    ));
    let install = open(temp_dir.path(), &clock);
    install.layer.load().await.unwrap();

    let keep = install.layer.add_task("draft").await.unwrap();
    let drop_me = install.layer.add_task("obsolete").await.unwrap();
    install.layer.edit_task(&keep.id, "final").await.unwrap();
    install.layer.delete_task(&drop_me.id).await.unwrap();

    let stored = install.backend.list_by_owner("local").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title, "final");
}

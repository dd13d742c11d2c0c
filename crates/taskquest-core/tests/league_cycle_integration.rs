//! Integration tests for the weekly league cycle.
//!
//! Several users share one in-memory backend, each with their own sync
//! layer and weekly marker, the way separate installations would.

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use taskquest_core::league::WeeklyCheck;
use taskquest_core::storage::WeekMarkerStore;
use taskquest_core::store::{CohortStore, ProfileStore};
use taskquest_core::{
    Collaborators, Config, FixedClock, League, MemoryBackend, MemoryMarkerStore, Notification,
    SyncLayer, TransitionKind,
};

fn layer_for(user: &str, backend: &MemoryBackend, clock: &Arc<FixedClock>) -> SyncLayer {
    let shared = Arc::new(backend.clone());
    let stores = Collaborators::shared(
        shared.clone(),
        shared,
        Arc::new(MemoryMarkerStore::default()),
    );
    SyncLayer::new(user, Config::default(), clock.clone(), stores)
}

async fn complete_n(layer: &SyncLayer, n: usize) {
    for i in 0..n {
        let task = layer.add_task(&format!("task {i}")).await.unwrap();
        layer.complete_task(&task.id, None).await.unwrap();
    }
}

#[tokio::test]
async fn test_bronze_cohort_promotes_top_five() {
    // Monday of 2025-W11.
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(),
    ));
    let backend = MemoryBackend::new();

    let mut layers = Vec::new();
    for i in 1..=25 {
        let layer = layer_for(&format!("u{i:02}"), &backend, &clock);
        layer.load().await.unwrap();
        // u01 earns the most, u25 the least.
        complete_n(&layer, 26 - i).await;
        // Loading already recorded this week's baseline.
        assert_eq!(
            layer.check_weekly_transition().await.unwrap(),
            WeeklyCheck::UpToDate
        );
        layers.push(layer);
    }

    let cohort = layers[0].profile().unwrap().cohort_id.unwrap();
    assert!(layers
        .iter()
        .all(|l| l.profile().unwrap().cohort_id.as_deref() == Some(cohort.as_str())));
    assert_eq!(backend.cohort_members(&cohort).await.unwrap().len(), 25);

    clock.advance(Duration::days(7));

    // Lowest first, so each departure leaves the remaining ranks unchanged.
    for (i, layer) in layers.iter().enumerate().rev() {
        let WeeklyCheck::Transitioned(outcome) = layer.check_weekly_transition().await.unwrap()
        else {
            panic!("expected a transition for {}", layer.user_id());
        };
        assert_eq!(outcome.rank, Some(i + 1));
        if i < 5 {
            assert_eq!(outcome.kind, TransitionKind::Promoted);
            assert_eq!(outcome.to, League::Silver);
        } else {
            assert_eq!(outcome.kind, TransitionKind::Stable);
            assert_eq!(outcome.to, League::Bronze);
        }
    }

    for layer in &layers {
        let stored = backend.fetch(layer.user_id()).await.unwrap().unwrap();
        assert_eq!(stored.xp, 0);
        assert_eq!(stored.league, layer.profile().unwrap().league);
        assert_ne!(stored.cohort_id.as_deref(), Some(cohort.as_str()));
    }

    let silver = backend.cohorts_for(League::Silver).await.unwrap();
    assert_eq!(silver.len(), 1);
    assert_eq!(silver[0].member_count, 5);

    // A second check in the same week is a no-op everywhere.
    clock.advance(Duration::days(3));
    for layer in &layers {
        assert_eq!(
            layer.check_weekly_transition().await.unwrap(),
            WeeklyCheck::UpToDate
        );
    }
}

#[tokio::test]
async fn test_iso_week_boundary_at_new_year() {
    // Sunday 2025-12-28 is 2025-W52; Monday 2025-12-29 is 2026-W01.
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 12, 28, 20, 0, 0).unwrap(),
    ));
    let backend = MemoryBackend::new();
    let markers = Arc::new(MemoryMarkerStore::default());
    let shared = Arc::new(backend.clone());
    let stores = Collaborators::shared(shared.clone(), shared, markers.clone());
    let layer = SyncLayer::new("solo", Config::default(), clock.clone(), stores);
    layer.load().await.unwrap();

    let marker = markers.load().unwrap().unwrap();
    assert_eq!((marker.year, marker.week), (2025, 52));

    clock.advance(Duration::hours(6));
    let WeeklyCheck::Transitioned(outcome) = layer.check_weekly_transition().await.unwrap() else {
        panic!("expected a transition");
    };
    // Alone in the cohort: rank 1 of 1 promotes out of Bronze.
    assert_eq!(outcome.rank, Some(1));
    assert_eq!(outcome.to, League::Silver);
    let notes = layer.drain_notifications();
    assert!(notes
        .iter()
        .any(|n| matches!(n, Notification::LeagueTransition { .. })));
}

#[tokio::test]
async fn test_overtake_between_two_installations() {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap(),
    ));
    let backend = MemoryBackend::new();
    let mine = layer_for("alice", &backend, &clock);
    let theirs = layer_for("bob", &backend, &clock);
    mine.load().await.unwrap();
    theirs.load().await.unwrap();
    assert_eq!(mine.profile().unwrap().cohort_id, theirs.profile().unwrap().cohort_id);

    complete_n(&mine, 2).await;
    complete_n(&theirs, 1).await;
    let mut watch = mine.watch_peers().await.unwrap();
    mine.drain_notifications();

    // 50 -> 100 ties alice, 100 -> 150 passes her.
    complete_n(&theirs, 1).await;
    assert!(mine.poll_peers(&mut watch).is_empty());
    complete_n(&theirs, 1).await;
    let raised = mine.poll_peers(&mut watch);
    assert_eq!(raised.len(), 1);
    assert!(matches!(
        &raised[0],
        Notification::Overtaken { peer_id, peer_xp: 150, my_xp: 100, .. } if peer_id == "bob"
    ));

    // Further gains above alice do not signal again.
    complete_n(&theirs, 1).await;
    assert!(mine.poll_peers(&mut watch).is_empty());
    assert!(matches!(
        mine.drain_notifications().as_slice(),
        [Notification::Overtaken { .. }]
    ));
    watch.cancel();
    assert_eq!(backend.feed().active(), 0);
}

#[tokio::test]
async fn test_long_session_rolls_into_new_week() {
    // Saturday of 2025-W11, then Monday of W12.
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap(),
    ));
    let backend = MemoryBackend::new();
    let leader = layer_for("dora", &backend, &clock);
    let trailer = layer_for("eve", &backend, &clock);
    leader.load().await.unwrap();
    trailer.load().await.unwrap();
    complete_n(&leader, 2).await;
    complete_n(&trailer, 1).await;

    clock.advance(Duration::days(2));
    // The first intent of the new week closes the old one before earning,
    // so these completions cannot lift eve above dora for W11.
    complete_n(&trailer, 2).await;
    let profile = trailer.profile().unwrap();
    assert_eq!(profile.xp, 100);
    assert_eq!(profile.finals_won, 0);
    assert_eq!(profile.top3_finishes, 1);

    complete_n(&leader, 1).await;
    let profile = leader.profile().unwrap();
    assert_eq!(profile.league, League::Silver);
    assert_eq!(profile.finals_won, 1);
    assert_eq!(profile.xp, 50);
}

#[tokio::test]
async fn test_offline_session_catches_up() {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap(),
    ));
    let backend = MemoryBackend::new();
    let layer = layer_for("carol", &backend, &clock);
    layer.load().await.unwrap();
    let first = layer.add_task("write tests").await.unwrap();
    let second = layer.add_task("ship").await.unwrap();

    backend.go_offline();
    clock.advance(Duration::days(1));
    assert!(layer.complete_task(&first.id, None).await.is_err());
    let profile = layer.profile().unwrap();
    assert_eq!(profile.xp, 50);
    assert_eq!(profile.streak, 2);
    assert!(!layer.streak_committed());

    backend.go_online();
    layer.complete_task(&second.id, None).await.unwrap();
    assert!(layer.streak_committed());
    assert!(layer.pending_patch().is_empty());

    let stored = backend.fetch("carol").await.unwrap().unwrap();
    assert_eq!(stored.xp, 100);
    assert_eq!(stored.completed_tasks, 2);
    assert_eq!(stored.streak, 2);
    assert_eq!(layer.total_points(), Some(100));
}

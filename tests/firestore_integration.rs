// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Run with: FIRESTORE_EMULATOR_HOST=localhost:8080 cargo test
//!
//! The emulator keeps state for its lifetime, so every test uses unique keys.

use garmin_sync::db::{FirestoreDb, RecordStore, WriteOutcome};
use garmin_sync::models::{ActivityRecord, EntityType, WeightRecord};

mod common;
use common::test_db;

/// Generate a unique id for test isolation.
fn unique_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

fn activity(id: u64, distance: f64) -> ActivityRecord {
    serde_json::from_value(serde_json::json!({
        "activityId": id,
        "distance": distance,
        "startTimeGMT": "2099-12-31 23:59:59",
        "sourceVariant": "summary"
    }))
    .unwrap()
}

fn weigh_in(calendar_date: Option<&str>, date: Option<&str>, grams: f64) -> WeightRecord {
    WeightRecord {
        date: date.map(str::to_string),
        calendar_date: calendar_date.map(str::to_string),
        sample_pk: None,
        timestamp_gmt: None,
        weight: Some(grams),
        bmi: None,
        body_fat: None,
        body_water: None,
        bone_mass: None,
        muscle_mass: None,
        source_type: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// WRITE POLICY TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_upsert_inserts_then_updates() {
    require_emulator!();

    let db = test_db().await;
    let id = unique_id();

    assert_eq!(
        db.upsert(&activity(id, 1000.0)).await.unwrap(),
        WriteOutcome::Inserted
    );
    assert_eq!(
        db.upsert(&activity(id, 1100.0)).await.unwrap(),
        WriteOutcome::Updated
    );

    let fetched: ActivityRecord = db.get(&id.to_string()).await.unwrap().unwrap();
    assert_eq!(fetched.distance, Some(1100.0));

    println!("✓ Activity upsert verified: id={}", id);
}

#[tokio::test]
async fn test_insert_if_absent_keeps_first_write() {
    require_emulator!();

    let db = test_db().await;
    let day = format!("2099-x-{}", unique_id());

    let first = weigh_in(Some(&day), None, 70000.0);
    let second = weigh_in(Some(&day), None, 71000.0);
    assert_eq!(
        db.insert_if_absent(&first).await.unwrap(),
        WriteOutcome::Inserted
    );
    assert_eq!(
        db.insert_if_absent(&second).await.unwrap(),
        WriteOutcome::Skipped
    );

    let fetched: WeightRecord = db.get(&day).await.unwrap().unwrap();
    assert_eq!(fetched.weight, Some(70000.0));
}

// ═══════════════════════════════════════════════════════════════════════════
// QUERY TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_exists_where_matches_named_field() {
    require_emulator!();

    let db = test_db().await;
    let day = format!("2099-y-{}", unique_id());
    db.insert_if_absent(&weigh_in(None, Some(&day), 65000.0))
        .await
        .unwrap();

    assert!(db
        .exists_where(EntityType::Weight, "date", &day)
        .await
        .unwrap());
    assert!(!db
        .exists_where(EntityType::Weight, "calendarDate", &day)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_latest_and_count() {
    require_emulator!();

    let db = test_db().await;
    let id = unique_id();
    let before = db.count(EntityType::Activity).await.unwrap();
    db.upsert(&activity(id, 500.0)).await.unwrap();

    assert!(db.count(EntityType::Activity).await.unwrap() > before);
    let latest: ActivityRecord = db.latest().await.unwrap().unwrap();
    assert_eq!(latest.start_time_gmt.as_deref(), Some("2099-12-31 23:59:59"));
}

#[tokio::test]
async fn test_offline_client_reports_unavailable() {
    let db = FirestoreDb::new_mock();
    let err = db.count(EntityType::Sleep).await.unwrap_err();
    assert!(err.is_systemic());
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Downloader tests against a scripted remote.

use chrono::NaiveDate;
use garmin_sync::config::Config;
use garmin_sync::db::{MemoryStore, RecordStore};
use garmin_sync::error::SyncError;
use garmin_sync::models::{ActivityRecord, EntityType, Variant};
use garmin_sync::services::garmin::paths;
use garmin_sync::services::{
    ArtifactCache, ConnectTranscoder, DownloadOptions, DownloadReport, Downloader, Importer,
    SyncPlanner,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

mod common;
use common::{config_for, request_key, Failure, MockConnector, MockRemote, DISPLAY_NAME};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
}

fn downloader(config: &Config, remote: &Arc<MockRemote>) -> Downloader<MockConnector> {
    Downloader::new(
        MockConnector::new(Arc::clone(remote)),
        ArtifactCache::new(config.base_dir()),
        DownloadOptions {
            concurrency: config.sync.max_concurrency,
            display_name: DISPLAY_NAME.to_string(),
            download_files: config.sync.download_activity_files,
        },
    )
}

fn report_for(reports: &[DownloadReport], entity: EntityType) -> &DownloadReport {
    reports
        .iter()
        .find(|r| r.entity == Some(entity))
        .expect("report for entity")
}

#[tokio::test]
async fn test_one_failed_day_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), &[EntityType::Sleep]);
    let remote = MockRemote::new();
    let sleep_path = paths::sleep(DISPLAY_NAME);
    remote.respond(
        sleep_path.clone(),
        json!({"dailySleepDTO": {"sleepTimeSeconds": 27000, "deepSleepSeconds": 5400}}),
    );
    remote.fail(
        request_key(&sleep_path, &[("date", "2024-01-05".to_string())]),
        Failure::Network,
    );

    let plans = SyncPlanner::new(&config, today(), false).plan_all(&BTreeMap::new());
    let reports = downloader(&config, &remote).run(&plans).await.unwrap();

    let sleep = report_for(&reports, EntityType::Sleep);
    assert_eq!(sleep.succeeded, 9);
    assert_eq!(sleep.failed, 1);
    assert!(sleep.is_partial_failure());
    assert_eq!(remote.call_count(), 10);

    let cache = ArtifactCache::new(config.base_dir());
    let cached: Vec<String> = cache
        .list(EntityType::Sleep)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.key)
        .collect();
    assert_eq!(cached.len(), 9);
    assert!(!cached.contains(&"2024-01-05".to_string()));

    let store = Arc::new(MemoryStore::new());
    let importer = Importer::new(Arc::clone(&store), cache, ConnectTranscoder);
    let imported = importer.import_entity(EntityType::Sleep).await.unwrap();
    assert_eq!(imported.inserted, 9);
    assert_eq!(store.count(EntityType::Sleep).await.unwrap(), 9);
}

#[tokio::test]
async fn test_workers_are_bounded_by_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(dir.path(), &[EntityType::DailySummary]);
    config.sync.max_concurrency = 3;
    let remote = MockRemote::new();
    remote.respond(
        paths::daily_summary(DISPLAY_NAME),
        json!({"totalSteps": 8000}),
    );

    let connector = MockConnector::new(Arc::clone(&remote));
    let downloader = Downloader::new(
        connector.clone(),
        ArtifactCache::new(config.base_dir()),
        DownloadOptions {
            concurrency: 3,
            display_name: DISPLAY_NAME.to_string(),
            download_files: false,
        },
    );
    let plans = SyncPlanner::new(&config, today(), false).plan_all(&BTreeMap::new());
    let reports = downloader.run(&plans).await.unwrap();

    assert_eq!(report_for(&reports, EntityType::DailySummary).succeeded, 10);
    assert!(connector.connects() <= 3);
    assert!(connector.connects() >= 1);
}

#[tokio::test]
async fn test_activity_details_override_summary() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), &[EntityType::Activity]);
    let remote = MockRemote::new();
    remote.respond(
        paths::ACTIVITY_SEARCH,
        json!([
            {
                "activityId": 101,
                "activityName": "Morning Run",
                "distance": 5000.0,
                "startTimeGMT": "2024-01-02 07:00:00",
                "activityType": {"typeKey": "running"}
            },
            {
                "activityId": 102,
                "activityName": "Evening Ride",
                "distance": 20000.0,
                "startTimeGMT": "2024-01-03 18:00:00",
                "activityType": {"typeKey": "cycling"}
            },
            {
                "activityId": 101,
                "activityName": "Morning Run",
                "distance": 5000.0
            }
        ]),
    );
    remote.respond(
        paths::activity(101),
        json!({
            "activityId": 101,
            "activityName": "Morning Run (edited)",
            "activityTypeDTO": {"typeKey": "trail_running"},
            "summaryDTO": {"distance": 5012.5, "startTimeGMT": "2024-01-02 07:00:00"}
        }),
    );
    remote.respond(
        paths::activity_laps(101),
        json!({"lapDTOs": [{"lapIndex": 1, "distance": 2500.0}, {"lapIndex": 2, "distance": 2512.5}]}),
    );
    remote.fail(paths::activity(102), Failure::Network);

    let plans = SyncPlanner::new(&config, today(), true).plan_all(&BTreeMap::new());
    let reports = downloader(&config, &remote).run(&plans).await.unwrap();

    let activity = report_for(&reports, EntityType::Activity);
    assert_eq!(activity.succeeded, 2, "duplicate list entries are fetched once");
    assert_eq!(activity.failed, 0, "missing details are not a failure");

    let cache = ArtifactCache::new(config.base_dir());
    let details_path = cache
        .artifact_path(EntityType::Activity, "101", Variant::Details)
        .unwrap();
    let details = cache.get(&details_path).await.unwrap();
    assert_eq!(details["activityName"], "Morning Run (edited)");
    assert_eq!(details["distance"], 5000.0, "summary fields survive the merge");
    assert!(!cache
        .artifact_path(EntityType::Activity, "102", Variant::Details)
        .unwrap()
        .exists());

    let store = Arc::new(MemoryStore::new());
    Importer::new(Arc::clone(&store), cache, ConnectTranscoder)
        .import_entity(EntityType::Activity)
        .await
        .unwrap();

    let run: ActivityRecord = store.get("101").await.unwrap().unwrap();
    assert_eq!(run.distance, Some(5012.5));
    assert_eq!(run.activity_name.as_deref(), Some("Morning Run (edited)"));
    assert_eq!(run.activity_type.as_deref(), Some("trail_running"));
    assert_eq!(run.source_variant, "details");
    assert_eq!(run.laps.len(), 2);

    let ride: ActivityRecord = store.get("102").await.unwrap().unwrap();
    assert_eq!(ride.source_variant, "summary");
    assert_eq!(ride.distance, Some(20000.0));
}

#[tokio::test]
async fn test_original_files_are_optional() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(dir.path(), &[EntityType::Activity]);
    config.sync.download_activity_files = true;
    let remote = MockRemote::new();
    remote.respond(paths::ACTIVITY_SEARCH, json!([{"activityId": 7}]));
    remote.respond_binary(paths::activity_file(7), b"PK\x03\x04fit".to_vec());

    let plans = SyncPlanner::new(&config, today(), true).plan_all(&BTreeMap::new());
    downloader(&config, &remote).run(&plans).await.unwrap();

    let file = ArtifactCache::new(config.base_dir())
        .entity_dir(EntityType::Activity)
        .join("7.zip");
    assert_eq!(std::fs::read(file).unwrap(), b"PK\x03\x04fit");
}

#[tokio::test]
async fn test_forbidden_entity_is_disabled_not_failed() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(
        dir.path(),
        &[EntityType::Sleep, EntityType::RestingHeartRate],
    );
    let remote = MockRemote::new();
    let rhr_path = paths::resting_heart_rate(DISPLAY_NAME);
    remote.respond(paths::sleep(DISPLAY_NAME), json!({"sleepTimeSeconds": 25000}));
    remote.fail(rhr_path.clone(), Failure::Forbidden);

    let plans = SyncPlanner::new(&config, today(), false).plan_all(&BTreeMap::new());
    let reports = downloader(&config, &remote).run(&plans).await.unwrap();

    let rhr = report_for(&reports, EntityType::RestingHeartRate);
    assert_eq!(rhr.disabled, 10);
    assert_eq!(rhr.failed, 0);
    assert_eq!(rhr.succeeded, 0);
    assert!(!rhr.is_complete_failure());
    assert_eq!(report_for(&reports, EntityType::Sleep).succeeded, 10);

    let rhr_calls = remote
        .calls()
        .iter()
        .filter(|c| c.starts_with(&rhr_path))
        .count();
    assert!(rhr_calls <= config.sync.max_concurrency);
}

#[tokio::test]
async fn test_unauthorized_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), &[EntityType::Sleep]);
    let remote = MockRemote::new();
    remote.fail(paths::sleep(DISPLAY_NAME), Failure::Unauthorized);

    let plans = SyncPlanner::new(&config, today(), false).plan_all(&BTreeMap::new());
    let err = downloader(&config, &remote).run(&plans).await.unwrap_err();

    assert!(matches!(err, SyncError::SessionExpired(_)));
    assert!(err.is_auth_error());
    assert!(remote.call_count() <= config.sync.max_concurrency);
}

#[tokio::test]
async fn test_weight_range_is_cached_per_day() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), &[EntityType::Weight]);
    let remote = MockRemote::new();
    remote.respond(
        request_key(
            paths::WEIGHT_RANGE,
            &[
                ("startDate", "2024-01-01".to_string()),
                ("endDate", "2024-01-10".to_string()),
            ],
        ),
        json!({"dateWeightList": [
            {"calendarDate": "2024-01-01", "timestampGMT": 1000, "weight": 70100.0},
            {"calendarDate": "2024-01-01", "timestampGMT": 5000, "weight": 70000.0},
            {"date": 1704153600000_i64, "timestampGMT": 1704160000000_i64, "weight": 69900.0}
        ]}),
    );

    let plans = SyncPlanner::new(&config, today(), false).plan_all(&BTreeMap::new());
    let reports = downloader(&config, &remote).run(&plans).await.unwrap();

    let weight = report_for(&reports, EntityType::Weight);
    assert_eq!(weight.succeeded, 1);
    assert_eq!(weight.written, 2);

    let cache = ArtifactCache::new(config.base_dir());
    let keys: Vec<String> = cache
        .list(EntityType::Weight)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.key)
        .collect();
    assert_eq!(keys, vec!["2024-01-01", "2024-01-02"]);

    let first = cache
        .get(
            &cache
                .artifact_path(EntityType::Weight, "2024-01-01", Variant::Summary)
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first["weight"], 70000.0);
}

#[tokio::test]
async fn test_absent_days_count_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), &[EntityType::DailySummary]);
    let remote = MockRemote::new();

    let plans = SyncPlanner::new(&config, today(), false).plan_all(&BTreeMap::new());
    let reports = downloader(&config, &remote).run(&plans).await.unwrap();

    let summary = report_for(&reports, EntityType::DailySummary);
    assert_eq!(summary.empty, 10);
    assert_eq!(summary.failed, 0);
    assert!(summary.is_complete_success());
}

#[tokio::test]
async fn test_second_download_leaves_cache_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path(), &[EntityType::DailySummary]);
    let remote = MockRemote::new();
    remote.respond(
        paths::daily_summary(DISPLAY_NAME),
        json!({"totalSteps": 8000}),
    );
    let plans = SyncPlanner::new(&config, today(), false).plan_all(&BTreeMap::new());

    let first = downloader(&config, &remote).run(&plans).await.unwrap();
    assert_eq!(report_for(&first, EntityType::DailySummary).written, 10);

    let second = downloader(&config, &remote).run(&plans).await.unwrap();
    let summary = report_for(&second, EntityType::DailySummary);
    assert_eq!(summary.written, 0);
    assert_eq!(summary.unchanged, 10);
}

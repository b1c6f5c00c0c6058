// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, Criterion};
use garmin_sync::config::Config;
use garmin_sync::services::downloader::{merge_details, split_weight_by_day};
use garmin_sync::services::SyncPlanner;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::hint::black_box;

fn benchmark_planning(c: &mut Criterion) {
    // Ten years of daily history
    let mut config = Config::test_default("/tmp/garmin-bench");
    let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    config.data.monitoring_start_date = Some(start);
    config.data.sleep_start_date = Some(start);
    config.data.rhr_start_date = Some(start);
    config.data.weight_start_date = Some(start);
    let today = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();

    let mut watermarks = BTreeMap::new();
    for entity in config.enabled_entities() {
        watermarks.insert(entity, NaiveDate::from_ymd_opt(2024, 12, 20).unwrap());
    }

    let mut group = c.benchmark_group("planning");

    group.bench_function("full_history", |b| {
        let planner = SyncPlanner::new(&config, today, false);
        b.iter(|| planner.plan_all(black_box(&watermarks)))
    });

    group.bench_function("latest_only", |b| {
        let planner = SyncPlanner::new(&config, today, true);
        b.iter(|| planner.plan_all(black_box(&watermarks)))
    });

    group.finish();
}

fn benchmark_payloads(c: &mut Criterion) {
    let summary: Value = json!({
        "activityId": 16906743520_u64,
        "activityName": "Rancho San Antonio loop",
        "distance": 12874.4,
        "duration": 5421.3,
        "averageHR": 141.0,
        "startTimeGMT": "2024-05-04 15:02:11",
        "activityType": {"typeKey": "trail_running"}
    });
    let details: Value = json!({
        "activityId": 16906743520_u64,
        "activityName": "Rancho San Antonio loop",
        "activityTypeDTO": {"typeKey": "trail_running"},
        "summaryDTO": {
            "distance": 12880.1,
            "duration": 5421.3,
            "averageHR": 142.0,
            "elevationGain": 412.0
        }
    });

    let weigh_ins: Vec<Value> = (0..365)
        .flat_map(|day| {
            let millis = 1_704_067_200_000_i64 + day * 86_400_000;
            [
                json!({"date": millis, "timestampGMT": millis + 1000, "weight": 70000.0}),
                json!({"date": millis, "timestampGMT": millis + 2000, "weight": 69900.0}),
            ]
        })
        .collect();
    let range = json!({ "dateWeightList": weigh_ins });

    let mut group = c.benchmark_group("payloads");

    group.bench_function("merge_details", |b| {
        b.iter(|| merge_details(black_box(&summary), details.clone()))
    });

    group.bench_function("split_weight_year", |b| {
        b.iter(|| split_weight_by_day(black_box(&range)))
    });

    group.finish();
}

criterion_group!(benches, benchmark_planning, benchmark_payloads);
criterion_main!(benches);

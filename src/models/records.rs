// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Canonical records stored in the document database.
//!
//! Field names serialize in camelCase so documents keep the vendor's
//! naming (`calendarDate`, `activityId`, ...). Each record type knows its
//! identity key, which doubles as the document id.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::fields;
use crate::models::EntityType;

/// A record with a unique identity key inside its entity's collection.
pub trait CanonicalRecord: Serialize + DeserializeOwned + Send + Sync + 'static {
    const ENTITY: EntityType;
    /// Field used for "latest" lookups and range queries.
    const ORDERING_FIELD: &'static str;

    /// Identity key; also the document id.
    fn identity_key(&self) -> String;

    /// Calendar day this record covers, used as the sync watermark.
    fn watermark_date(&self) -> Option<NaiveDate>;
}

fn parse_day(value: Option<&str>) -> Option<NaiveDate> {
    let value = value?;
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// One activity, built from the richest cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub activity_id: u64,
    pub owner_id: Option<u64>,
    pub activity_name: Option<String>,
    pub activity_type: Option<String>,
    #[serde(rename = "startTimeGMT")]
    pub start_time_gmt: Option<String>,
    pub start_time_local: Option<String>,
    pub duration: Option<f64>,
    pub moving_duration: Option<f64>,
    pub elapsed_duration: Option<f64>,
    pub distance: Option<f64>,
    pub average_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub calories: Option<f64>,
    #[serde(rename = "averageHR")]
    pub average_hr: Option<f64>,
    #[serde(rename = "maxHR")]
    pub max_hr: Option<f64>,
    pub elevation_gain: Option<f64>,
    pub elevation_loss: Option<f64>,
    pub steps: Option<u64>,
    pub average_cadence: Option<f64>,
    #[serde(rename = "vO2Max")]
    pub vo2_max: Option<f64>,
    pub aerobic_training_effect: Option<f64>,
    pub anaerobic_training_effect: Option<f64>,
    pub location_name: Option<String>,
    pub start_latitude: Option<f64>,
    pub start_longitude: Option<f64>,
    pub lap_count: Option<u32>,
    pub manual_activity: Option<bool>,
    /// "summary" or "details": which payload the record was built from
    pub source_variant: String,
    #[serde(default)]
    pub laps: Vec<LapRecord>,
    #[serde(default)]
    pub splits: Vec<SplitRecord>,
}

impl CanonicalRecord for ActivityRecord {
    const ENTITY: EntityType = EntityType::Activity;
    const ORDERING_FIELD: &'static str = fields::START_TIME_GMT;

    fn identity_key(&self) -> String {
        self.activity_id.to_string()
    }

    fn watermark_date(&self) -> Option<NaiveDate> {
        parse_day(self.start_time_gmt.as_deref())
    }
}

/// Lap summary attached to an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapRecord {
    pub lap_index: Option<u32>,
    #[serde(rename = "startTimeGMT")]
    pub start_time_gmt: Option<String>,
    pub distance: Option<f64>,
    pub duration: Option<f64>,
    pub average_speed: Option<f64>,
    #[serde(rename = "averageHR")]
    pub average_hr: Option<f64>,
}

/// Split summary (interval, run/walk, ...) attached to an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRecord {
    pub split_type: Option<String>,
    pub no_of_splits: Option<u32>,
    pub distance: Option<f64>,
    pub duration: Option<f64>,
    pub average_speed: Option<f64>,
}

/// Daily wellness rollup, one per calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummaryRecord {
    pub calendar_date: String,
    pub total_steps: Option<u64>,
    pub daily_step_goal: Option<u64>,
    pub total_distance_meters: Option<f64>,
    pub active_kilocalories: Option<f64>,
    pub bmr_kilocalories: Option<f64>,
    pub total_kilocalories: Option<f64>,
    pub min_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub resting_heart_rate: Option<f64>,
    pub moderate_intensity_minutes: Option<f64>,
    pub vigorous_intensity_minutes: Option<f64>,
    pub floors_ascended: Option<f64>,
    pub floors_descended: Option<f64>,
    pub average_stress_level: Option<f64>,
    pub body_battery_highest_value: Option<f64>,
    pub body_battery_lowest_value: Option<f64>,
}

impl CanonicalRecord for DailySummaryRecord {
    const ENTITY: EntityType = EntityType::DailySummary;
    const ORDERING_FIELD: &'static str = fields::CALENDAR_DATE;

    fn identity_key(&self) -> String {
        self.calendar_date.clone()
    }

    fn watermark_date(&self) -> Option<NaiveDate> {
        parse_day(Some(&self.calendar_date))
    }
}

/// One night of sleep, keyed by the calendar day it ends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepRecord {
    pub calendar_date: String,
    #[serde(rename = "sleepStartTimestampGMT")]
    pub sleep_start_timestamp_gmt: Option<i64>,
    #[serde(rename = "sleepEndTimestampGMT")]
    pub sleep_end_timestamp_gmt: Option<i64>,
    pub sleep_time_seconds: Option<f64>,
    pub deep_sleep_seconds: Option<f64>,
    pub light_sleep_seconds: Option<f64>,
    pub rem_sleep_seconds: Option<f64>,
    pub awake_sleep_seconds: Option<f64>,
    #[serde(rename = "averageSpO2Value")]
    pub average_spo2_value: Option<f64>,
    #[serde(rename = "lowestSpO2Value")]
    pub lowest_spo2_value: Option<f64>,
    pub average_respiration_value: Option<f64>,
    pub average_heart_rate: Option<f64>,
    pub sleep_score: Option<f64>,
}

impl CanonicalRecord for SleepRecord {
    const ENTITY: EntityType = EntityType::Sleep;
    const ORDERING_FIELD: &'static str = fields::CALENDAR_DATE;

    fn identity_key(&self) -> String {
        self.calendar_date.clone()
    }

    fn watermark_date(&self) -> Option<NaiveDate> {
        parse_day(Some(&self.calendar_date))
    }
}

/// A weigh-in. At most one per day.
///
/// The vendor names the day `date` on some endpoints and `calendarDate` on
/// others, so both are kept and both are checked before inserting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_date: Option<String>,
    pub sample_pk: Option<u64>,
    pub timestamp_gmt: Option<i64>,
    /// Grams, as reported by the vendor
    pub weight: Option<f64>,
    pub bmi: Option<f64>,
    pub body_fat: Option<f64>,
    pub body_water: Option<f64>,
    pub bone_mass: Option<f64>,
    pub muscle_mass: Option<f64>,
    pub source_type: Option<String>,
}

impl CanonicalRecord for WeightRecord {
    const ENTITY: EntityType = EntityType::Weight;
    const ORDERING_FIELD: &'static str = fields::CALENDAR_DATE;

    fn identity_key(&self) -> String {
        self.calendar_date
            .clone()
            .or_else(|| self.date.clone())
            .unwrap_or_default()
    }

    fn watermark_date(&self) -> Option<NaiveDate> {
        parse_day(self.calendar_date.as_deref().or(self.date.as_deref()))
    }
}

/// Resting heart rate for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestingHeartRateRecord {
    pub calendar_date: String,
    pub resting_heart_rate: f64,
}

impl CanonicalRecord for RestingHeartRateRecord {
    const ENTITY: EntityType = EntityType::RestingHeartRate;
    const ORDERING_FIELD: &'static str = fields::CALENDAR_DATE;

    fn identity_key(&self) -> String {
        self.calendar_date.clone()
    }

    fn watermark_date(&self) -> Option<NaiveDate> {
        parse_day(Some(&self.calendar_date))
    }
}

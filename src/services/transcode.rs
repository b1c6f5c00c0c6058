// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Vendor payload to canonical record mapping.
//!
//! The vendor returns several shapes for the same logical entity. Activity
//! payloads are decoded into an explicit [`ActivityPayload`] at the
//! boundary; the other entities accept each known wrapper.

use serde_json::{Map, Value};

use crate::error::TranscodeError;
use crate::models::{
    ActivityRecord, DailySummaryRecord, LapRecord, RestingHeartRateRecord, SleepRecord,
    SplitRecord, Variant, WeightRecord,
};
use crate::time_utils::day_from_epoch_millis;

const SUMMARY_DTO: &str = "summaryDTO";
const RHR_METRIC: &str = "WELLNESS_RESTING_HEART_RATE";

/// An activity payload, tagged by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityPayload {
    /// Activity-list entry: every field at the root
    Summary(Map<String, Value>),
    /// Activity-service document: measurements nested under `summaryDTO`
    Details(Map<String, Value>),
}

impl ActivityPayload {
    pub fn decode(value: Value) -> Result<Self, TranscodeError> {
        match value {
            Value::Object(map) if map.contains_key(SUMMARY_DTO) => Ok(Self::Details(map)),
            Value::Object(map) => Ok(Self::Summary(map)),
            other => Err(TranscodeError::Shape(format!(
                "activity payload is not an object: {}",
                kind(&other)
            ))),
        }
    }

    pub fn variant(&self) -> Variant {
        match self {
            Self::Summary(_) => Variant::Summary,
            Self::Details(_) => Variant::Details,
        }
    }

    fn root(&self) -> &Map<String, Value> {
        match self {
            Self::Summary(map) | Self::Details(map) => map,
        }
    }

    /// A measurement, looked up in `summaryDTO` first for details payloads.
    fn measure(&self, name: &str) -> Option<&Value> {
        let found = match self {
            Self::Summary(map) => map.get(name),
            Self::Details(map) => map
                .get(SUMMARY_DTO)
                .and_then(|dto| dto.get(name))
                .filter(|v| !v.is_null())
                .or_else(|| map.get(name)),
        };
        found.filter(|v| !v.is_null())
    }

    fn activity_type(&self) -> Option<String> {
        let root = self.root();
        let typed = match self {
            Self::Details(_) => root.get("activityTypeDTO").or_else(|| root.get("activityType")),
            Self::Summary(_) => root.get("activityType"),
        }?;
        match typed {
            Value::Object(obj) => text(obj.get("typeKey")),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Maps cached payloads onto canonical records.
///
/// `Ok(None)` (or an empty `Vec`) means the payload carries no measurement.
pub trait RecordTranscoder: Send + Sync {
    fn activity(
        &self,
        payload: &ActivityPayload,
        laps: Option<&Value>,
        splits: Option<&Value>,
    ) -> Result<Option<ActivityRecord>, TranscodeError>;

    fn daily_summary(
        &self,
        key: &str,
        payload: &Value,
    ) -> Result<Option<DailySummaryRecord>, TranscodeError>;

    fn sleep(&self, key: &str, payload: &Value) -> Result<Option<SleepRecord>, TranscodeError>;

    fn weight(&self, key: &str, payload: &Value) -> Result<Vec<WeightRecord>, TranscodeError>;

    fn resting_heart_rate(
        &self,
        key: &str,
        payload: &Value,
    ) -> Result<Option<RestingHeartRateRecord>, TranscodeError>;
}

/// Transcoder for Garmin Connect payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectTranscoder;

impl RecordTranscoder for ConnectTranscoder {
    fn activity(
        &self,
        payload: &ActivityPayload,
        laps: Option<&Value>,
        splits: Option<&Value>,
    ) -> Result<Option<ActivityRecord>, TranscodeError> {
        let root = payload.root();
        let activity_id =
            uint(root.get("activityId")).ok_or(TranscodeError::MissingField("activityId"))?;

        let owner_id = uint(root.get("ownerId"))
            .or_else(|| uint(root.get("userProfileId")))
            .or_else(|| {
                root.get("metadataDTO")
                    .and_then(|m| uint(m.get("ownerId")))
            });
        let manual_activity = payload
            .measure("manualActivity")
            .and_then(Value::as_bool)
            .or_else(|| {
                root.get("metadataDTO")
                    .and_then(|m| m.get("manualActivity"))
                    .and_then(Value::as_bool)
            });

        Ok(Some(ActivityRecord {
            activity_id,
            owner_id,
            activity_name: text(root.get("activityName")),
            activity_type: payload.activity_type(),
            start_time_gmt: text(payload.measure("startTimeGMT")),
            start_time_local: text(payload.measure("startTimeLocal")),
            duration: num(payload.measure("duration")),
            moving_duration: num(payload.measure("movingDuration")),
            elapsed_duration: num(payload.measure("elapsedDuration")),
            distance: num(payload.measure("distance")),
            average_speed: num(payload.measure("averageSpeed")),
            max_speed: num(payload.measure("maxSpeed")),
            calories: num(payload.measure("calories")),
            average_hr: num(payload.measure("averageHR")),
            max_hr: num(payload.measure("maxHR")),
            elevation_gain: num(payload.measure("elevationGain")),
            elevation_loss: num(payload.measure("elevationLoss")),
            steps: uint(payload.measure("steps")),
            average_cadence: num(
                payload
                    .measure("averageRunningCadenceInStepsPerMinute")
                    .or_else(|| payload.measure("averageBikingCadenceInRevPerMinute"))
                    .or_else(|| payload.measure("averageSwimCadence"))
                    .or_else(|| payload.measure("averageCadence")),
            ),
            vo2_max: num(payload.measure("vO2MaxValue")),
            aerobic_training_effect: num(
                payload
                    .measure("aerobicTrainingEffect")
                    .or_else(|| payload.measure("trainingEffect")),
            ),
            anaerobic_training_effect: num(payload.measure("anaerobicTrainingEffect")),
            location_name: text(payload.measure("locationName")),
            start_latitude: num(payload.measure("startLatitude")),
            start_longitude: num(payload.measure("startLongitude")),
            lap_count: uint(payload.measure("lapCount")).and_then(|n| u32::try_from(n).ok()),
            manual_activity,
            source_variant: payload.variant().as_str().to_string(),
            laps: laps.map(lap_records).unwrap_or_default(),
            splits: splits.map(split_records).unwrap_or_default(),
        }))
    }

    fn daily_summary(
        &self,
        key: &str,
        payload: &Value,
    ) -> Result<Option<DailySummaryRecord>, TranscodeError> {
        let obj = object(payload, "daily summary")?;
        let total_steps = uint(obj.get("totalSteps"));
        let total_kilocalories = num(obj.get("totalKilocalories"));
        let resting_heart_rate = num(obj.get("restingHeartRate"));
        if total_steps.is_none() && total_kilocalories.is_none() && resting_heart_rate.is_none() {
            return Ok(None);
        }

        Ok(Some(DailySummaryRecord {
            calendar_date: calendar_date(obj, key)?,
            total_steps,
            daily_step_goal: uint(obj.get("dailyStepGoal")),
            total_distance_meters: num(obj.get("totalDistanceMeters")),
            active_kilocalories: num(obj.get("activeKilocalories")),
            bmr_kilocalories: num(obj.get("bmrKilocalories")),
            total_kilocalories,
            min_heart_rate: num(obj.get("minHeartRate")),
            max_heart_rate: num(obj.get("maxHeartRate")),
            resting_heart_rate,
            moderate_intensity_minutes: num(obj.get("moderateIntensityMinutes")),
            vigorous_intensity_minutes: num(obj.get("vigorousIntensityMinutes")),
            floors_ascended: num(obj.get("floorsAscended")),
            floors_descended: num(obj.get("floorsDescended")),
            average_stress_level: num(obj.get("averageStressLevel")),
            body_battery_highest_value: num(obj.get("bodyBatteryHighestValue")),
            body_battery_lowest_value: num(obj.get("bodyBatteryLowestValue")),
        }))
    }

    fn sleep(&self, key: &str, payload: &Value) -> Result<Option<SleepRecord>, TranscodeError> {
        let outer = object(payload, "sleep")?;
        let dto = match outer.get("dailySleepDTO") {
            Some(Value::Object(dto)) => dto,
            Some(Value::Null) => return Ok(None),
            Some(other) => {
                return Err(TranscodeError::Shape(format!(
                    "dailySleepDTO is {}",
                    kind(other)
                )))
            }
            None => outer,
        };

        let sleep_time_seconds = num(dto.get("sleepTimeSeconds"));
        let sleep_start = int(dto.get("sleepStartTimestampGMT"));
        if sleep_time_seconds.is_none() && sleep_start.is_none() {
            return Ok(None);
        }

        // SpO2 and respiration sometimes sit beside the DTO instead of in it
        let either = |name: &str| num(dto.get(name)).or_else(|| num(outer.get(name)));

        Ok(Some(SleepRecord {
            calendar_date: calendar_date(dto, key)?,
            sleep_start_timestamp_gmt: sleep_start,
            sleep_end_timestamp_gmt: int(dto.get("sleepEndTimestampGMT")),
            sleep_time_seconds,
            deep_sleep_seconds: num(dto.get("deepSleepSeconds")),
            light_sleep_seconds: num(dto.get("lightSleepSeconds")),
            rem_sleep_seconds: num(dto.get("remSleepSeconds")),
            awake_sleep_seconds: num(dto.get("awakeSleepSeconds")),
            average_spo2_value: either("averageSpO2Value"),
            lowest_spo2_value: either("lowestSpO2Value"),
            average_respiration_value: either("averageRespirationValue"),
            average_heart_rate: either("averageHeartRate").or_else(|| either("avgHeartRate")),
            sleep_score: dto
                .get("sleepScores")
                .and_then(|s| s.get("overall"))
                .and_then(|o| num(o.get("value"))),
        }))
    }

    fn weight(&self, key: &str, payload: &Value) -> Result<Vec<WeightRecord>, TranscodeError> {
        let entries: Vec<&Value> = match payload {
            Value::Array(items) => items.iter().collect(),
            Value::Object(obj) => match obj.get("dateWeightList") {
                Some(Value::Array(items)) => items.iter().collect(),
                Some(other) => {
                    return Err(TranscodeError::Shape(format!(
                        "dateWeightList is {}",
                        kind(other)
                    )))
                }
                None => vec![payload],
            },
            other => {
                return Err(TranscodeError::Shape(format!(
                    "weight payload is {}",
                    kind(other)
                )))
            }
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let obj = object(entry, "weight entry")?;
            if num(obj.get("weight")).is_none() {
                continue;
            }
            let mut record = WeightRecord {
                date: obj.get("date").and_then(day_of),
                calendar_date: text(obj.get("calendarDate")),
                sample_pk: uint(obj.get("samplePk")),
                timestamp_gmt: int(obj.get("timestampGMT")),
                weight: num(obj.get("weight")),
                bmi: num(obj.get("bmi")),
                body_fat: num(obj.get("bodyFat")),
                body_water: num(obj.get("bodyWater")),
                bone_mass: num(obj.get("boneMass")),
                muscle_mass: num(obj.get("muscleMass")),
                source_type: text(obj.get("sourceType")),
            };
            if record.date.is_none() && record.calendar_date.is_none() {
                if !is_iso_day(key) {
                    return Err(TranscodeError::MissingField("calendarDate"));
                }
                record.calendar_date = Some(key.to_string());
            }
            records.push(record);
        }
        Ok(records)
    }

    fn resting_heart_rate(
        &self,
        key: &str,
        payload: &Value,
    ) -> Result<Option<RestingHeartRateRecord>, TranscodeError> {
        let obj = match payload {
            Value::Array(items) => match items.first() {
                Some(first) => object(first, "resting heart rate")?,
                None => return Ok(None),
            },
            other => object(other, "resting heart rate")?,
        };

        // Flat shape: {"calendarDate": ..., "restingHeartRate": ...}
        if let Some(bpm) = num(obj.get("restingHeartRate")).filter(|v| *v > 0.0) {
            return Ok(Some(RestingHeartRateRecord {
                calendar_date: calendar_date(obj, key)?,
                resting_heart_rate: bpm,
            }));
        }

        // Stats shape: {"allMetrics": {"metricsMap": {"WELLNESS_RESTING_HEART_RATE": [...]}}}
        let sample = obj
            .get("allMetrics")
            .and_then(|m| m.get("metricsMap"))
            .and_then(|m| m.get(RHR_METRIC))
            .and_then(Value::as_array)
            .and_then(|samples| samples.first());
        let Some(Value::Object(sample)) = sample else {
            return Ok(None);
        };
        let Some(bpm) = num(sample.get("value")).filter(|v| *v > 0.0) else {
            return Ok(None);
        };
        Ok(Some(RestingHeartRateRecord {
            calendar_date: calendar_date(sample, key)?,
            resting_heart_rate: bpm,
        }))
    }
}

/// Laps from `{"lapDTOs": [...]}` or a bare list.
fn lap_records(payload: &Value) -> Vec<LapRecord> {
    list_under(payload, "lapDTOs")
        .iter()
        .filter_map(|lap| {
            let lap = lap.as_object()?;
            Some(LapRecord {
                lap_index: uint(lap.get("lapIndex")).and_then(|n| u32::try_from(n).ok()),
                start_time_gmt: text(lap.get("startTimeGMT")),
                distance: num(lap.get("distance")),
                duration: num(lap.get("duration")),
                average_speed: num(lap.get("averageSpeed")),
                average_hr: num(lap.get("averageHR")),
            })
        })
        .collect()
}

/// Split summaries from `{"splitSummaries": [...]}` or a bare list.
fn split_records(payload: &Value) -> Vec<SplitRecord> {
    list_under(payload, "splitSummaries")
        .iter()
        .filter_map(|split| {
            let split = split.as_object()?;
            Some(SplitRecord {
                split_type: text(split.get("splitType")),
                no_of_splits: uint(split.get("noOfSplits")).and_then(|n| u32::try_from(n).ok()),
                distance: num(split.get("distance")),
                duration: num(split.get("duration")),
                average_speed: num(split.get("averageSpeed")),
            })
        })
        .collect()
}

fn list_under<'a>(payload: &'a Value, field: &str) -> &'a [Value] {
    match payload {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

fn object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, TranscodeError> {
    value
        .as_object()
        .ok_or_else(|| TranscodeError::Shape(format!("{what} payload is {}", kind(value))))
}

/// `calendarDate` from the payload, else the cache key when it is a day.
fn calendar_date(obj: &Map<String, Value>, key: &str) -> Result<String, TranscodeError> {
    if let Some(date) = obj.get("calendarDate").and_then(day_of) {
        return Ok(date);
    }
    if is_iso_day(key) {
        return Ok(key.to_string());
    }
    Err(TranscodeError::MissingField("calendarDate"))
}

/// Normalize a day field: epoch milliseconds or a date/datetime string.
pub(crate) fn day_of(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => {
            day_from_epoch_millis(n.as_i64()?).map(|day| day.to_string())
        }
        Value::String(s) => {
            let day = s.get(..10).unwrap_or(s);
            is_iso_day(day).then(|| day.to_string())
        }
        _ => None,
    }
}

fn is_iso_day(s: &str) -> bool {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn num(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

fn int(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

fn uint(value: Option<&Value>) -> Option<u64> {
    let value = value?;
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

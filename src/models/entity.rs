// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Entity types and cache artifact variants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::collections;

/// One kind of health or activity record synced from Garmin Connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Activity,
    DailySummary,
    Sleep,
    Weight,
    RestingHeartRate,
}

impl EntityType {
    /// All entity types in download/import order.
    pub const ALL: [EntityType; 5] = [
        EntityType::Activity,
        EntityType::DailySummary,
        EntityType::Sleep,
        EntityType::Weight,
        EntityType::RestingHeartRate,
    ];

    /// Directory name under the cache base dir.
    pub fn dir_name(self) -> &'static str {
        match self {
            EntityType::Activity => "activities",
            EntityType::DailySummary => "daily_summary",
            EntityType::Sleep => "sleep",
            EntityType::Weight => "weight",
            EntityType::RestingHeartRate => "rhr",
        }
    }

    /// Store collection holding this entity's canonical records.
    pub fn collection(self) -> &'static str {
        match self {
            EntityType::Activity => collections::ACTIVITIES,
            EntityType::DailySummary => collections::DAILY_SUMMARY,
            EntityType::Sleep => collections::SLEEP,
            EntityType::Weight => collections::WEIGHT,
            EntityType::RestingHeartRate => collections::RESTING_HEART_RATE,
        }
    }

    /// Key used in the `enabled_stats` and `data.<key>_start_date` settings.
    pub fn config_key(self) -> &'static str {
        match self {
            EntityType::Activity => "activities",
            EntityType::DailySummary => "monitoring",
            EntityType::Sleep => "sleep",
            EntityType::Weight => "weight",
            EntityType::RestingHeartRate => "rhr",
        }
    }

    /// Dense index for per-entity counter arrays.
    pub fn index(self) -> usize {
        match self {
            EntityType::Activity => 0,
            EntityType::DailySummary => 1,
            EntityType::Sleep => 2,
            EntityType::Weight => 3,
            EntityType::RestingHeartRate => 4,
        }
    }

    /// Entities fetched one calendar day per task.
    pub fn is_date_bucketed(self) -> bool {
        matches!(
            self,
            EntityType::DailySummary | EntityType::Sleep | EntityType::RestingHeartRate
        )
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Which payload shape a cached artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variant {
    Summary,
    Details,
    Splits,
    Laps,
}

impl Variant {
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Summary => "summary",
            Variant::Details => "details",
            Variant::Splits => "splits",
            Variant::Laps => "laps",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(Variant::Summary),
            "details" => Ok(Variant::Details),
            "splits" => Ok(Variant::Splits),
            "laps" => Ok(Variant::Laps),
            other => Err(format!("unknown artifact variant: {other}")),
        }
    }
}

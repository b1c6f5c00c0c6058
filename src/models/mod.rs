// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the sync engine.

pub mod entity;
pub mod records;
pub mod session;

pub use entity::{EntityType, Variant};
pub use records::{
    ActivityRecord, CanonicalRecord, DailySummaryRecord, LapRecord, RestingHeartRateRecord,
    SleepRecord, SplitRecord, WeightRecord,
};
pub use session::{Session, UserProfile};

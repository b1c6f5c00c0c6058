// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin-Sync: incremental Garmin Connect to Firestore synchronization
//!
//! This crate downloads a user's activities and daily health data from
//! Garmin Connect into a local JSON cache, then imports the cache into a
//! document store without creating duplicates.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer: the canonical record store.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{CanonicalRecord, EntityType};

/// Collection names as constants.
pub mod collections {
    pub const ACTIVITIES: &str = "activities";
    pub const DAILY_SUMMARY: &str = "daily_summary";
    pub const SLEEP: &str = "sleep";
    pub const WEIGHT: &str = "weight";
    pub const RESTING_HEART_RATE: &str = "resting_heart_rate";
}

/// Document field names used in queries.
pub mod fields {
    pub const CALENDAR_DATE: &str = "calendarDate";
    pub const DATE: &str = "date";
    pub const START_TIME_GMT: &str = "startTimeGMT";
}

/// What a single write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    /// A record with the same identity already existed and was left alone
    Skipped,
}

/// Storage for canonical records, one collection per entity type.
///
/// Document ids are the records' identity keys, so a collection can never
/// hold two records with the same key.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert the record, or overwrite the existing one with the same key.
    async fn upsert<R: CanonicalRecord>(&self, record: &R) -> Result<WriteOutcome, StoreError>;

    /// Insert the record unless one with the same key exists.
    async fn insert_if_absent<R: CanonicalRecord>(
        &self,
        record: &R,
    ) -> Result<WriteOutcome, StoreError>;

    /// Whether any record in `entity`'s collection has `field == value`.
    async fn exists_where(
        &self,
        entity: EntityType,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError>;

    async fn get<R: CanonicalRecord>(&self, key: &str) -> Result<Option<R>, StoreError>;

    /// The record with the greatest ordering field value.
    async fn latest<R: CanonicalRecord>(&self) -> Result<Option<R>, StoreError>;

    async fn count(&self, entity: EntityType) -> Result<usize, StoreError>;
}

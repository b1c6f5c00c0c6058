// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cache to store reconciliation.
//!
//! Artifacts are read in sorted key order, transcoded, and written with a
//! per-entity policy:
//! - Activity, daily summary, sleep, resting heart rate: upsert by key
//! - Weight: skip if a document already holds the day under either
//!   `calendarDate` or `date`, otherwise insert
//!
//! Bad artifacts and single failed writes are counted and skipped. A store
//! that cannot be reached at all aborts the import.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::{fields, RecordStore, WriteOutcome};
use crate::error::{StoreError, SyncError, TranscodeError};
use crate::models::{CanonicalRecord, EntityType, Variant, WeightRecord};
use crate::services::cache::{ArtifactCache, CachedArtifact};
use crate::services::transcode::{ActivityPayload, RecordTranscoder};

/// Per-entity outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub entity: Option<EntityType>,
    pub inserted: u64,
    pub updated: u64,
    /// Records left alone because an equivalent document exists
    pub skipped: u64,
    /// Artifacts with no measurement in them
    pub empty: u64,
    pub failed: u64,
}

impl ImportReport {
    fn new(entity: EntityType) -> Self {
        Self {
            entity: Some(entity),
            ..Self::default()
        }
    }

    /// Records newly written or refreshed.
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }

    /// Nothing could be imported and at least one item failed.
    pub fn is_complete_failure(&self) -> bool {
        self.written() == 0 && self.skipped == 0 && self.failed > 0
    }

    fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Inserted => self.inserted += 1,
            WriteOutcome::Updated => self.updated += 1,
            WriteOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// The cached artifacts of one key, grouped by variant.
#[derive(Debug, Default)]
struct KeyArtifacts<'a> {
    summary: Option<&'a CachedArtifact>,
    details: Option<&'a CachedArtifact>,
    laps: Option<&'a CachedArtifact>,
    splits: Option<&'a CachedArtifact>,
}

fn group_by_key(artifacts: &[CachedArtifact]) -> BTreeMap<&str, KeyArtifacts<'_>> {
    let mut grouped: BTreeMap<&str, KeyArtifacts<'_>> = BTreeMap::new();
    for artifact in artifacts {
        let slot = grouped.entry(artifact.key.as_str()).or_default();
        match artifact.variant {
            Variant::Summary => slot.summary = Some(artifact),
            Variant::Details => slot.details = Some(artifact),
            Variant::Laps => slot.laps = Some(artifact),
            Variant::Splits => slot.splits = Some(artifact),
        }
    }
    grouped
}

pub struct Importer<S: RecordStore, T: RecordTranscoder> {
    store: Arc<S>,
    cache: ArtifactCache,
    transcoder: T,
}

impl<S: RecordStore, T: RecordTranscoder> Importer<S, T> {
    pub fn new(store: Arc<S>, cache: ArtifactCache, transcoder: T) -> Self {
        Self {
            store,
            cache,
            transcoder,
        }
    }

    pub async fn import_all(&self, entities: &[EntityType]) -> Result<Vec<ImportReport>, SyncError> {
        let mut reports = Vec::with_capacity(entities.len());
        for &entity in entities {
            reports.push(self.import_entity(entity).await?);
        }
        Ok(reports)
    }

    /// Import every cached artifact of one entity type.
    pub async fn import_entity(&self, entity: EntityType) -> Result<ImportReport, SyncError> {
        let artifacts = self.cache.list(entity).await?;
        let grouped = group_by_key(&artifacts);
        tracing::info!(%entity, keys = grouped.len(), "Importing cached artifacts");

        let mut report = ImportReport::new(entity);
        for (key, group) in grouped {
            let result = match entity {
                EntityType::Activity => self.import_activity(key, &group, &mut report).await,
                EntityType::Weight => self.import_weight(key, &group, &mut report).await,
                _ => self.import_daily(entity, key, &group, &mut report).await,
            };
            match result {
                Ok(()) => {}
                Err(ItemError::Store(e)) if e.is_systemic() => {
                    tracing::error!(%entity, key, error = %e, "Store unreachable, aborting import");
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::warn!(%entity, key, error = %e, "Import failed, skipping");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            %entity,
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            empty = report.empty,
            failed = report.failed,
            "Import finished"
        );
        Ok(report)
    }

    async fn load(&self, artifact: Option<&CachedArtifact>) -> Result<Option<Value>, ItemError> {
        let Some(artifact) = artifact else {
            return Ok(None);
        };
        self.cache
            .get(&artifact.path)
            .await
            .map(Some)
            .ok_or_else(|| ItemError::Unreadable(artifact.path.display().to_string()))
    }

    /// Details win over the summary; laps and splits are optional extras.
    async fn import_activity(
        &self,
        key: &str,
        group: &KeyArtifacts<'_>,
        report: &mut ImportReport,
    ) -> Result<(), ItemError> {
        let primary = match self.load(group.details).await {
            Ok(Some(details)) => Some(details),
            Ok(None) => self.load(group.summary).await?,
            Err(e) if group.summary.is_some() => {
                tracing::warn!(key, error = %e, "Falling back to activity summary");
                self.load(group.summary).await?
            }
            Err(e) => return Err(e),
        };
        let Some(primary) = primary else {
            tracing::debug!(key, "Only laps/splits cached for activity, skipping");
            return Ok(());
        };

        let laps = self.load(group.laps).await.unwrap_or(None);
        let splits = self.load(group.splits).await.unwrap_or(None);
        let payload = ActivityPayload::decode(primary)?;

        match self
            .transcoder
            .activity(&payload, laps.as_ref(), splits.as_ref())?
        {
            Some(record) => report.record(self.store.upsert(&record).await?),
            None => report.empty += 1,
        }
        Ok(())
    }

    async fn import_daily(
        &self,
        entity: EntityType,
        key: &str,
        group: &KeyArtifacts<'_>,
        report: &mut ImportReport,
    ) -> Result<(), ItemError> {
        let Some(payload) = self.load(group.summary).await? else {
            return Ok(());
        };

        let outcome = match entity {
            EntityType::DailySummary => {
                upsert_some(&*self.store, self.transcoder.daily_summary(key, &payload)?).await?
            }
            EntityType::Sleep => {
                upsert_some(&*self.store, self.transcoder.sleep(key, &payload)?).await?
            }
            EntityType::RestingHeartRate => {
                upsert_some(
                    &*self.store,
                    self.transcoder.resting_heart_rate(key, &payload)?,
                )
                .await?
            }
            EntityType::Activity | EntityType::Weight => {
                return Err(ItemError::Transcode(TranscodeError::Shape(format!(
                    "{entity} is not a daily rollup"
                ))))
            }
        };

        match outcome {
            Some(outcome) => report.record(outcome),
            None => report.empty += 1,
        }
        Ok(())
    }

    async fn import_weight(
        &self,
        key: &str,
        group: &KeyArtifacts<'_>,
        report: &mut ImportReport,
    ) -> Result<(), ItemError> {
        let Some(payload) = self.load(group.summary).await? else {
            return Ok(());
        };
        let records = self.transcoder.weight(key, &payload)?;
        if records.is_empty() {
            report.empty += 1;
            return Ok(());
        }

        for record in records {
            report.record(self.insert_weight(&record).await?);
        }
        Ok(())
    }

    async fn insert_weight(&self, record: &WeightRecord) -> Result<WriteOutcome, StoreError> {
        let day = record.identity_key();
        if day.is_empty() {
            return Err(StoreError::Write("weigh-in without a day".to_string()));
        }
        for field in [fields::CALENDAR_DATE, fields::DATE] {
            if self
                .store
                .exists_where(EntityType::Weight, field, &day)
                .await?
            {
                tracing::debug!(day = %day, field, "Weigh-in already stored, skipping");
                return Ok(WriteOutcome::Skipped);
            }
        }
        self.store.insert_if_absent(record).await
    }
}

async fn upsert_some<S: RecordStore, R: CanonicalRecord>(
    store: &S,
    record: Option<R>,
) -> Result<Option<WriteOutcome>, StoreError> {
    match record {
        Some(record) => store.upsert(&record).await.map(Some),
        None => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
enum ItemError {
    #[error("unreadable artifact {0}")]
    Unreadable(String),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

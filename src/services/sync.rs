// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run orchestration: login, plan, download, import.
//!
//! Each CLI command is a sequential composition of these steps over one
//! immutable [`Config`] snapshot.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::db::RecordStore;
use crate::error::{Result, StoreError, SyncError};
use crate::models::{
    ActivityRecord, CanonicalRecord, DailySummaryRecord, EntityType, RestingHeartRateRecord,
    Session, SleepRecord, UserProfile, WeightRecord,
};
use crate::services::cache::ArtifactCache;
use crate::services::downloader::{DownloadOptions, DownloadReport, Downloader};
use crate::services::garmin::{paths, Connector, RemoteApi};
use crate::services::importer::{ImportReport, Importer};
use crate::services::planner::{SyncPlan, SyncPlanner};
use crate::services::session::{Authenticator, SessionManager, SessionStore};
use crate::services::transcode::RecordTranscoder;

/// Per-entity reports of one run stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReports {
    Download(Vec<DownloadReport>),
    Import(Vec<ImportReport>),
}

impl RunReports {
    pub fn stage(&self) -> &'static str {
        match self {
            RunReports::Download(_) => "download",
            RunReports::Import(_) => "import",
        }
    }
}

pub struct SyncService {
    config: Arc<Config>,
    cache: ArtifactCache,
}

impl SyncService {
    pub fn new(config: Config) -> Self {
        let cache = ArtifactCache::new(config.base_dir());
        Self {
            config: Arc::new(config),
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Restore the saved session or log in fresh as the configured user.
    pub async fn login<A: Authenticator>(&self, authenticator: A) -> Result<(Session, UserProfile)> {
        let password = self.config.password()?;
        let manager = SessionManager::new(
            SessionStore::new(self.config.session_file()),
            authenticator,
        );
        Ok(manager
            .login(&self.config.credentials.user, &password)
            .await?)
    }

    /// Save the social profile and user settings. Failures only warn.
    pub async fn save_profile<R: RemoteApi>(&self, api: &R) {
        for (name, path) in [
            ("social-profile", paths::SOCIAL_PROFILE),
            ("user-settings", paths::USER_SETTINGS),
        ] {
            match api.fetch(path, &[]).await {
                Ok(Some(payload)) => {
                    if let Err(e) = self.cache.put_profile(name, &payload).await {
                        tracing::warn!(name, error = %e, "Failed to save profile");
                    }
                }
                Ok(None) => tracing::debug!(name, "No profile data returned"),
                Err(e) => tracing::warn!(name, error = %e, "Failed to fetch profile"),
            }
        }
    }

    pub fn plan(
        &self,
        today: NaiveDate,
        latest_only: bool,
        watermarks: &BTreeMap<EntityType, NaiveDate>,
    ) -> Vec<SyncPlan> {
        let plans = SyncPlanner::new(&self.config, today, latest_only).plan_all(watermarks);
        for plan in &plans {
            tracing::info!(
                entity = %plan.entity,
                tasks = plan.tasks.len(),
                latest_only,
                "Planned"
            );
        }
        plans
    }

    /// Download the plans into the cache.
    ///
    /// Fails with `TotalFailure`, carrying the reports, when items failed and
    /// none succeeded.
    pub async fn download<C: Connector>(
        &self,
        connector: C,
        display_name: &str,
        plans: &[SyncPlan],
    ) -> Result<Vec<DownloadReport>> {
        let options = DownloadOptions {
            concurrency: self.config.sync.max_concurrency,
            display_name: display_name.to_string(),
            download_files: self.config.sync.download_activity_files,
        };
        let reports = Downloader::new(connector, self.cache.clone(), options)
            .run(plans)
            .await?;

        let succeeded: u64 = reports.iter().map(|r| r.succeeded).sum();
        let failed: u64 = reports.iter().map(|r| r.failed).sum();
        if succeeded == 0 && failed > 0 {
            tracing::error!(failed, "No download succeeded");
            return Err(SyncError::TotalFailure(RunReports::Download(reports)));
        }
        Ok(reports)
    }

    /// Import every enabled entity from the cache into `store`.
    ///
    /// Fails with `TotalFailure`, carrying the reports, when items failed and
    /// none were imported.
    pub async fn import<S: RecordStore, T: RecordTranscoder>(
        &self,
        store: Arc<S>,
        transcoder: T,
    ) -> Result<Vec<ImportReport>> {
        let importer = Importer::new(store, self.cache.clone(), transcoder);
        let reports = importer
            .import_all(&self.config.enabled_entities())
            .await?;

        let landed: u64 = reports.iter().map(|r| r.written() + r.skipped).sum();
        let failed: u64 = reports.iter().map(|r| r.failed).sum();
        if landed == 0 && failed > 0 {
            tracing::error!(failed, "No record imported");
            return Err(SyncError::TotalFailure(RunReports::Import(reports)));
        }
        Ok(reports)
    }
}

// ─── Store queries ───────────────────────────────────────────

async fn watermark<R: CanonicalRecord, S: RecordStore>(
    store: &S,
) -> std::result::Result<Option<NaiveDate>, StoreError> {
    Ok(store.latest::<R>().await?.and_then(|r| r.watermark_date()))
}

async fn entity_watermark<S: RecordStore>(
    store: &S,
    entity: EntityType,
) -> std::result::Result<Option<NaiveDate>, StoreError> {
    match entity {
        EntityType::Activity => watermark::<ActivityRecord, S>(store).await,
        EntityType::DailySummary => watermark::<DailySummaryRecord, S>(store).await,
        EntityType::Sleep => watermark::<SleepRecord, S>(store).await,
        EntityType::Weight => watermark::<WeightRecord, S>(store).await,
        EntityType::RestingHeartRate => watermark::<RestingHeartRateRecord, S>(store).await,
    }
}

/// Latest stored day per entity. Entities with no records are absent.
pub async fn load_watermarks<S: RecordStore>(
    store: &S,
    entities: &[EntityType],
) -> std::result::Result<BTreeMap<EntityType, NaiveDate>, StoreError> {
    let mut watermarks = BTreeMap::new();
    for &entity in entities {
        if let Some(day) = entity_watermark(store, entity).await? {
            tracing::debug!(%entity, watermark = %day, "Loaded watermark");
            watermarks.insert(entity, day);
        }
    }
    Ok(watermarks)
}

/// Document count and latest day of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStats {
    pub entity: EntityType,
    pub count: usize,
    pub latest: Option<NaiveDate>,
    /// Distance of the most recent activity, in meters
    pub latest_distance_m: Option<f64>,
}

pub async fn collection_stats<S: RecordStore>(
    store: &S,
    entities: &[EntityType],
) -> std::result::Result<Vec<CollectionStats>, StoreError> {
    let mut stats = Vec::with_capacity(entities.len());
    for &entity in entities {
        let latest_distance_m = match entity {
            EntityType::Activity => store
                .latest::<ActivityRecord>()
                .await?
                .and_then(|a| a.distance),
            _ => None,
        };
        stats.push(CollectionStats {
            entity,
            count: store.count(entity).await?,
            latest: entity_watermark(store, entity).await?,
            latest_distance_m,
        });
    }
    Ok(stats)
}

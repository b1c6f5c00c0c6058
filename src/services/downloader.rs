// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Concurrent downloader.
//!
//! A fixed pool of workers drains a FIFO job queue. Each worker opens its
//! own API handle once and reuses it for every job it takes. Jobs never
//! retry: a failed key is logged, counted, and picked up again by the next
//! run.
//!
//! The run has two phases on the same pool:
//! 1. Day, weight-range, and activity-page tasks from the planner
//! 2. One job per activity id discovered in phase 1

use dashmap::DashSet;
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{CacheError, FetchError, SyncError};
use crate::models::{EntityType, Variant};
use crate::services::cache::{ArtifactCache, PutOutcome};
use crate::services::garmin::{paths, Connector, RemoteApi};
use crate::services::planner::{FetchTask, SyncPlan};
use crate::services::transcode::day_of;

/// Log progress every this many completed jobs.
const PROGRESS_EVERY: u64 = 25;

/// File extension for original activity downloads (the vendor serves a zip).
const ACTIVITY_FILE_EXT: &str = "zip";

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Worker pool size
    pub concurrency: usize,
    /// Display name used in per-user API paths
    pub display_name: String,
    /// Also download the original file of each activity
    pub download_files: bool,
}

/// Per-entity outcome of a download run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub entity: Option<EntityType>,
    /// Keys fetched and cached
    pub succeeded: u64,
    /// Keys for which the remote had nothing
    pub empty: u64,
    /// Keys that failed and were skipped
    pub failed: u64,
    /// Keys skipped because the remote refuses this entity
    pub disabled: u64,
    /// Artifact files written
    pub written: u64,
    /// Artifact files already up to date
    pub unchanged: u64,
}

impl DownloadReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    /// Nothing succeeded and at least one key failed.
    pub fn is_complete_failure(&self) -> bool {
        self.succeeded == 0 && self.failed > 0
    }

    pub fn is_partial_failure(&self) -> bool {
        self.succeeded > 0 && self.failed > 0
    }
}

#[derive(Default)]
struct EntityCounters {
    succeeded: AtomicU64,
    empty: AtomicU64,
    failed: AtomicU64,
    disabled: AtomicU64,
    written: AtomicU64,
    unchanged: AtomicU64,
}

impl EntityCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn tally(&self, outcome: PutOutcome) {
        match outcome {
            PutOutcome::Written => Self::bump(&self.written, 1),
            PutOutcome::Unchanged => Self::bump(&self.unchanged, 1),
        }
    }

    fn report(&self, entity: EntityType) -> DownloadReport {
        DownloadReport {
            entity: Some(entity),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            disabled: self.disabled.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
        }
    }
}

enum Job {
    Fetch(FetchTask),
    Activity { id: u64, summary: Value },
}

/// What a successful job produced.
enum JobOutcome {
    Cached,
    Empty,
    /// An activity page; its entries were queued for phase two
    Listed(usize),
}

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Shared state of one download run.
#[derive(Default)]
struct RunState {
    queue: Mutex<VecDeque<Job>>,
    counters: [EntityCounters; 5],
    disabled: DashSet<EntityType>,
    discovered: Mutex<BTreeMap<u64, Value>>,
    queued: AtomicU64,
    completed: AtomicU64,
    abort: AtomicBool,
    abort_reason: Mutex<Option<FetchError>>,
}

impl RunState {
    fn enqueue(&self, jobs: impl IntoIterator<Item = Job>) -> usize {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let before = queue.len();
        queue.extend(jobs);
        let added = queue.len() - before;
        self.queued.fetch_add(added as u64, Ordering::Relaxed);
        added
    }

    fn next_job(&self) -> Option<Job> {
        if self.abort.load(Ordering::SeqCst) {
            return None;
        }
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn counters(&self, entity: EntityType) -> &EntityCounters {
        &self.counters[entity.index()]
    }

    fn abort_with(&self, err: FetchError) {
        if !self.abort.swap(true, Ordering::SeqCst) {
            *self.abort_reason.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
        }
    }

    fn take_abort_reason(&self) -> Option<FetchError> {
        if !self.abort.load(Ordering::SeqCst) {
            return None;
        }
        Some(
            self.abort_reason
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take()
                .unwrap_or(FetchError::Unauthorized),
        )
    }

    fn discover(&self, id: u64, summary: Value) {
        self.discovered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id)
            .or_insert(summary);
    }

    fn take_discovered(&self) -> BTreeMap<u64, Value> {
        std::mem::take(&mut *self.discovered.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn tick(&self) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if completed % PROGRESS_EVERY == 0 {
            tracing::info!(
                completed,
                queued = self.queued.load(Ordering::Relaxed),
                "Download progress"
            );
        }
    }
}

pub struct Downloader<C: Connector> {
    connector: C,
    cache: ArtifactCache,
    options: DownloadOptions,
}

impl<C: Connector> Downloader<C> {
    pub fn new(connector: C, cache: ArtifactCache, options: DownloadOptions) -> Self {
        Self {
            connector,
            cache,
            options,
        }
    }

    /// Execute the plans and report per entity, in plan order.
    ///
    /// Per-key failures are counted; only an authentication failure (or a
    /// worker that cannot open a connection) aborts the run.
    pub async fn run(&self, plans: &[SyncPlan]) -> Result<Vec<DownloadReport>, SyncError> {
        let state = RunState::default();

        let tasks = state.enqueue(
            plans
                .iter()
                .flat_map(|plan| plan.tasks.iter().cloned().map(Job::Fetch)),
        );
        tracing::info!(
            tasks,
            workers = self.options.concurrency,
            "Starting download"
        );
        self.drain(&state).await?;

        let discovered = state.take_discovered();
        if !discovered.is_empty() {
            tracing::info!(activities = discovered.len(), "Downloading activity details");
            state.enqueue(
                discovered
                    .into_iter()
                    .map(|(id, summary)| Job::Activity { id, summary }),
            );
            self.drain(&state).await?;
        }

        let reports: Vec<DownloadReport> = plans
            .iter()
            .map(|plan| state.counters(plan.entity).report(plan.entity))
            .collect();

        for report in &reports {
            tracing::info!(
                entity = ?report.entity,
                succeeded = report.succeeded,
                empty = report.empty,
                failed = report.failed,
                disabled = report.disabled,
                written = report.written,
                unchanged = report.unchanged,
                "Download finished"
            );
        }
        Ok(reports)
    }

    /// Run the worker pool until the queue is empty or the run aborts.
    async fn drain(&self, state: &RunState) -> Result<(), SyncError> {
        let workers = self.options.concurrency.max(1).min(state.pending().max(1));
        let results = join_all((0..workers).map(|worker| self.worker(worker, state))).await;
        for result in results {
            result?;
        }

        if let Some(reason) = state.take_abort_reason() {
            tracing::error!(error = %reason, "Session rejected mid-run, aborting download");
            return Err(SyncError::SessionExpired(reason));
        }
        Ok(())
    }

    async fn worker(&self, worker: usize, state: &RunState) -> Result<(), SyncError> {
        let api = self.connector.connect().map_err(|e| {
            SyncError::Internal(anyhow::anyhow!(
                "worker {worker} failed to open a connection: {e}"
            ))
        })?;

        while let Some(job) = state.next_job() {
            let (entity, key) = match &job {
                Job::Fetch(task) => (task.entity(), task.key()),
                Job::Activity { id, .. } => (EntityType::Activity, id.to_string()),
            };
            let counters = state.counters(entity);

            if state.disabled.contains(&entity) {
                EntityCounters::bump(&counters.disabled, 1);
                state.tick();
                continue;
            }

            let result = match job {
                Job::Fetch(task) => self.fetch_task(&api, state, &task).await,
                Job::Activity { id, summary } => {
                    self.fetch_activity(&api, counters, id, summary).await
                }
            };

            match result {
                Ok(JobOutcome::Cached) => EntityCounters::bump(&counters.succeeded, 1),
                Ok(JobOutcome::Empty) => EntityCounters::bump(&counters.empty, 1),
                Ok(JobOutcome::Listed(count)) => {
                    tracing::debug!(worker, page = %key, count, "Listed activities");
                }
                Err(JobError::Fetch(e)) if e.is_auth_error() => {
                    EntityCounters::bump(&counters.failed, 1);
                    state.abort_with(e);
                }
                Err(JobError::Fetch(e)) if e.is_policy_denied() => {
                    if state.disabled.insert(entity) {
                        tracing::warn!(
                            %entity,
                            error = %e,
                            "Entity disabled by remote policy, skipping its remaining keys"
                        );
                    }
                    EntityCounters::bump(&counters.disabled, 1);
                }
                Err(e) => {
                    tracing::warn!(worker, %entity, key = %key, error = %e, "Download failed, skipping");
                    EntityCounters::bump(&counters.failed, 1);
                }
            }
            state.tick();
        }
        Ok(())
    }

    async fn fetch_task<A: RemoteApi>(
        &self,
        api: &A,
        state: &RunState,
        task: &FetchTask,
    ) -> Result<JobOutcome, JobError> {
        let counters = state.counters(task.entity());
        match *task {
            FetchTask::Day { entity, date } => {
                let day = date.to_string();
                let display_name = &self.options.display_name;
                let (path, query) = match entity {
                    EntityType::DailySummary => (
                        paths::daily_summary(display_name),
                        vec![("calendarDate", day.clone())],
                    ),
                    EntityType::Sleep => (paths::sleep(display_name), vec![("date", day.clone())]),
                    EntityType::RestingHeartRate => (
                        paths::resting_heart_rate(display_name),
                        vec![
                            ("fromDate", day.clone()),
                            ("untilDate", day.clone()),
                            ("metricId", "60".to_string()),
                        ],
                    ),
                    EntityType::Activity | EntityType::Weight => {
                        return Err(FetchError::Decode(format!("{entity} is not fetched by day")).into())
                    }
                };

                let Some(payload) = api.fetch(&path, &query).await? else {
                    return Ok(JobOutcome::Empty);
                };
                counters.tally(self.cache.put(entity, &day, Variant::Summary, &payload).await?);
                Ok(JobOutcome::Cached)
            }

            FetchTask::WeightRange { start, end } => {
                let query = [("startDate", start.to_string()), ("endDate", end.to_string())];
                let Some(payload) = api.fetch(paths::WEIGHT_RANGE, &query).await? else {
                    return Ok(JobOutcome::Empty);
                };
                let days = split_weight_by_day(&payload);
                if days.is_empty() {
                    return Ok(JobOutcome::Empty);
                }
                for (day, sample) in &days {
                    counters.tally(
                        self.cache
                            .put(EntityType::Weight, day, Variant::Summary, sample)
                            .await?,
                    );
                }
                tracing::info!(days = days.len(), %start, %end, "Cached weigh-ins");
                Ok(JobOutcome::Cached)
            }

            FetchTask::ActivityPage { start, limit } => {
                let query = [("start", start.to_string()), ("limit", limit.to_string())];
                let Some(payload) = api.fetch(paths::ACTIVITY_SEARCH, &query).await? else {
                    return Ok(JobOutcome::Empty);
                };
                let Value::Array(items) = payload else {
                    return Err(FetchError::Decode("activity search did not return a list".into()).into());
                };
                if items.is_empty() {
                    return Ok(JobOutcome::Empty);
                }

                let count = items.len();
                for item in items {
                    match item.get("activityId").and_then(Value::as_u64) {
                        Some(id) => state.discover(id, item),
                        None => {
                            tracing::warn!(page = start, "Activity list entry without activityId");
                            EntityCounters::bump(&counters.failed, 1);
                        }
                    }
                }
                Ok(JobOutcome::Listed(count))
            }
        }
    }

    /// Cache one activity: summary, merged details, laps, splits, and
    /// optionally the original file. Only the summary is required; the rest
    /// is best effort unless the session itself is rejected.
    async fn fetch_activity<A: RemoteApi>(
        &self,
        api: &A,
        counters: &EntityCounters,
        id: u64,
        summary: Value,
    ) -> Result<JobOutcome, JobError> {
        let key = id.to_string();
        let entity = EntityType::Activity;
        counters.tally(self.cache.put(entity, &key, Variant::Summary, &summary).await?);

        if let Some(details) = best_effort(api.fetch(&paths::activity(id), &[]).await, id, "details")? {
            let merged = merge_details(&summary, details);
            match self.cache.put(entity, &key, Variant::Details, &merged).await {
                Ok(outcome) => counters.tally(outcome),
                Err(e) => {
                    tracing::warn!(activity_id = id, error = %e, "Failed to cache activity details")
                }
            }
        }

        for (variant, path) in [
            (Variant::Laps, paths::activity_laps(id)),
            (Variant::Splits, paths::activity_splits(id)),
        ] {
            let Some(payload) = best_effort(api.fetch(&path, &[]).await, id, variant.as_str())?
            else {
                continue;
            };
            match self.cache.put(entity, &key, variant, &payload).await {
                Ok(outcome) => counters.tally(outcome),
                Err(e) => {
                    tracing::warn!(activity_id = id, %variant, error = %e, "Failed to cache activity payload")
                }
            }
        }

        if self.options.download_files {
            let file = best_effort(
                api.fetch_binary(&paths::activity_file(id)).await,
                id,
                "file",
            )?;
            if let Some(bytes) = file {
                match self.cache.put_file(entity, &key, ACTIVITY_FILE_EXT, &bytes).await {
                    Ok(outcome) => counters.tally(outcome),
                    Err(e) => {
                        tracing::warn!(activity_id = id, error = %e, "Failed to save activity file")
                    }
                }
            }
        }

        Ok(JobOutcome::Cached)
    }
}

/// Swallow a secondary fetch failure unless the session was rejected.
fn best_effort<T>(
    result: Result<Option<T>, FetchError>,
    activity_id: u64,
    what: &str,
) -> Result<Option<T>, FetchError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_auth_error() => Err(e),
        Err(e) => {
            tracing::warn!(activity_id, what, error = %e, "Optional activity payload unavailable");
            Ok(None)
        }
    }
}

/// Overlay a details payload on the list summary; details win on collisions.
pub fn merge_details(summary: &Value, details: Value) -> Value {
    match (summary, details) {
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            merged.extend(overlay);
            Value::Object(merged)
        }
        (_, details) => details,
    }
}

/// Split a weight range response into one sample per day.
///
/// Accepts `{"dateWeightList": [...]}` or a bare list. When a day has
/// several weigh-ins, the one with the latest timestamp wins.
pub fn split_weight_by_day(payload: &Value) -> BTreeMap<String, Value> {
    let entries: &[Value] = match payload {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("dateWeightList")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    };

    let mut days: BTreeMap<String, Value> = BTreeMap::new();
    for entry in entries {
        let day = entry
            .get("calendarDate")
            .and_then(day_of)
            .or_else(|| entry.get("date").and_then(day_of));
        let Some(day) = day else {
            tracing::debug!("Weigh-in without a date, skipping");
            continue;
        };
        let newer = days
            .get(&day)
            .map_or(true, |current| sample_time(entry) >= sample_time(current));
        if newer {
            days.insert(day, entry.clone());
        }
    }
    days
}

fn sample_time(sample: &Value) -> i64 {
    sample
        .get("timestampGMT")
        .or_else(|| sample.get("date"))
        .and_then(Value::as_i64)
        .unwrap_or(i64::MIN)
}

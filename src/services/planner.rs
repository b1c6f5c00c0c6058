// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync planning: which days, ranges, and pages to fetch.
//!
//! Pure computation over the configuration, the current date, and the
//! store watermarks. No network or disk access happens here.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::models::EntityType;

/// One unit of download work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTask {
    /// A single calendar day of a date-bucketed entity
    Day { entity: EntityType, date: NaiveDate },
    /// One page of the activity list, `start` is the zero-based offset
    ActivityPage { start: u32, limit: u32 },
    /// All weigh-ins between two days, inclusive
    WeightRange { start: NaiveDate, end: NaiveDate },
}

impl FetchTask {
    pub fn entity(&self) -> EntityType {
        match self {
            FetchTask::Day { entity, .. } => *entity,
            FetchTask::ActivityPage { .. } => EntityType::Activity,
            FetchTask::WeightRange { .. } => EntityType::Weight,
        }
    }

    /// Cache/log key for this task.
    pub fn key(&self) -> String {
        match self {
            FetchTask::Day { date, .. } => date.to_string(),
            FetchTask::ActivityPage { start, limit } => format!("{start}+{limit}"),
            FetchTask::WeightRange { start, end } => format!("{start}..{end}"),
        }
    }
}

/// Ordered fetch tasks for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub entity: EntityType,
    pub tasks: Vec<FetchTask>,
}

impl SyncPlan {
    fn empty(entity: EntityType) -> Self {
        Self {
            entity,
            tasks: Vec::new(),
        }
    }
}

pub struct SyncPlanner<'a> {
    config: &'a Config,
    today: NaiveDate,
    latest_only: bool,
}

impl<'a> SyncPlanner<'a> {
    pub fn new(config: &'a Config, today: NaiveDate, latest_only: bool) -> Self {
        Self {
            config,
            today,
            latest_only,
        }
    }

    /// Plans for every enabled entity, in download order.
    pub fn plan_all(&self, watermarks: &BTreeMap<EntityType, NaiveDate>) -> Vec<SyncPlan> {
        self.config
            .enabled_entities()
            .into_iter()
            .map(|entity| self.plan(entity, watermarks.get(&entity).copied()))
            .collect()
    }

    pub fn plan(&self, entity: EntityType, watermark: Option<NaiveDate>) -> SyncPlan {
        if !self.config.is_enabled(entity) {
            return SyncPlan::empty(entity);
        }

        let tasks = match entity {
            EntityType::Activity => self.activity_pages(),
            EntityType::Weight => match self.config.start_date(entity) {
                Some(start) if start <= self.today => vec![FetchTask::WeightRange {
                    start,
                    end: self.today,
                }],
                _ => Vec::new(),
            },
            _ => match self.config.start_date(entity) {
                Some(start) => {
                    let start = self.window_start(start, watermark);
                    days(start, self.today)
                        .map(|date| FetchTask::Day { entity, date })
                        .collect()
                }
                None => Vec::new(),
            },
        };

        SyncPlan { entity, tasks }
    }

    /// First day of a date-bucketed window.
    ///
    /// Full runs start at the configured date. Latest-only runs are capped to
    /// `latest_days` and also skip days well behind the watermark.
    fn window_start(&self, configured: NaiveDate, watermark: Option<NaiveDate>) -> NaiveDate {
        if !self.latest_only {
            return configured;
        }
        let sync = &self.config.sync;
        let cap = self.today - Duration::days(i64::from(sync.latest_days) - 1);
        let mut start = configured.max(cap);
        if let Some(watermark) = watermark {
            start = start.max(watermark - Duration::days(i64::from(sync.overlap_days)));
        }
        start
    }

    fn activity_pages(&self) -> Vec<FetchTask> {
        let total = if self.latest_only {
            self.config.data.download_latest_activities
        } else {
            self.config.data.download_all_activities
        };
        let page = self.config.sync.activity_page_size.max(1);

        (0..total)
            .step_by(page as usize)
            .map(|start| FetchTask::ActivityPage {
                start,
                limit: page.min(total - start),
            })
            .collect()
    }
}

/// Inclusive day range; empty when `start > end`.
fn days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - sync engine layer.

pub mod cache;
pub mod downloader;
pub mod garmin;
pub mod importer;
pub mod planner;
pub mod session;
pub mod sync;
pub mod transcode;

pub use cache::{ArtifactCache, CachedArtifact, PutOutcome};
pub use downloader::{DownloadOptions, DownloadReport, Downloader};
pub use garmin::{ConnectClient, Connector, PasswordAuthenticator, RemoteApi, SessionConnector};
pub use importer::{ImportReport, Importer};
pub use planner::{FetchTask, SyncPlan, SyncPlanner};
pub use session::{Authenticator, SessionManager, SessionStore};
pub use sync::{collection_stats, load_watermarks, CollectionStats, RunReports, SyncService};
pub use transcode::{ActivityPayload, ConnectTranscoder, RecordTranscoder};

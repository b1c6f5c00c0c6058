// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for every stage of a sync run.
//!
//! Per-item errors (`FetchError`, `CacheError`, `TranscodeError`,
//! `StoreError::Write`) are caught at the item boundary and counted.
//! Only configuration, authentication and systemic store failures
//! surface as a `SyncError` and abort the run.

use reqwest::StatusCode;
use std::path::PathBuf;

use crate::services::RunReports;

/// Configuration errors. Always fatal, raised before any network or disk work.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Configuration file not found: {}\n\
         Copy garmin_config.json.example to that path and fill in your account details.",
        .0.display()
    )]
    NotFound(PathBuf),

    #[error("Failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Authentication failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Credentials rejected for {0}")]
    Rejected(String),

    #[error("Session rejected by remote")]
    SessionRejected,

    #[error("Authentication transport error: {0}")]
    Transport(String),

    #[error("Failed to persist session: {0}")]
    Persist(String),
}

/// Errors from a single remote call.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Unauthorized (401)")]
    Unauthorized,

    #[error("Forbidden by remote policy (403): {0}")]
    Forbidden(String),

    #[error("Rate limited (429)")]
    RateLimited,

    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Response decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// True for failures that mean the session token is no longer usable.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, FetchError::Unauthorized)
    }

    /// True when the remote refuses the endpoint for this account or region.
    pub fn is_policy_denied(&self) -> bool {
        matches!(self, FetchError::Forbidden(_))
    }
}

/// Local artifact cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),
}

/// A payload that cannot be mapped onto a canonical record.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unexpected payload shape: {0}")]
    Shape(String),
}

/// Document store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store cannot be reached at all. Aborts the run.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A single document write or read failed.
    #[error("Store write failed: {0}")]
    Write(String),

    #[error("Document (de)serialization failed: {0}")]
    Serde(String),
}

impl StoreError {
    pub fn is_systemic(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Run-level error: anything that aborts a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Session expired during download: {0}")]
    SessionExpired(FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Every {} item failed", .0.stage())]
    TotalFailure(RunReports),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        1
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, SyncError::Auth(_) | SyncError::SessionExpired(_))
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

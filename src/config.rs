// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync configuration loaded from a JSON settings file and the environment.
//!
//! The file is read once at startup; the resulting `Config` is an
//! immutable snapshot for the whole run. `GARMIN_USER`, `GARMIN_PASSWORD`
//! and `GCP_PROJECT_ID` (also read from `.env`) override the file.

use chrono::NaiveDate;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use validator::Validate;

pub use crate::error::ConfigError;
use crate::models::EntityType;

/// Default settings file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "garmin_config.json";

/// Name of the persisted session file inside the base directory.
pub const SESSION_FILE_NAME: &str = ".garmin_session";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub garmin: GarminSettings,
    #[serde(default)]
    #[validate(nested)]
    pub data: DataSettings,
    #[serde(default)]
    pub directories: Directories,
    #[serde(default)]
    pub enabled_stats: EnabledStats,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    #[validate(nested)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// File holding the password; wins over `password` when it exists
    pub password_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GarminSettings {
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Token endpoint override
    pub auth_url: Option<String>,
}

impl Default for GarminSettings {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            auth_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DataSettings {
    pub monitoring_start_date: Option<NaiveDate>,
    pub sleep_start_date: Option<NaiveDate>,
    pub weight_start_date: Option<NaiveDate>,
    pub rhr_start_date: Option<NaiveDate>,
    #[serde(default = "default_latest_activities")]
    #[validate(range(min = 1))]
    pub download_latest_activities: u32,
    #[serde(default = "default_all_activities")]
    #[validate(range(min = 1))]
    pub download_all_activities: u32,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            monitoring_start_date: None,
            sleep_start_date: None,
            weight_start_date: None,
            rhr_start_date: None,
            download_latest_activities: default_latest_activities(),
            download_all_activities: default_all_activities(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Directories {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

/// Per-entity enable flags. Missing flags default to enabled.
#[derive(Debug, Clone, Deserialize)]
pub struct EnabledStats {
    #[serde(default = "default_true")]
    pub activities: bool,
    #[serde(default = "default_true")]
    pub monitoring: bool,
    #[serde(default = "default_true")]
    pub sleep: bool,
    #[serde(default = "default_true")]
    pub weight: bool,
    #[serde(default = "default_true")]
    pub rhr: bool,
}

impl Default for EnabledStats {
    fn default() -> Self {
        Self {
            activities: true,
            monitoring: true,
            sleep: true,
            weight: true,
            rhr: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_true")]
    pub metric: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            metric: true,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SyncSettings {
    #[serde(default = "default_max_concurrency")]
    #[validate(range(min = 1, max = 64))]
    pub max_concurrency: usize,
    #[serde(default = "default_inter_request_delay_ms")]
    #[validate(range(max = 60_000))]
    pub inter_request_delay_ms: u64,
    /// Window length of a latest-only run
    #[serde(default = "default_latest_days")]
    #[validate(range(min = 1, max = 366))]
    pub latest_days: u32,
    /// Days re-fetched before the store watermark
    #[serde(default = "default_overlap_days")]
    #[validate(range(max = 90))]
    pub overlap_days: u32,
    #[serde(default = "default_activity_page_size")]
    #[validate(range(min = 1, max = 1000))]
    pub activity_page_size: u32,
    #[serde(default)]
    pub download_activity_files: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            inter_request_delay_ms: default_inter_request_delay_ms(),
            latest_days: default_latest_days(),
            overlap_days: default_overlap_days(),
            activity_page_size: default_activity_page_size(),
            download_activity_files: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_project_id")]
    pub project_id: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_domain() -> String {
    "garmin.com".to_string()
}
fn default_latest_activities() -> u32 {
    25
}
fn default_all_activities() -> u32 {
    1000
}
fn default_base_dir() -> PathBuf {
    PathBuf::from("mydata")
}
fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_max_concurrency() -> usize {
    8
}
fn default_inter_request_delay_ms() -> u64 {
    100
}
fn default_latest_days() -> u32 {
    30
}
fn default_overlap_days() -> u32 {
    3
}
fn default_activity_page_size() -> u32 {
    100
}
fn default_project_id() -> String {
    "local-dev".to_string()
}

impl Config {
    /// Resolve the settings file path: explicit path, then
    /// `GARMIN_SYNC_CONFIG`, then `./garmin_config.json`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os("GARMIN_SYNC_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load, override from the environment, and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let path = Self::resolve_path(explicit);
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        let mut config = Self::parse(&text)?;
        config.apply_env_overrides();
        config.require_credentials()?;

        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and range-check a settings document. No environment access.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if config.garmin.domain.trim().is_empty() {
            return Err(ConfigError::Invalid("garmin.domain is empty".to_string()));
        }
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(user) = env::var("GARMIN_USER") {
            self.credentials.user = user.trim().to_string();
        }
        if let Ok(password) = env::var("GARMIN_PASSWORD") {
            self.credentials.password = password;
        }
        if let Ok(project) = env::var("GCP_PROJECT_ID") {
            self.store.project_id = project;
        }
    }

    /// Fail unless both a username and some password source are configured.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.credentials.user.trim().is_empty() {
            return Err(ConfigError::Missing("credentials.user"));
        }
        let has_file = self
            .credentials
            .password_file
            .as_deref()
            .is_some_and(Path::exists);
        if self.credentials.password.is_empty() && !has_file {
            return Err(ConfigError::Missing("credentials.password"));
        }
        Ok(())
    }

    /// The account password, read from `password_file` when that file exists.
    pub fn password(&self) -> Result<String, ConfigError> {
        if let Some(path) = self.credentials.password_file.as_deref() {
            if path.exists() {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                return Ok(text.trim().to_string());
            }
        }
        Ok(self.credentials.password.clone())
    }

    pub fn base_dir(&self) -> &Path {
        &self.directories.base_dir
    }

    pub fn session_file(&self) -> PathBuf {
        self.base_dir().join(SESSION_FILE_NAME)
    }

    /// Connect API host, e.g. `https://connectapi.garmin.com`.
    pub fn api_base_url(&self) -> String {
        format!("https://connectapi.{}", self.garmin.domain)
    }

    pub fn auth_url(&self) -> String {
        self.garmin
            .auth_url
            .clone()
            .unwrap_or_else(|| format!("https://sso.{}/sso/token", self.garmin.domain))
    }

    /// Configured first day for a date or range entity.
    pub fn start_date(&self, entity: EntityType) -> Option<NaiveDate> {
        match entity {
            EntityType::Activity => None,
            EntityType::DailySummary => self.data.monitoring_start_date,
            EntityType::Sleep => self.data.sleep_start_date,
            EntityType::Weight => self.data.weight_start_date,
            EntityType::RestingHeartRate => self.data.rhr_start_date,
        }
    }

    pub fn is_enabled(&self, entity: EntityType) -> bool {
        let flags = &self.enabled_stats;
        match entity {
            EntityType::Activity => flags.activities,
            EntityType::DailySummary => flags.monitoring,
            EntityType::Sleep => flags.sleep,
            EntityType::Weight => flags.weight,
            EntityType::RestingHeartRate => flags.rhr,
        }
    }

    /// Enabled entity types in download/import order.
    pub fn enabled_entities(&self) -> Vec<EntityType> {
        EntityType::ALL
            .into_iter()
            .filter(|e| self.is_enabled(*e))
            .collect()
    }

    /// `tracing` level name derived from `settings.log_level`.
    pub fn log_directive(&self) -> String {
        match self.settings.log_level.to_ascii_uppercase().as_str() {
            "DEBUG" => "debug",
            "WARNING" | "WARN" => "warn",
            "ERROR" | "CRITICAL" => "error",
            "TRACE" => "trace",
            _ => "info",
        }
        .to_string()
    }

    /// Config for tests: every entity starting 2024-01-01, cache under `base_dir`.
    pub fn test_default(base_dir: impl Into<PathBuf>) -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1);
        Self {
            credentials: Credentials {
                user: "runner@example.com".to_string(),
                password: "hunter2".to_string(),
                password_file: None,
            },
            garmin: GarminSettings::default(),
            data: DataSettings {
                monitoring_start_date: start,
                sleep_start_date: start,
                weight_start_date: start,
                rhr_start_date: start,
                ..DataSettings::default()
            },
            directories: Directories {
                base_dir: base_dir.into(),
            },
            enabled_stats: EnabledStats::default(),
            settings: Settings::default(),
            sync: SyncSettings {
                inter_request_delay_ms: 0,
                ..SyncSettings::default()
            },
            store: StoreSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_takes_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config.sync.max_concurrency, 8);
        assert_eq!(config.sync.inter_request_delay_ms, 100);
        assert_eq!(config.data.download_latest_activities, 25);
        assert_eq!(config.data.download_all_activities, 1000);
        assert_eq!(config.base_dir(), Path::new("mydata"));
        assert!(config.settings.metric);
        assert!(config.is_enabled(EntityType::Sleep));
        assert_eq!(config.api_base_url(), "https://connectapi.garmin.com");
        assert!(config.require_credentials().is_err());
    }

    #[test]
    fn parses_original_layout() {
        let config = Config::parse(
            r#"{
                "credentials": {"user": "a@example.com", "password": "pw"},
                "garmin": {"domain": "garmin.cn"},
                "data": {"sleep_start_date": "2024-01-01", "download_latest_activities": 10},
                "enabled_stats": {"weight": false},
                "settings": {"metric": false, "log_level": "WARNING"}
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.start_date(EntityType::Sleep),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(config.start_date(EntityType::RestingHeartRate), None);
        assert!(!config.is_enabled(EntityType::Weight));
        assert_eq!(config.enabled_entities().len(), 4);
        assert_eq!(config.auth_url(), "https://sso.garmin.cn/sso/token");
        assert_eq!(config.log_directive(), "warn");
        assert!(config.require_credentials().is_ok());
    }

    #[test]
    fn rejects_out_of_range_concurrency() {
        let err = Config::parse(r#"{"sync": {"max_concurrency": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_dates() {
        let err = Config::parse(r#"{"data": {"sleep_start_date": "01/02/2024"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(p) if p == path));
    }

    #[test]
    fn password_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let pw = dir.path().join("pw.txt");
        std::fs::write(&pw, "from-file\n").unwrap();
        let mut config = Config::test_default(dir.path());
        config.credentials.password = String::new();
        config.credentials.password_file = Some(pw);
        assert!(config.require_credentials().is_ok());
        assert_eq!(config.password().unwrap(), "from-file");
    }
}

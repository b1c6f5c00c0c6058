// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin Connect API client.
//!
//! Handles:
//! - Authenticated JSON and binary fetches with per-request pacing
//! - Classification of 401/403/429 responses
//! - One independent HTTP client per download worker
//! - Password login against the token endpoint

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{AuthError, FetchError};
use crate::models::{Session, UserProfile};
use crate::services::session::Authenticator;

const USER_AGENT: &str = concat!("garmin-sync/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect API path templates.
pub mod paths {
    pub const SOCIAL_PROFILE: &str = "/userprofile-service/socialProfile";
    pub const USER_SETTINGS: &str = "/userprofile-service/userprofile/user-settings";
    pub const WEIGHT_RANGE: &str = "/weight-service/weight/dateRange";
    pub const ACTIVITY_SEARCH: &str = "/activitylist-service/activities/search/activities";

    pub fn daily_summary(display_name: &str) -> String {
        format!(
            "/usersummary-service/usersummary/daily/{}",
            urlencoding::encode(display_name)
        )
    }

    pub fn sleep(display_name: &str) -> String {
        format!(
            "/wellness-service/wellness/dailySleepData/{}",
            urlencoding::encode(display_name)
        )
    }

    pub fn resting_heart_rate(display_name: &str) -> String {
        format!(
            "/userstats-service/wellness/daily/{}",
            urlencoding::encode(display_name)
        )
    }

    pub fn activity(id: u64) -> String {
        format!("/activity-service/activity/{id}")
    }

    pub fn activity_laps(id: u64) -> String {
        format!("/activity-service/activity/{id}/splits")
    }

    pub fn activity_splits(id: u64) -> String {
        format!("/activity-service/activity/{id}/split_summaries")
    }

    pub fn activity_file(id: u64) -> String {
        format!("/download-service/files/activity/{id}")
    }
}

/// One authenticated handle to the remote API.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// GET a JSON document. `Ok(None)` means the remote has nothing for this
    /// path (empty body, 204, 404, or JSON `null`).
    async fn fetch(&self, path: &str, query: &[(&str, String)])
        -> Result<Option<Value>, FetchError>;

    /// GET raw bytes, e.g. an original activity file.
    async fn fetch_binary(&self, path: &str) -> Result<Option<Vec<u8>>, FetchError>;
}

/// Hands out independent API handles, one per download worker.
pub trait Connector: Send + Sync {
    type Api: RemoteApi;

    fn connect(&self) -> Result<Self::Api, FetchError>;
}

/// Garmin Connect API client bound to one session token.
pub struct ConnectClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    delay: Duration,
}

impl ConnectClient {
    pub fn new(base_url: &str, session: &Session, delay: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: session.token.clone(),
            delay,
        })
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Vec<u8>>, FetchError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, path, body));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        if body.is_empty() {
            return Ok(None);
        }
        Ok(Some(body.to_vec()))
    }
}

/// Map a non-success status onto a fetch error.
fn classify(status: reqwest::StatusCode, path: &str, body: String) -> FetchError {
    match status.as_u16() {
        401 => FetchError::Unauthorized,
        403 => FetchError::Forbidden(path.to_string()),
        429 => {
            tracing::warn!(path, "Garmin rate limit hit (429)");
            FetchError::RateLimited
        }
        _ => FetchError::Http { status, body },
    }
}

#[async_trait]
impl RemoteApi for ConnectClient {
    async fn fetch(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, FetchError> {
        let Some(body) = self.get(path, query).await? else {
            return Ok(None);
        };
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| FetchError::Decode(format!("{path}: {e}")))?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn fetch_binary(&self, path: &str) -> Result<Option<Vec<u8>>, FetchError> {
        self.get(path, &[]).await
    }
}

/// Shares one session across workers; each `connect` builds a fresh client.
pub struct SessionConnector {
    session: RwLock<Arc<Session>>,
    base_url: String,
    delay: Duration,
}

impl SessionConnector {
    pub fn new(base_url: impl Into<String>, session: Session, delay: Duration) -> Self {
        Self {
            session: RwLock::new(Arc::new(session)),
            base_url: base_url.into(),
            delay,
        }
    }

    fn current_session(&self) -> Result<Arc<Session>, FetchError> {
        self.session
            .read()
            .map(|s| Arc::clone(&s))
            .map_err(|_| FetchError::Network("session lock poisoned".to_string()))
    }
}

impl Connector for SessionConnector {
    type Api = ConnectClient;

    fn connect(&self) -> Result<ConnectClient, FetchError> {
        let session = self.current_session()?;
        ConnectClient::new(&self.base_url, &session, self.delay)
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Username/password login against the configured token endpoint.
pub struct PasswordAuthenticator {
    http: reqwest::Client,
    auth_url: String,
    api_base_url: String,
}

impl PasswordAuthenticator {
    pub fn new(auth_url: String, api_base_url: String) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            auth_url,
            api_base_url,
        })
    }
}

#[async_trait]
impl Authenticator for PasswordAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(&self.auth_url)
            .form(&[
                ("username", username),
                ("password", password),
                ("grant_type", "password"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Transport(format!("Login request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(AuthError::Rejected(username.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Transport(format!("HTTP {}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Transport(format!("JSON parse error: {}", e)))?;

        Ok(Session::new(username, token.access_token))
    }

    async fn verify(&self, session: &Session) -> Result<UserProfile, AuthError> {
        let client = ConnectClient::new(&self.api_base_url, session, Duration::ZERO)
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let profile = match client.fetch(paths::SOCIAL_PROFILE, &[]).await {
            Ok(Some(profile)) => profile,
            Ok(None) => return Err(AuthError::Transport("empty user profile".to_string())),
            Err(FetchError::Unauthorized) => return Err(AuthError::SessionRejected),
            Err(e) => return Err(AuthError::Transport(e.to_string())),
        };

        serde_json::from_value(profile)
            .map_err(|e| AuthError::Transport(format!("Unexpected profile shape: {}", e)))
    }
}

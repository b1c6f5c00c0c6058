// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared test doubles: a scripted remote API, a connector handing out
//! handles to it, and an in-process authenticator.

use async_trait::async_trait;
use garmin_sync::config::Config;
use garmin_sync::db::FirestoreDb;
use garmin_sync::error::{AuthError, FetchError};
use garmin_sync::models::{Session, UserProfile};
use garmin_sync::services::{Authenticator, Connector, RemoteApi};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Display name the mock authenticator reports.
#[allow(dead_code)]
pub const DISPLAY_NAME: &str = "runner";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Config with only `entities` enabled and the cache under `dir`.
#[allow(dead_code)]
pub fn config_for(dir: &Path, entities: &[garmin_sync::models::EntityType]) -> Config {
    use garmin_sync::models::EntityType;

    let mut config = Config::test_default(dir);
    config.sync.max_concurrency = 4;
    config.enabled_stats.activities = entities.contains(&EntityType::Activity);
    config.enabled_stats.monitoring = entities.contains(&EntityType::DailySummary);
    config.enabled_stats.sleep = entities.contains(&EntityType::Sleep);
    config.enabled_stats.weight = entities.contains(&EntityType::Weight);
    config.enabled_stats.rhr = entities.contains(&EntityType::RestingHeartRate);
    config
}

// ─── Remote API ─────────────────────────────────────────────

/// Failure to inject for a path.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum Failure {
    Network,
    Unauthorized,
    Forbidden,
}

impl Failure {
    fn to_error(self, path: &str) -> FetchError {
        match self {
            Failure::Network => FetchError::Network("connection reset".to_string()),
            Failure::Unauthorized => FetchError::Unauthorized,
            Failure::Forbidden => FetchError::Forbidden(path.to_string()),
        }
    }
}

/// Scripted remote. Responses and failures are keyed by
/// `path?name=value&...` (exact request) or by bare `path` (any query).
#[allow(dead_code)]
#[derive(Default)]
pub struct MockRemote {
    responses: Mutex<HashMap<String, Value>>,
    binaries: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, Failure>>,
    calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, key: impl Into<String>, body: Value) {
        self.responses.lock().unwrap().insert(key.into(), body);
    }

    pub fn respond_binary(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.binaries.lock().unwrap().insert(path.into(), bytes);
    }

    pub fn fail(&self, key: impl Into<String>, failure: Failure) {
        self.failures.lock().unwrap().insert(key.into(), failure);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn lookup<T: Clone>(map: &Mutex<HashMap<String, T>>, exact: &str, path: &str) -> Option<T> {
        let map = map.lock().unwrap();
        map.get(exact).or_else(|| map.get(path)).cloned()
    }
}

/// Request key in the form used by [`MockRemote::respond`].
#[allow(dead_code)]
pub fn request_key(path: &str, query: &[(&str, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let query: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{path}?{}", query.join("&"))
}

#[allow(dead_code)]
pub struct MockApi {
    remote: Arc<MockRemote>,
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn fetch(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, FetchError> {
        let key = request_key(path, query);
        self.remote.calls.lock().unwrap().push(key.clone());
        if let Some(failure) = MockRemote::lookup(&self.remote.failures, &key, path) {
            return Err(failure.to_error(path));
        }
        Ok(MockRemote::lookup(&self.remote.responses, &key, path))
    }

    async fn fetch_binary(&self, path: &str) -> Result<Option<Vec<u8>>, FetchError> {
        self.remote.calls.lock().unwrap().push(path.to_string());
        if let Some(failure) = MockRemote::lookup(&self.remote.failures, path, path) {
            return Err(failure.to_error(path));
        }
        Ok(MockRemote::lookup(&self.remote.binaries, path, path))
    }
}

/// Cloneable connector; clones share the remote and the connect counter.
#[allow(dead_code)]
#[derive(Clone)]
pub struct MockConnector {
    remote: Arc<MockRemote>,
    connects: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockConnector {
    pub fn new(remote: Arc<MockRemote>) -> Self {
        Self {
            remote,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Api = MockApi;

    fn connect(&self) -> Result<MockApi, FetchError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockApi {
            remote: Arc::clone(&self.remote),
        })
    }
}

// ─── Authentication ─────────────────────────────────────────

#[allow(dead_code)]
#[derive(Default)]
struct AuthState {
    issued: HashSet<String>,
    logins: Vec<String>,
}

/// Accepts one password and remembers the tokens it issued. Clones share
/// state, so a test can keep a handle after passing one to the code under
/// test.
#[allow(dead_code)]
#[derive(Clone)]
pub struct MockAuthenticator {
    password: String,
    state: Arc<Mutex<AuthState>>,
}

#[allow(dead_code)]
impl MockAuthenticator {
    pub fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            state: Arc::default(),
        }
    }

    /// Treat `token` as valid, as if issued by an earlier run.
    pub fn accept_token(&self, token: &str) {
        self.state.lock().unwrap().issued.insert(token.to_string());
    }

    /// Usernames of every fresh login, in order.
    pub fn logins(&self) -> Vec<String> {
        self.state.lock().unwrap().logins.clone()
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        if password != self.password {
            return Err(AuthError::Rejected(username.to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.logins.push(username.to_string());
        let token = format!("token-{}-{}", username, state.logins.len());
        state.issued.insert(token.clone());
        Ok(Session::new(username, token))
    }

    async fn verify(&self, session: &Session) -> Result<UserProfile, AuthError> {
        if !self.state.lock().unwrap().issued.contains(&session.token) {
            return Err(AuthError::SessionRejected);
        }
        Ok(UserProfile {
            display_name: DISPLAY_NAME.to_string(),
            full_name: None,
            user_name: Some(session.username.clone()),
        })
    }
}

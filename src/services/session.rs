// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session persistence and the login flow.
//!
//! The session file holds base64-encoded JSON. A restored session is only
//! reused if it was issued for the configured username and the remote
//! still accepts it; otherwise it is deleted and a fresh login happens.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::{Path, PathBuf};

use crate::error::AuthError;
use crate::models::{Session, UserProfile};
use crate::services::cache::{temp_sibling, write_atomic};

/// Remote authentication operations.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Log in with a username and password.
    async fn authenticate(&self, username: &str, password: &str) -> Result<Session, AuthError>;

    /// Check a session against the remote and return the account profile.
    /// Returns `AuthError::SessionRejected` when the token is no longer valid.
    async fn verify(&self, session: &Session) -> Result<UserProfile, AuthError>;
}

/// File-backed session storage.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted session. Missing or corrupt files yield `None`.
    pub async fn restore(&self) -> Option<Session> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No saved session");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                return None;
            }
        };

        let decoded = match STANDARD.decode(text.trim()) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(error = %e, "Session file is not valid base64, ignoring it");
                return None;
            }
        };

        match serde_json::from_slice::<Session>(&decoded) {
            Ok(session) => {
                tracing::info!(
                    path = %self.path.display(),
                    session = %session.fingerprint(),
                    "Loaded saved session"
                );
                Some(session)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session file is corrupt, ignoring it");
                None
            }
        }
    }

    /// Write the session, replacing any previous one. Owner-only on Unix.
    pub async fn persist(&self, session: &Session) -> Result<(), AuthError> {
        let json = serde_json::to_vec(session).map_err(|e| AuthError::Persist(e.to_string()))?;
        let encoded = STANDARD.encode(json);

        write_atomic(&self.path, encoded.as_bytes())
            .await
            .map_err(|e| AuthError::Persist(format!("{}: {}", self.path.display(), e)))?;
        restrict_permissions(&self.path)
            .await
            .map_err(|e| AuthError::Persist(format!("{}: {}", self.path.display(), e)))?;

        tracing::info!(
            path = %self.path.display(),
            session = %session.fingerprint(),
            "Saved session"
        );
        Ok(())
    }

    /// Delete the session file. Succeeds when there is nothing to delete.
    pub async fn clear(&self) -> Result<(), AuthError> {
        let _ = tokio::fs::remove_file(temp_sibling(&self.path)).await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Persist(e.to_string())),
        }
    }

    /// Whether a restored session may be used for `expected_username`.
    pub fn validate(session: &Session, expected_username: &str) -> bool {
        !session.token.is_empty() && session.belongs_to(expected_username)
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Restore-or-login flow.
pub struct SessionManager<A: Authenticator> {
    store: SessionStore,
    authenticator: A,
}

impl<A: Authenticator> SessionManager<A> {
    pub fn new(store: SessionStore, authenticator: A) -> Self {
        Self {
            store,
            authenticator,
        }
    }

    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    /// Produce a verified session for `username`.
    ///
    /// A saved session for another account, or one the remote rejects, is
    /// deleted. At most one fresh login is attempted; if it fails the error
    /// is returned.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(Session, UserProfile), AuthError> {
        if let Some(mut session) = self.store.restore().await {
            if !SessionStore::validate(&session, username) {
                tracing::warn!(
                    saved_user = %session.username,
                    configured_user = %username,
                    "Saved session belongs to a different account, discarding it"
                );
                self.store.clear().await?;
            } else {
                match self.authenticator.verify(&session).await {
                    Ok(profile) => {
                        session.display_name = Some(profile.display_name.clone());
                        tracing::info!(
                            display_name = %profile.display_name,
                            session = %session.fingerprint(),
                            "Resumed saved session"
                        );
                        return Ok((session, profile));
                    }
                    Err(AuthError::SessionRejected) => {
                        tracing::warn!("Saved session expired, logging in again");
                        self.store.clear().await?;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        tracing::info!(user = %username, "Logging in to Garmin Connect");
        let mut session = self.authenticator.authenticate(username, password).await?;
        let profile = self.authenticator.verify(&session).await?;
        session.display_name = Some(profile.display_name.clone());
        self.store.persist(&session).await?;

        tracing::info!(
            display_name = %profile.display_name,
            session = %session.fingerprint(),
            "Login succeeded"
        );
        Ok((session, profile))
    }
}

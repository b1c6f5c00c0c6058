// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authenticated session model.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque authentication token plus the account that owns it.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    /// Username (email) the token was issued for
    pub username: String,
    /// Bearer token sent with every request
    pub token: String,
    /// Public display name, filled in after the profile call
    #[serde(default)]
    pub display_name: Option<String>,
    /// When the session was created (RFC 3339)
    pub created_at: String,
}

impl Session {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
            display_name: None,
            created_at: crate::time_utils::format_utc_rfc3339(chrono::Utc::now()),
        }
    }

    /// Short token digest, safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.token.as_bytes());
        hex::encode(&digest[..6])
    }

    /// Whether this session belongs to `username` (emails compare case-insensitively).
    pub fn belongs_to(&self, username: &str) -> bool {
        self.username.trim().eq_ignore_ascii_case(username.trim())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("token", &self.fingerprint())
            .field("display_name", &self.display_name)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// The subset of the social profile the sync engine needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub display_name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
}

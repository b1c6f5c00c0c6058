// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Filesystem artifact cache.
//!
//! Layout under the base directory:
//!
//! ```text
//! <base>/<entity dir>/<key>_<variant>.json   pretty-printed JSON payloads
//! <base>/activities/<id>.zip                 original activity files
//! <base>/profile/<name>.json                 account profile snapshots
//! ```
//!
//! Every write goes to a temporary sibling first and is renamed into place,
//! so an interrupted run never leaves a half-written artifact behind.

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::models::{EntityType, Variant};

const PROFILE_DIR: &str = "profile";

/// Result of a cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// The file already held exactly these bytes
    Unchanged,
}

/// One cached JSON artifact found by [`ArtifactCache::list`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CachedArtifact {
    pub key: String,
    pub variant: Variant,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    base_dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn entity_dir(&self, entity: EntityType) -> PathBuf {
        self.base_dir.join(entity.dir_name())
    }

    /// Deterministic path of the artifact for `(entity, key, variant)`.
    pub fn artifact_path(
        &self,
        entity: EntityType,
        key: &str,
        variant: Variant,
    ) -> Result<PathBuf, CacheError> {
        let stem = encode_key(key)?;
        Ok(self
            .entity_dir(entity)
            .join(format!("{stem}_{}.json", variant.as_str())))
    }

    /// Store a JSON payload, creating directories as needed.
    pub async fn put(
        &self,
        entity: EntityType,
        key: &str,
        variant: Variant,
        payload: &Value,
    ) -> Result<PutOutcome, CacheError> {
        let path = self.artifact_path(entity, key, variant)?;
        let bytes = serde_json::to_vec_pretty(payload)?;
        write_if_changed(&path, &bytes).await
    }

    /// Store a binary payload such as an original activity file.
    pub async fn put_file(
        &self,
        entity: EntityType,
        key: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<PutOutcome, CacheError> {
        let stem = encode_key(key)?;
        let path = self.entity_dir(entity).join(format!("{stem}.{extension}"));
        write_if_changed(&path, bytes).await
    }

    /// Store an account profile snapshot under `<base>/profile/<name>.json`.
    pub async fn put_profile(&self, name: &str, payload: &Value) -> Result<PutOutcome, CacheError> {
        let stem = encode_key(name)?;
        let path = self.base_dir.join(PROFILE_DIR).join(format!("{stem}.json"));
        let bytes = serde_json::to_vec_pretty(payload)?;
        write_if_changed(&path, &bytes).await
    }

    /// All JSON artifacts of an entity, sorted by key then variant.
    ///
    /// A missing entity directory is an empty cache, not an error. Files
    /// that do not follow the `<key>_<variant>.json` pattern are ignored.
    pub async fn list(&self, entity: EntityType) -> Result<Vec<CachedArtifact>, CacheError> {
        let dir = self.entity_dir(entity);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(CacheError::Io { path: dir, source }),
        };

        let mut artifacts = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(CacheError::Io {
                        path: dir.clone(),
                        source,
                    })
                }
            };
            let path = entry.path();
            if let Some((key, variant)) = parse_artifact_name(&path) {
                artifacts.push(CachedArtifact { key, variant, path });
            }
        }

        artifacts.sort();
        Ok(artifacts)
    }

    /// Load a cached artifact. Unreadable or malformed files yield `None`.
    pub async fn get(&self, path: &Path) -> Option<Value> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read cached artifact");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Malformed cached artifact");
                None
            }
        }
    }
}

fn encode_key(key: &str) -> Result<String, CacheError> {
    if key.is_empty() || key.starts_with('.') {
        return Err(CacheError::InvalidKey(key.to_string()));
    }
    Ok(urlencoding::encode(key).into_owned())
}

fn parse_artifact_name(path: &Path) -> Option<(String, Variant)> {
    if path.extension()? != "json" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (key, variant) = stem.rsplit_once('_')?;
    let variant = variant.parse().ok()?;
    let key = urlencoding::decode(key).ok()?.into_owned();
    Some((key, variant))
}

async fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<PutOutcome, CacheError> {
    if let Ok(existing) = tokio::fs::read(path).await {
        if existing == bytes {
            return Ok(PutOutcome::Unchanged);
        }
    }
    write_atomic(path, bytes)
        .await
        .map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(PutOutcome::Written)
}

/// Write `bytes` to a temporary sibling of `path` and rename it into place.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = temp_sibling(path);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

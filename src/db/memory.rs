// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process record store.
//!
//! Backs `import --dry-run` and the test suite. Documents are kept as JSON
//! values so queries see exactly the serialized field names Firestore would.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::db::{RecordStore, WriteOutcome};
use crate::error::StoreError;
use crate::models::{CanonicalRecord, EntityType};

#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<&'static str, BTreeMap<String, Value>>,
    failing_keys: DashSet<String>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write of a record with this identity key fail.
    pub fn fail_writes_for(&self, key: impl Into<String>) {
        self.failing_keys.insert(key.into());
    }

    /// Simulate the whole store going away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Raw documents of one collection, ordered by key.
    pub fn documents(&self, entity: EntityType) -> Vec<(String, Value)> {
        self.collections
            .get(entity.collection())
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Insert a raw document, bypassing the record types.
    pub fn insert_raw(&self, entity: EntityType, key: impl Into<String>, doc: Value) {
        self.collections
            .entry(entity.collection())
            .or_default()
            .insert(key.into(), doc);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn prepare<R: CanonicalRecord>(&self, record: &R) -> Result<(String, Value), StoreError> {
        self.check_available()?;
        let key = record.identity_key();
        if self.failing_keys.contains(&key) {
            return Err(StoreError::Write(format!("injected failure for {key}")));
        }
        let doc = serde_json::to_value(record).map_err(|e| StoreError::Serde(e.to_string()))?;
        Ok((key, doc))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert<R: CanonicalRecord>(&self, record: &R) -> Result<WriteOutcome, StoreError> {
        let (key, doc) = self.prepare(record)?;
        let mut docs = self.collections.entry(R::ENTITY.collection()).or_default();
        match docs.insert(key, doc) {
            Some(_) => Ok(WriteOutcome::Updated),
            None => Ok(WriteOutcome::Inserted),
        }
    }

    async fn insert_if_absent<R: CanonicalRecord>(
        &self,
        record: &R,
    ) -> Result<WriteOutcome, StoreError> {
        let (key, doc) = self.prepare(record)?;
        let mut docs = self.collections.entry(R::ENTITY.collection()).or_default();
        if docs.contains_key(&key) {
            return Ok(WriteOutcome::Skipped);
        }
        docs.insert(key, doc);
        Ok(WriteOutcome::Inserted)
    }

    async fn exists_where(
        &self,
        entity: EntityType,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self
            .collections
            .get(entity.collection())
            .map(|docs| {
                docs.values()
                    .any(|doc| doc.get(field).and_then(Value::as_str) == Some(value))
            })
            .unwrap_or(false))
    }

    async fn get<R: CanonicalRecord>(&self, key: &str) -> Result<Option<R>, StoreError> {
        self.check_available()?;
        let Some(docs) = self.collections.get(R::ENTITY.collection()) else {
            return Ok(None);
        };
        docs.get(key)
            .map(|doc| serde_json::from_value(doc.clone()))
            .transpose()
            .map_err(|e| StoreError::Serde(e.to_string()))
    }

    async fn latest<R: CanonicalRecord>(&self) -> Result<Option<R>, StoreError> {
        self.check_available()?;
        let Some(docs) = self.collections.get(R::ENTITY.collection()) else {
            return Ok(None);
        };
        docs.values()
            .filter_map(|doc| {
                doc.get(R::ORDERING_FIELD)
                    .and_then(Value::as_str)
                    .map(|order| (order, doc))
            })
            .max_by(|a, b| a.0.cmp(b.0))
            .map(|(_, doc)| serde_json::from_value(doc.clone()))
            .transpose()
            .map_err(|e| StoreError::Serde(e.to_string()))
    }

    async fn count(&self, entity: EntityType) -> Result<usize, StoreError> {
        self.check_available()?;
        Ok(self
            .collections
            .get(entity.collection())
            .map(|docs| docs.len())
            .unwrap_or(0))
    }
}

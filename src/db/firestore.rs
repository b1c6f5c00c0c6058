// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed record store.
//!
//! One collection per entity type; the document id is the record's
//! identity key. Writes go through `insert()` first so a duplicate key
//! surfaces as a data conflict instead of a silent overwrite.

use async_trait::async_trait;
use firestore::errors::FirestoreError;
use serde::Deserialize;

use crate::db::{RecordStore, WriteOutcome};
use crate::error::StoreError;
use crate::models::{CanonicalRecord, EntityType};

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

/// Deserializes any document; used for existence checks.
#[derive(Deserialize)]
struct AnyDocument {}

/// Aggregation result for `count`.
#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

/// Connection loss and retryable gRPC statuses are systemic; the rest are
/// per-record failures.
fn map_err(e: FirestoreError) -> StoreError {
    match e {
        FirestoreError::DatabaseError(ref db) if db.retry_possible => {
            StoreError::Unavailable(e.to_string())
        }
        FirestoreError::NetworkError(_) | FirestoreError::SystemError(_) => {
            StoreError::Unavailable(e.to_string())
        }
        FirestoreError::DeserializeError(_) | FirestoreError::SerializeError(_) => {
            StoreError::Serde(e.to_string())
        }
        _ => StoreError::Write(e.to_string()),
    }
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, StoreError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, StoreError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            StoreError::Unavailable(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client. Every operation reports the store as unavailable.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, StoreError> {
        self.client
            .as_ref()
            .ok_or_else(|| StoreError::Unavailable("Database not connected (offline mode)".into()))
    }
}

async fn insert<R: CanonicalRecord>(
    client: &firestore::FirestoreDb,
    record: &R,
) -> Result<(), FirestoreError> {
    let _: () = client
        .fluent()
        .insert()
        .into(R::ENTITY.collection())
        .document_id(record.identity_key())
        .object(record)
        .execute()
        .await?;
    Ok(())
}

#[async_trait]
impl RecordStore for FirestoreDb {
    async fn upsert<R: CanonicalRecord>(&self, record: &R) -> Result<WriteOutcome, StoreError> {
        let client = self.get_client()?;
        match insert(client, record).await {
            Ok(()) => Ok(WriteOutcome::Inserted),
            Err(FirestoreError::DataConflictError(_)) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(R::ENTITY.collection())
                    .document_id(record.identity_key())
                    .object(record)
                    .execute()
                    .await
                    .map_err(map_err)?;
                Ok(WriteOutcome::Updated)
            }
            Err(e) => Err(map_err(e)),
        }
    }

    async fn insert_if_absent<R: CanonicalRecord>(
        &self,
        record: &R,
    ) -> Result<WriteOutcome, StoreError> {
        match insert(self.get_client()?, record).await {
            Ok(()) => Ok(WriteOutcome::Inserted),
            Err(FirestoreError::DataConflictError(_)) => Ok(WriteOutcome::Skipped),
            Err(e) => Err(map_err(e)),
        }
    }

    async fn exists_where(
        &self,
        entity: EntityType,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let field = field.to_string();
        let value = value.to_string();
        let found: Vec<AnyDocument> = self
            .get_client()?
            .fluent()
            .select()
            .from(entity.collection())
            .filter(move |q| q.for_all([q.field(field.as_str()).eq(value.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(map_err)?;
        Ok(!found.is_empty())
    }

    async fn get<R: CanonicalRecord>(&self, key: &str) -> Result<Option<R>, StoreError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(R::ENTITY.collection())
            .obj()
            .one(key)
            .await
            .map_err(map_err)
    }

    async fn latest<R: CanonicalRecord>(&self) -> Result<Option<R>, StoreError> {
        let mut docs: Vec<R> = self
            .get_client()?
            .fluent()
            .select()
            .from(R::ENTITY.collection())
            .order_by([(
                R::ORDERING_FIELD,
                firestore::FirestoreQueryDirection::Descending,
            )])
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(map_err)?;
        Ok(docs.pop())
    }

    async fn count(&self, entity: EntityType) -> Result<usize, StoreError> {
        let results: Vec<CountResult> = self
            .get_client()?
            .fluent()
            .select()
            .from(entity.collection())
            .aggregate(|a| a.fields([a.field("count").count()]))
            .obj()
            .query()
            .await
            .map_err(map_err)?;
        Ok(results.first().map_or(0, |r| r.count))
    }
}

//! Durable trail of every capture.
//!
//! The [`PersistenceWriter`] stores the archive photo and then appends one [`AuditRecord`],
//! for every capture regardless of where its verdict came from. The two round trips are
//! independent: nothing is retried or rolled back, so a failed insert can leave an
//! unreferenced object behind.

pub mod in_memory;
pub mod local;
pub mod postgres;
pub mod supabase;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::normalizer::JPEG_CONTENT_TYPE;
use crate::types::Actor;
use crate::verdict::{Status, Verdict};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A capture whose trail could not be written. Never a verdict.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to store archive photo {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to insert audit record: {source}")]
    Insert {
        #[source]
        source: StorageError,
    },
}

/// Keyed blob storage for archive photos.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError>;

    /// Dereferenceable URL for a stored key.
    fn public_url(&self, key: &str) -> String;
}

/// Append-only sink for audit records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &AuditRecord) -> Result<(), StorageError>;
}

/// One row of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub store_code: String,
    pub manager_name: String,
    /// Verdict category
    pub audit_type: String,
    pub result: Status,
    pub reason: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(actor: &Actor, verdict: &Verdict, image_url: String, created_at: DateTime<Utc>) -> Self {
        Self {
            store_code: actor.store_code.clone(),
            manager_name: actor.manager_name.clone(),
            audit_type: verdict.category.clone(),
            result: verdict.status,
            reason: verdict.reason.clone(),
            image_url,
            created_at,
        }
    }
}

/// `{store_code}_{YYYYmmdd_HHMMSS}.jpg`; captures from one store in the same second share a key.
pub fn object_key(store_code: &str, captured_at: DateTime<Utc>) -> String {
    format!("{}_{}.jpg", store_code, captured_at.format("%Y%m%d_%H%M%S"))
}

#[derive(Clone)]
pub struct PersistenceWriter {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
}

impl PersistenceWriter {
    pub fn new(objects: Arc<dyn ObjectStore>, records: Arc<dyn RecordStore>) -> Self {
        Self { objects, records }
    }

    /// Store the archive photo and insert its record. A failed upload skips the insert.
    #[instrument(skip_all, fields(store_code = %actor.store_code, object_key = tracing::field::Empty))]
    pub async fn write(
        &self,
        actor: &Actor,
        verdict: &Verdict,
        archive_jpeg: Vec<u8>,
        captured_at: DateTime<Utc>,
    ) -> Result<AuditRecord, PersistenceError> {
        let key = object_key(&actor.store_code, captured_at);
        tracing::Span::current().record("object_key", key.as_str());

        if let Err(source) = self.objects.put(&key, Bytes::from(archive_jpeg), JPEG_CONTENT_TYPE).await {
            warn!(error = %source, "Archive upload failed, record not inserted");
            return Err(PersistenceError::Upload { key, source });
        }

        let record = AuditRecord::new(actor, verdict, self.objects.public_url(&key), captured_at);

        if let Err(source) = self.records.insert(&record).await {
            warn!(error = %source, "Audit record insert failed after upload");
            return Err(PersistenceError::Insert { source });
        }

        info!(result = %record.result, audit_type = %record.audit_type, "Audit record written");
        Ok(record)
    }
}

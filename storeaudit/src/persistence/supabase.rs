//! Supabase storage and PostgREST backends.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use url::Url;

use super::{AuditRecord, ObjectStore, RecordStore, StorageError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared connection to one Supabase project.
#[derive(Clone)]
struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    fn new(base_url: &Url, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
    }
}

async fn check(response: reqwest::Response) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// Objects in a Supabase storage bucket.
pub struct SupabaseObjectStore {
    client: SupabaseClient,
    bucket: String,
}

impl SupabaseObjectStore {
    pub fn new(base_url: &Url, api_key: &str, bucket: impl Into<String>) -> Self {
        Self {
            client: SupabaseClient::new(base_url, api_key),
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for SupabaseObjectStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .post(&format!("storage/v1/object/{}/{}", self.bucket, key))
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        check(response).await
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.client.base_url, self.bucket, key)
    }
}

/// Rows in a table exposed through PostgREST.
pub struct SupabaseRecordStore {
    client: SupabaseClient,
    table: String,
}

impl SupabaseRecordStore {
    pub fn new(base_url: &Url, api_key: &str, table: impl Into<String>) -> Self {
        Self {
            client: SupabaseClient::new(base_url, api_key),
            table: table.into(),
        }
    }
}

#[async_trait]
impl RecordStore for SupabaseRecordStore {
    async fn insert(&self, record: &AuditRecord) -> Result<(), StorageError> {
        let response = self
            .client
            .post(&format!("rest/v1/{}", self.table))
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await?;
        check(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::Status;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> AuditRecord {
        AuditRecord {
            store_code: "S042".to_string(),
            manager_name: "Asha".to_string(),
            audit_type: "Greeter".to_string(),
            result: Status::Pass,
            reason: "Staff at door".to_string(),
            image_url: "https://x/y.jpg".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_object_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/audit-photos/S042_20240309_140507.jpg"))
            .and(header("authorization", "Bearer s-key"))
            .and(header("apikey", "s-key"))
            .and(header("content-type", "image/jpeg"))
            .and(body_string("jpeg"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let base: Url = server.uri().parse().unwrap();
        let store = SupabaseObjectStore::new(&base, "s-key", "audit-photos");
        store
            .put("S042_20240309_140507.jpg", Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();

        assert_eq!(
            store.public_url("S042_20240309_140507.jpg"),
            format!("{}/storage/v1/object/public/audit-photos/S042_20240309_140507.jpg", server.uri())
        );
    }

    #[tokio::test]
    async fn test_object_upload_rejection_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_string("The resource already exists"))
            .mount(&server)
            .await;

        let base: Url = server.uri().parse().unwrap();
        let store = SupabaseObjectStore::new(&base, "s-key", "audit-photos");
        let err = store.put("k.jpg", Bytes::new(), "image/jpeg").await.unwrap_err();

        assert!(matches!(err, StorageError::Rejected { status: 409, ref body } if body.contains("already exists")));
    }

    #[tokio::test]
    async fn test_record_insert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/audit_logs"))
            .and(header("prefer", "return=minimal"))
            .and(header("apikey", "s-key"))
            .and(body_json(serde_json::json!({
                "store_code": "S042",
                "manager_name": "Asha",
                "audit_type": "Greeter",
                "result": "PASS",
                "reason": "Staff at door",
                "image_url": "https://x/y.jpg",
                "created_at": "2024-03-09T14:05:07Z"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let base: Url = server.uri().parse().unwrap();
        SupabaseRecordStore::new(&base, "s-key", "audit_logs")
            .insert(&record())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_record_insert_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .mount(&server)
            .await;

        let base: Url = server.uri().parse().unwrap();
        let err = SupabaseRecordStore::new(&base, "bad", "audit_logs")
            .insert(&record())
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Rejected { status: 401, .. }));
    }
}

//! Direct PostgreSQL record store.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::{AuditRecord, RecordStore, StorageError};

/// Migrations for the `audit_logs` table.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn insert(&self, record: &AuditRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, store_code, manager_name, audit_type, result, reason, image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.store_code)
        .bind(&record.manager_name)
        .bind(&record.audit_type)
        .bind(record.result.as_str())
        .bind(&record.reason)
        .bind(&record.image_url)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Actor;
    use crate::verdict::{Status, Verdict};
    use chrono::{DateTime, TimeZone, Utc};

    type Row = (String, String, String, String, String, String, DateTime<Utc>);

    fn record(store_code: &str, text: &str, second: u32) -> AuditRecord {
        let actor = Actor {
            store_code: store_code.to_string(),
            manager_name: "Asha Rao".to_string(),
        };
        let created_at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, second).unwrap();
        AuditRecord::new(
            &actor,
            &Verdict::parse(text),
            format!("https://cdn.test/{store_code}_20240309_1405{second:02}.jpg"),
            created_at,
        )
    }

    #[sqlx::test(migrator = "crate::persistence::postgres::MIGRATOR")]
    async fn test_insert_round_trips_pass_and_fail(pool: PgPool) {
        let store = PostgresRecordStore::new(pool.clone());
        let pass = record("S042", "Category: Greeter | Result: PASS | Reason: Staff at door", 1);
        let fail = record("S042", "Category: Trial Room | Result: FAIL | Reason: Messy desk", 2);

        store.insert(&pass).await.unwrap();
        store.insert(&fail).await.unwrap();

        let rows: Vec<Row> = sqlx::query_as(
            "SELECT store_code, manager_name, audit_type, result, reason, image_url, created_at \
             FROM audit_logs ORDER BY created_at",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            (
                "S042".to_string(),
                "Asha Rao".to_string(),
                "Greeter".to_string(),
                "PASS".to_string(),
                "Staff at door".to_string(),
                "https://cdn.test/S042_20240309_140501.jpg".to_string(),
                pass.created_at,
            )
        );
        assert_eq!(rows[1].2, "Trial Room");
        assert_eq!(rows[1].3, Status::Fail.as_str());
    }

    #[sqlx::test(migrator = "crate::persistence::postgres::MIGRATOR")]
    async fn test_result_column_only_accepts_pass_or_fail(pool: PgPool) {
        let err = sqlx::query(
            "INSERT INTO audit_logs (id, store_code, manager_name, audit_type, result, reason, image_url, created_at) \
             VALUES ($1, 'S042', 'Asha Rao', 'General', 'MAYBE', 'r', 'u', now())",
        )
        .bind(Uuid::new_v4())
        .execute(&pool)
        .await
        .unwrap_err();

        assert!(err.to_string().contains("audit_logs_result_check"), "{err}");
    }
}

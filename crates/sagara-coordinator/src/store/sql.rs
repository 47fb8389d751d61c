// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQL store backend on PostgreSQL.
//!
//! One row per record. Besides the opaque payload the row carries the
//! numeric status ordinal, the kind name and the LRA id string so that
//! operators can query the table directly without decoding payloads.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{ObjectStore, RecordKind, Result, StoreError};
use crate::lra::LraStatus;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS lra_records (
    uid     TEXT PRIMARY KEY,
    status  INTEGER NOT NULL,
    kind    TEXT NOT NULL,
    lra_id  TEXT NOT NULL,
    payload BYTEA NOT NULL
)
"#;

/// Store backend persisting each record as one PostgreSQL row.
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: PgPool,
}

impl SqlStore {
    /// Connect to the database and create the record table if absent.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Self::new(pool).await
    }

    /// Wrap an existing pool, creating the record table if absent.
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Pull the indexed columns out of a record payload. The payload stays
    /// opaque to the contract; these columns exist for operator queries and
    /// fall back to sentinel values when the payload is not an LRA record.
    fn indexed_columns(bytes: &[u8]) -> (i32, String) {
        let value: serde_json::Value = match serde_json::from_slice(bytes) {
            Ok(v) => v,
            Err(_) => return (-1, String::new()),
        };
        let status = value
            .get("status")
            .and_then(|s| s.as_str())
            .and_then(LraStatus::parse)
            .map(|s| s.ordinal())
            .unwrap_or(-1);
        let lra_id = value
            .get("id")
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_string();
        (status, lra_id)
    }
}

#[async_trait]
impl ObjectStore for SqlStore {
    async fn write(&self, kind: RecordKind, uid: &str, bytes: &[u8]) -> Result<()> {
        let (status, lra_id) = Self::indexed_columns(bytes);
        sqlx::query(
            r#"
            INSERT INTO lra_records (uid, status, kind, lra_id, payload)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (uid)
            DO UPDATE SET status = $2, kind = $3, lra_id = $4, payload = $5
            "#,
        )
        .bind(uid)
        .bind(status)
        .bind(kind.as_str())
        .bind(&lra_id)
        .bind(bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read(&self, kind: RecordKind, uid: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT payload FROM lra_records WHERE uid = $1 AND kind = $2")
                .bind(uid)
                .bind(kind.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    async fn remove(&self, kind: RecordKind, uid: &str) -> Result<()> {
        sqlx::query("DELETE FROM lra_records WHERE uid = $1 AND kind = $2")
            .bind(uid)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, kind: RecordKind) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT uid FROM lra_records WHERE kind = $1 ORDER BY uid")
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn move_record(&self, from: RecordKind, to: RecordKind, uid: &str) -> Result<()> {
        let result = sqlx::query("UPDATE lra_records SET kind = $1 WHERE uid = $2 AND kind = $3")
            .bind(to.as_str())
            .bind(uid)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                kind: from.as_str(),
                uid: uid.to_string(),
            });
        }
        Ok(())
    }
}

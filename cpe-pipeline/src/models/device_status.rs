//! Device status model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use super::DeviceStatusUpdate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeviceStatusRow {
    pub id: i64,
    pub device_id: String,
    pub status: String,
    pub last_updated: i64,
    pub updated_at: DateTime<Utc>,
}

impl DeviceStatusRow {
    /// Insert or replace the status of one device
    pub async fn upsert(pool: &PgPool, update: &DeviceStatusUpdate) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO device_statuses (device_id, status, last_updated)
            VALUES ($1, $2, $3)
            ON CONFLICT (device_id) DO UPDATE SET
                status = EXCLUDED.status,
                last_updated = EXCLUDED.last_updated,
                updated_at = NOW()
            WHERE device_statuses.last_updated <= EXCLUDED.last_updated
            "#
        )
        .bind(&update.device_id)
        .bind(update.status.as_str())
        .bind(update.last_updated)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_device(pool: &PgPool, device_id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DeviceStatusRow>("SELECT * FROM device_statuses WHERE device_id = $1")
            .bind(device_id)
            .fetch_optional(pool)
            .await
    }
}

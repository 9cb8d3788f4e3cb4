//! Packet loss event model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::PredictionResult;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PacketLossEvent {
    pub id: i64,
    pub device_id: String,
    pub event_timestamp: i64,
    pub has_packet_loss: bool,
    pub created_at: DateTime<Utc>,
}

/// Row waiting to be written, either directly or from the flush buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPacketLossEvent {
    pub device_id: String,
    pub event_timestamp: i64,
    pub has_packet_loss: bool,
}

impl From<&PredictionResult> for NewPacketLossEvent {
    fn from(result: &PredictionResult) -> Self {
        Self {
            device_id: result.device_id.clone(),
            event_timestamp: result.produced_at.timestamp_millis(),
            has_packet_loss: result.has_anomaly,
        }
    }
}

impl PacketLossEvent {
    pub async fn insert(pool: &PgPool, event: &NewPacketLossEvent) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, PacketLossEvent>(
            r#"
            INSERT INTO packet_loss_events (device_id, event_timestamp, has_packet_loss)
            VALUES ($1, $2, $3)
            RETURNING *
            "#
        )
        .bind(&event.device_id)
        .bind(event.event_timestamp)
        .bind(event.has_packet_loss)
        .fetch_one(pool)
        .await
    }

    /// Bulk insert in a single statement; returns rows written
    pub async fn insert_batch(pool: &PgPool, events: &[NewPacketLossEvent]) -> Result<u64, sqlx::Error> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO packet_loss_events (device_id, event_timestamp, has_packet_loss) "
        );
        builder.push_values(events, |mut row, event| {
            row.push_bind(&event.device_id)
                .push_bind(event.event_timestamp)
                .push_bind(event.has_packet_loss);
        });

        let result = builder.build().execute(pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn list_by_device(
        pool: &PgPool,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PacketLossEvent>(
            r#"
            SELECT * FROM packet_loss_events
            WHERE device_id = $1
            ORDER BY event_timestamp DESC
            LIMIT $2
            "#
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

// Postgres-backed queue
//
// Uses the queue_messages table with FOR UPDATE SKIP LOCKED so any number
// of consumer processes can poll concurrently without double-delivery
// inside the visibility window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use std::time::Duration;

use super::{
    MessageQueue, QueueMessage, QueueResult, DEAD_LETTER_QUEUE,
};

pub struct PgQueue {
    pool: PgPool,
    visibility_timeout_secs: u64,
    max_receive_count: i32,
}

impl PgQueue {
    pub fn new(pool: PgPool, visibility_timeout_secs: u64, max_receive_count: i32) -> Self {
        Self {
            pool,
            visibility_timeout_secs,
            max_receive_count,
        }
    }

    /// Move messages that exhausted their receive attempts to the
    /// dead-letter queue, wrapping them in the transport envelope.
    async fn redrive(&self, queue: &str) -> QueueResult<u64> {
        let result = sqlx::query(
            r#"
            WITH dead AS (
                DELETE FROM queue_messages
                WHERE id IN (
                    SELECT id FROM queue_messages
                    WHERE queue = $1 AND visible_at <= NOW() AND receive_count >= $2
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING queue, payload, receive_count, sent_at, first_received_at
            )
            INSERT INTO queue_messages (queue, payload)
            SELECT $3, jsonb_build_object(
                'original', payload,
                'approximateReceiveCount', receive_count,
                'sentTimestamp', to_jsonb(sent_at),
                'firstReceiveTimestamp', to_jsonb(first_received_at),
                'sourceQueue', queue
            )
            FROM dead
            "#,
        )
        .bind(queue)
        .bind(self.max_receive_count)
        .bind(DEAD_LETTER_QUEUE)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MessageQueue for PgQueue {
    async fn send(&self, queue: &str, payload: JsonValue) -> QueueResult<i64> {
        self.send_delayed(queue, payload, Duration::ZERO).await
    }

    async fn send_delayed(
        &self,
        queue: &str,
        payload: JsonValue,
        delay: Duration,
    ) -> QueueResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO queue_messages (queue, payload, visible_at)
            VALUES ($1, $2, NOW() + ($3 || ' seconds')::interval)
            RETURNING id
            "#,
        )
        .bind(queue)
        .bind(payload)
        .bind(delay.as_secs().to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn receive(&self, queue: &str, max_messages: i64) -> QueueResult<Vec<QueueMessage>> {
        // The dead-letter queue itself has no redrive destination.
        if queue != DEAD_LETTER_QUEUE {
            let moved = self.redrive(queue).await?;
            if moved > 0 {
                tracing::warn!("Redirected {} exhausted messages from {} to dead-letter", moved, queue);
            }
        }

        let rows = sqlx::query(
            r#"
            UPDATE queue_messages
            SET receive_count = receive_count + 1,
                visible_at = NOW() + ($3 || ' seconds')::interval,
                first_received_at = COALESCE(first_received_at, NOW())
            WHERE id IN (
                SELECT id FROM queue_messages
                WHERE queue = $1 AND visible_at <= NOW() AND receive_count < $2
                ORDER BY id
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, queue, payload, receive_count, sent_at, first_received_at
            "#,
        )
        .bind(queue)
        .bind(if queue == DEAD_LETTER_QUEUE {
            i32::MAX
        } else {
            self.max_receive_count
        })
        .bind(self.visibility_timeout_secs.to_string())
        .bind(max_messages)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .into_iter()
            .map(|row| QueueMessage {
                id: row.get("id"),
                queue: row.get("queue"),
                payload: row.get("payload"),
                receive_count: row.get("receive_count"),
                sent_at: row.get::<DateTime<Utc>, _>("sent_at"),
                first_received_at: row.get("first_received_at"),
            })
            .collect();

        Ok(messages)
    }

    async fn ack(&self, message: &QueueMessage) -> QueueResult<()> {
        sqlx::query("DELETE FROM queue_messages WHERE id = $1")
            .bind(message.id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// Durable queue transport
//
// The engine never talks to a broker directly: everything goes through the
// MessageQueue trait, which models an opaque at-least-once transport with
// per-message receive counts and a dead-letter destination.

pub mod memory;
pub mod pg;

pub use memory::MemoryQueue;
pub use pg::PgQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

/// Inbound domain events from the CRUD services
pub const TRIGGER_QUEUE: &str = "workflow-triggers";
/// Step work envelopes scheduled by the enrollment manager
pub const STEP_QUEUE: &str = "workflow-steps";
/// Messages that exhausted their receive attempts
pub const DEAD_LETTER_QUEUE: &str = "workflow-dead-letter";

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// A message delivered by `MessageQueue::receive`
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub id: i64,
    pub queue: String,
    pub payload: JsonValue,
    /// Delivery attempts including this one
    pub receive_count: i32,
    pub sent_at: DateTime<Utc>,
    pub first_received_at: Option<DateTime<Utc>>,
}

/// Transport metadata wrapped around a message when the redrive policy
/// moves it to the dead-letter queue. Field names are part of the wire
/// contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEnvelope {
    pub original: JsonValue,
    pub approximate_receive_count: i32,
    pub sent_timestamp: DateTime<Utc>,
    pub first_receive_timestamp: Option<DateTime<Utc>>,
    pub source_queue: String,
}

/// At-least-once durable transport.
///
/// A received message stays invisible for the configured visibility timeout
/// and is redelivered if not acknowledged. Messages whose receive count
/// exceeds the configured maximum are not delivered again; the transport
/// redirects them to `DEAD_LETTER_QUEUE` wrapped in a `DeadLetterEnvelope`.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn send(&self, queue: &str, payload: JsonValue) -> QueueResult<i64>;

    /// Enqueue a message that stays invisible until `delay` has elapsed
    async fn send_delayed(
        &self,
        queue: &str,
        payload: JsonValue,
        delay: Duration,
    ) -> QueueResult<i64>;

    async fn receive(&self, queue: &str, max_messages: i64) -> QueueResult<Vec<QueueMessage>>;

    /// Delete a message after successful processing. Not acking a message
    /// leaves it for redelivery after the visibility timeout.
    async fn ack(&self, message: &QueueMessage) -> QueueResult<()>;
}

/// Build the dead-letter payload for a message that exhausted its receives.
pub(crate) fn dead_letter_payload(
    payload: &JsonValue,
    receive_count: i32,
    sent_at: DateTime<Utc>,
    first_received_at: Option<DateTime<Utc>>,
    source_queue: &str,
) -> JsonValue {
    serde_json::json!({
        "original": payload,
        "approximateReceiveCount": receive_count,
        "sentTimestamp": sent_at,
        "firstReceiveTimestamp": first_received_at,
        "sourceQueue": source_queue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_letter_envelope_round_trip() {
        let payload = dead_letter_payload(
            &serde_json::json!({"executionId": "abc"}),
            3,
            Utc::now(),
            Some(Utc::now()),
            STEP_QUEUE,
        );

        let envelope: DeadLetterEnvelope = serde_json::from_value(payload).unwrap();
        assert_eq!(envelope.approximate_receive_count, 3);
        assert_eq!(envelope.source_queue, STEP_QUEUE);
        assert_eq!(envelope.original["executionId"], "abc");
    }
}

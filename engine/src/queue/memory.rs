// In-process queue with the same visibility and redrive semantics as
// PgQueue. Used by tests and local development without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{
    dead_letter_payload, MessageQueue, QueueMessage, QueueResult, DEAD_LETTER_QUEUE,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: i64,
    payload: JsonValue,
    sent_at: DateTime<Utc>,
    visible_at: DateTime<Utc>,
    receive_count: i32,
    first_received_at: Option<DateTime<Utc>>,
}

pub struct MemoryQueue {
    queues: Mutex<HashMap<String, Vec<StoredMessage>>>,
    next_id: AtomicI64,
    visibility_timeout_secs: u64,
    max_receive_count: i32,
}

impl MemoryQueue {
    pub fn new(visibility_timeout_secs: u64, max_receive_count: i32) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            visibility_timeout_secs,
            max_receive_count,
        }
    }

    /// Number of messages currently stored on a queue, visible or not.
    pub fn len(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .expect("queue lock poisoned")
            .get(queue)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn send(&self, queue: &str, payload: JsonValue) -> QueueResult<i64> {
        self.send_delayed(queue, payload, Duration::ZERO).await
    }

    async fn send_delayed(
        &self,
        queue: &str,
        payload: JsonValue,
        delay: Duration,
    ) -> QueueResult<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();

        let mut queues = self.queues.lock().expect("queue lock poisoned");
        queues.entry(queue.to_string()).or_default().push(StoredMessage {
            id,
            payload,
            sent_at: now,
            visible_at: now + ChronoDuration::seconds(delay.as_secs() as i64),
            receive_count: 0,
            first_received_at: None,
        });

        Ok(id)
    }

    async fn receive(&self, queue: &str, max_messages: i64) -> QueueResult<Vec<QueueMessage>> {
        let now = Utc::now();
        let mut queues = self.queues.lock().expect("queue lock poisoned");

        // Redrive pass: exhausted messages move to the dead-letter queue.
        if queue != DEAD_LETTER_QUEUE {
            let mut dead = Vec::new();
            if let Some(messages) = queues.get_mut(queue) {
                let mut index = 0;
                while index < messages.len() {
                    let message = &messages[index];
                    if message.visible_at <= now && message.receive_count >= self.max_receive_count {
                        dead.push(messages.remove(index));
                    } else {
                        index += 1;
                    }
                }
            }

            for message in dead {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                queues
                    .entry(DEAD_LETTER_QUEUE.to_string())
                    .or_default()
                    .push(StoredMessage {
                        id,
                        payload: dead_letter_payload(
                            &message.payload,
                            message.receive_count,
                            message.sent_at,
                            message.first_received_at,
                            queue,
                        ),
                        sent_at: now,
                        visible_at: now,
                        receive_count: 0,
                        first_received_at: None,
                    });
            }
        }

        let mut delivered = Vec::new();
        if let Some(messages) = queues.get_mut(queue) {
            for message in messages.iter_mut() {
                if delivered.len() as i64 >= max_messages {
                    break;
                }
                if message.visible_at > now {
                    continue;
                }
                message.receive_count += 1;
                message.visible_at =
                    now + ChronoDuration::seconds(self.visibility_timeout_secs as i64);
                message.first_received_at.get_or_insert(now);

                delivered.push(QueueMessage {
                    id: message.id,
                    queue: queue.to_string(),
                    payload: message.payload.clone(),
                    receive_count: message.receive_count,
                    sent_at: message.sent_at,
                    first_received_at: message.first_received_at,
                });
            }
        }

        Ok(delivered)
    }

    async fn ack(&self, message: &QueueMessage) -> QueueResult<()> {
        let mut queues = self.queues.lock().expect("queue lock poisoned");
        if let Some(messages) = queues.get_mut(&message.queue) {
            messages.retain(|m| m.id != message.id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{DeadLetterEnvelope, STEP_QUEUE};

    #[tokio::test]
    async fn test_send_receive_ack() {
        let queue = MemoryQueue::new(30, 3);

        queue
            .send(STEP_QUEUE, serde_json::json!({"n": 1}))
            .await
            .unwrap();

        let received = queue.receive(STEP_QUEUE, 10).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].receive_count, 1);

        // Invisible until the visibility timeout elapses.
        let again = queue.receive(STEP_QUEUE, 10).await.unwrap();
        assert!(again.is_empty());

        queue.ack(&received[0]).await.unwrap();
        assert!(queue.is_empty(STEP_QUEUE));
    }

    #[tokio::test]
    async fn test_delayed_message_not_visible() {
        let queue = MemoryQueue::new(30, 3);

        queue
            .send_delayed(
                STEP_QUEUE,
                serde_json::json!({"n": 1}),
                Duration::from_secs(3600),
            )
            .await
            .unwrap();

        let received = queue.receive(STEP_QUEUE, 10).await.unwrap();
        assert!(received.is_empty());
        assert_eq!(queue.len(STEP_QUEUE), 1);
    }

    #[tokio::test]
    async fn test_unacked_message_redelivered_with_higher_count() {
        // Zero visibility timeout: an unacked message is immediately
        // eligible again, standing in for an expired visibility window.
        let queue = MemoryQueue::new(0, 3);

        queue
            .send(STEP_QUEUE, serde_json::json!({"n": 1}))
            .await
            .unwrap();

        let first = queue.receive(STEP_QUEUE, 10).await.unwrap();
        assert_eq!(first[0].receive_count, 1);

        let second = queue.receive(STEP_QUEUE, 10).await.unwrap();
        assert_eq!(second[0].receive_count, 2);
        assert_eq!(second[0].id, first[0].id);
    }

    #[tokio::test]
    async fn test_exhausted_message_moves_to_dead_letter() {
        let queue = MemoryQueue::new(0, 3);

        queue
            .send(STEP_QUEUE, serde_json::json!({"executionId": "x"}))
            .await
            .unwrap();

        for _ in 0..3 {
            let received = queue.receive(STEP_QUEUE, 10).await.unwrap();
            assert_eq!(received.len(), 1);
        }

        // Fourth poll: receive count is exhausted, so the message is
        // redirected instead of delivered.
        let received = queue.receive(STEP_QUEUE, 10).await.unwrap();
        assert!(received.is_empty());
        assert!(queue.is_empty(STEP_QUEUE));

        let dead = queue.receive(DEAD_LETTER_QUEUE, 10).await.unwrap();
        assert_eq!(dead.len(), 1);

        let envelope: DeadLetterEnvelope =
            serde_json::from_value(dead[0].payload.clone()).unwrap();
        assert_eq!(envelope.approximate_receive_count, 3);
        assert_eq!(envelope.source_queue, STEP_QUEUE);
        assert_eq!(envelope.original["executionId"], "x");
    }
}

// Dead-letter processor
//
// Consumes messages the transport gave up on, converts them into durable
// failed executions, keeps the workflow counters honest, and alerts
// tenant admins who opted in. Per-message failures never halt the batch.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::context::EngineDeps;
use super::envelope::StepEnvelope;
use crate::config::QueueConfig;
use crate::queue::{DeadLetterEnvelope, QueueError, DEAD_LETTER_QUEUE};
use crate::services::WorkflowFailureNotice;
use crate::stores::StoreError;

#[derive(Error, Debug)]
pub enum DeadLetterError {
    #[error("Malformed dead-letter payload: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Aggregate counters for one processing batch
#[derive(Debug, Default)]
pub struct DeadLetterResult {
    pub messages_processed: i32,
    pub executions_failed: i32,
    pub notifications_sent: i32,
    pub errors: Vec<String>,
}

struct MessageOutcome {
    execution_failed: bool,
    notification_sent: bool,
}

pub struct DeadLetterProcessor {
    deps: Arc<EngineDeps>,
    config: QueueConfig,
}

impl DeadLetterProcessor {
    pub fn new(deps: Arc<EngineDeps>, config: QueueConfig) -> Self {
        Self { deps, config }
    }

    pub async fn run(self) {
        info!("Dead-letter processor started");
        loop {
            let result = self.run_batch().await;

            if result.messages_processed > 0 || !result.errors.is_empty() {
                info!(
                    "Dead-letter batch: {} processed, {} executions failed, {} notifications sent, {} errors",
                    result.messages_processed,
                    result.executions_failed,
                    result.notifications_sent,
                    result.errors.len()
                );
            }

            if result.messages_processed == 0 {
                tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
            }
        }
    }

    pub async fn run_batch(&self) -> DeadLetterResult {
        let mut result = DeadLetterResult::default();

        let messages = match self
            .deps
            .queue
            .receive(DEAD_LETTER_QUEUE, self.config.batch_size)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                result.errors.push(format!("dead-letter receive failed: {}", e));
                return result;
            }
        };

        for message in &messages {
            match self.process_message(&message.payload).await {
                Ok(outcome) => {
                    result.messages_processed += 1;
                    if outcome.execution_failed {
                        result.executions_failed += 1;
                    }
                    if outcome.notification_sent {
                        result.notifications_sent += 1;
                    }
                    if let Err(e) = self.deps.queue.ack(message).await {
                        result.errors.push(format!("ack failed for {}: {}", message.id, e));
                    }
                }
                Err(e) => {
                    warn!("Dead-letter message {} failed: {}", message.id, e);
                    result.errors.push(format!("message {}: {}", message.id, e));
                }
            }
        }

        result
    }

    async fn process_message(
        &self,
        payload: &serde_json::Value,
    ) -> Result<MessageOutcome, DeadLetterError> {
        let envelope: DeadLetterEnvelope = serde_json::from_value(payload.clone())?;

        let Ok(step) = serde_json::from_value::<StepEnvelope>(envelope.original.clone()) else {
            // A trigger died before any execution existed. There is no
            // execution row to fail, but a known workflow still gets its
            // failure counted.
            if let Some(workflow_id) = envelope
                .original
                .get("workflowId")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<Uuid>().ok())
            {
                self.deps.workflows.increment_failed(workflow_id).await?;
            }
            return Ok(MessageOutcome {
                execution_failed: false,
                notification_sent: false,
            });
        };

        let last_error = step
            .retry_context
            .last_error
            .clone()
            .unwrap_or_else(|| "step exhausted its receive attempts".to_string());

        let error_details = json!({
            "lastError": last_error,
            "attemptCount": envelope.approximate_receive_count,
            "sentTimestamp": envelope.sent_timestamp,
            "firstReceiveTimestamp": envelope.first_receive_timestamp,
            "sourceQueue": envelope.source_queue,
            "stepId": step.step_id,
            "action": step.action,
        });

        let transitioned = self
            .deps
            .executions
            .fail_from_dead_letter(step.execution_id, error_details)
            .await?;

        if !transitioned {
            // Already failed: a replayed dead-letter message must not
            // move the counters again.
            return Ok(MessageOutcome {
                execution_failed: false,
                notification_sent: false,
            });
        }

        self.deps.workflows.record_failure(step.workflow_id).await?;

        self.deps.realtime.emit(
            "execution.failed",
            step.tenant_id,
            json!({
                "executionId": step.execution_id,
                "workflowId": step.workflow_id,
                "lastError": last_error,
            }),
        );

        let notification_sent = self
            .notify_tenant(&step, &envelope, &last_error)
            .await
            .unwrap_or_else(|e| {
                warn!(
                    "Failure notification for execution {} not sent: {}",
                    step.execution_id, e
                );
                false
            });

        Ok(MessageOutcome {
            execution_failed: true,
            notification_sent,
        })
    }

    /// Best-effort tenant alert; any error is swallowed by the caller.
    async fn notify_tenant(
        &self,
        step: &StepEnvelope,
        envelope: &DeadLetterEnvelope,
        last_error: &str,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let Some(email) = self.deps.email.as_ref() else {
            return Ok(false);
        };

        let settings = self.deps.tenants.settings(step.tenant_id).await?;
        if !settings.notify_on_workflow_failure || settings.admin_emails.is_empty() {
            return Ok(false);
        }

        let tenant_name = self
            .deps
            .tenants
            .get(step.tenant_id)
            .await?
            .map(|t| t.name)
            .unwrap_or_else(|| "your account".to_string());
        let workflow_name = self
            .deps
            .workflows
            .get(step.workflow_id)
            .await?
            .map(|w| w.name)
            .unwrap_or_else(|| step.workflow_id.to_string());

        let notice = WorkflowFailureNotice {
            tenant_name,
            workflow_name,
            execution_id: step.execution_id,
            failed_at: Utc::now(),
            retry_count: envelope.approximate_receive_count,
            last_error: last_error.to_string(),
            dashboard_url: self.deps.failed_executions_url(),
        };
        let template = email.workflow_failed_template(&notice);

        let mut sent = false;
        for admin in &settings.admin_emails {
            match email
                .send_email(
                    admin,
                    None,
                    &template.subject,
                    &template.html_body,
                    template.text_body.as_deref(),
                )
                .await
            {
                Ok(()) => sent = true,
                Err(e) => warn!("Failure alert to {} not delivered: {}", admin, e),
            }
        }

        Ok(sent)
    }
}

// Queue consumers
//
// TriggerConsumer turns inbound domain events into enrollments;
// StepConsumer executes one step envelope at a time. Both are safe to run
// in any number of concurrent copies: step ordering is causal (a step is
// only enqueued after its predecessor commits) and everything else is
// guarded by idempotent state transitions.
//
// A message is acked only after successful processing; failures leave it
// for transport redelivery, which converges on the dead-letter queue.

use kennelflow_shared::{DomainEvent, RecordKind};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::actions::ActionDispatcher;
use super::context::{EngineDeps, ExecutionContext};
use super::enrollment;
use super::envelope::StepEnvelope;
use super::model::{LogEvent, LogStatus};
use crate::config::QueueConfig;
use crate::queue::{QueueError, QueueMessage, STEP_QUEUE, TRIGGER_QUEUE};
use crate::records::RecordError;
use crate::stores::StoreError;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Malformed message payload: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Enrollment(#[from] enrollment::EnrollmentError),
    #[error("Step {0} not found")]
    StepMissing(uuid::Uuid),
    #[error("Step {step} does not belong to workflow {workflow}")]
    StepMismatch { step: uuid::Uuid, workflow: uuid::Uuid },
    #[error("Unknown record type '{0}'")]
    UnknownRecordType(String),
    #[error("Record {0} no longer exists")]
    RecordMissing(uuid::Uuid),
    #[error("Action failed: {0}")]
    ActionFailed(String),
}

pub struct TriggerConsumer {
    deps: Arc<EngineDeps>,
    config: QueueConfig,
}

impl TriggerConsumer {
    pub fn new(deps: Arc<EngineDeps>, config: QueueConfig) -> Self {
        Self { deps, config }
    }

    pub async fn run(self) {
        info!("Trigger consumer started");
        loop {
            match self.poll().await {
                Ok(0) => {
                    tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                }
                Ok(n) => debug!("Processed {} trigger messages", n),
                Err(e) => {
                    warn!("Trigger poll failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                }
            }
        }
    }

    pub async fn poll(&self) -> Result<usize, QueueError> {
        let messages = self
            .deps
            .queue
            .receive(TRIGGER_QUEUE, self.config.batch_size)
            .await?;
        let mut processed = 0;

        for message in &messages {
            match self.process(message).await {
                Ok(()) => {
                    self.deps.queue.ack(message).await?;
                    processed += 1;
                }
                Err(e) => {
                    warn!(
                        "Trigger message {} failed (attempt {}): {}",
                        message.id, message.receive_count, e
                    );
                }
            }
        }

        Ok(processed)
    }

    async fn process(&self, message: &QueueMessage) -> Result<(), ConsumerError> {
        let event: DomainEvent = serde_json::from_value(message.payload.clone())?;
        let enrolled = enrollment::process_event(&self.deps, &event).await?;

        if !enrolled.is_empty() {
            debug!(
                "Event {} enrolled {} execution(s)",
                event.event_type,
                enrolled.len()
            );
        }

        Ok(())
    }
}

pub struct StepConsumer {
    deps: Arc<EngineDeps>,
    dispatcher: Arc<ActionDispatcher>,
    config: QueueConfig,
}

impl StepConsumer {
    pub fn new(deps: Arc<EngineDeps>, dispatcher: Arc<ActionDispatcher>, config: QueueConfig) -> Self {
        Self {
            deps,
            dispatcher,
            config,
        }
    }

    pub async fn run(self) {
        info!("Step consumer started");
        loop {
            match self.poll().await {
                Ok(0) => {
                    tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                }
                Ok(n) => debug!("Processed {} step messages", n),
                Err(e) => {
                    warn!("Step poll failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                }
            }
        }
    }

    pub async fn poll(&self) -> Result<usize, QueueError> {
        let messages = self
            .deps
            .queue
            .receive(STEP_QUEUE, self.config.batch_size)
            .await?;
        let mut processed = 0;

        for message in &messages {
            match self.process_step(message).await {
                Ok(()) => {
                    self.deps.queue.ack(message).await?;
                    processed += 1;
                }
                Err(e) => {
                    warn!(
                        "Step message {} failed (attempt {}): {}",
                        message.id, message.receive_count, e
                    );
                }
            }
        }

        Ok(processed)
    }

    async fn process_step(&self, message: &QueueMessage) -> Result<(), ConsumerError> {
        let envelope: StepEnvelope = serde_json::from_value(message.payload.clone())?;

        let Some(execution) = self.deps.executions.get(envelope.execution_id).await? else {
            // Retention may have pruned the execution; nothing to do.
            warn!("Execution {} no longer exists; dropping step", envelope.execution_id);
            return Ok(());
        };

        // Cooperative cancellation: an already-terminal execution turns
        // the step into a no-op instead of a failure.
        if !execution.status.is_active() {
            debug!(
                "Execution {} is {}; dropping step {}",
                execution.id, execution.status, envelope.step_id
            );
            return Ok(());
        }

        let Some(step) = self.deps.workflows.get_step(envelope.step_id).await? else {
            return Err(ConsumerError::StepMissing(envelope.step_id));
        };
        if step.workflow_id != execution.workflow_id {
            return Err(ConsumerError::StepMismatch {
                step: step.id,
                workflow: execution.workflow_id,
            });
        }

        if !self.deps.executions.mark_running(execution.id).await? {
            // Lost a race with cancellation between the status read and
            // the claim; treat as a skip.
            return Ok(());
        }

        let kind = RecordKind::parse(&execution.record_type)
            .ok_or_else(|| ConsumerError::UnknownRecordType(execution.record_type.clone()))?;
        let record = self
            .deps
            .records
            .get(kind, execution.tenant_id, execution.record_id)
            .await?
            .ok_or(ConsumerError::RecordMissing(execution.record_id))?;

        let ctx = ExecutionContext {
            record,
            tenant_id: execution.tenant_id,
            workflow_id: execution.workflow_id,
            execution_id: execution.id,
            step_id: step.id,
            deps: &self.deps,
        };

        let result = self
            .dispatcher
            .execute(&step.action_type, &step.action_config, &ctx)
            .await;

        let log_event = if result.skipped {
            LogEvent::ActionSkipped
        } else {
            LogEvent::ActionExecuted
        };
        let log_status = if result.success {
            LogStatus::Success
        } else {
            LogStatus::Failure
        };
        self.deps
            .execution_logs
            .append(
                execution.id,
                Some(step.id),
                log_event,
                log_status,
                result.error.as_deref(),
                serde_json::json!({
                    "action": step.action_type,
                    "output": result.output,
                    "attempt": message.receive_count,
                }),
            )
            .await?;

        if !result.success {
            return Err(ConsumerError::ActionFailed(
                result.error.unwrap_or_else(|| "action failed".to_string()),
            ));
        }

        match step.next_step_id {
            Some(next_id) => {
                let Some(next_step) = self.deps.workflows.get_step(next_id).await? else {
                    return Err(ConsumerError::StepMissing(next_id));
                };

                self.deps.executions.advance_to(execution.id, next_id).await?;
                self.deps
                    .queue
                    .send(
                        STEP_QUEUE,
                        serde_json::to_value(StepEnvelope {
                            execution_id: execution.id,
                            workflow_id: execution.workflow_id,
                            tenant_id: execution.tenant_id,
                            step_id: next_id,
                            action: next_step.action_type.clone(),
                            retry_context: Default::default(),
                        })
                        .map_err(QueueError::Serialization)?,
                    )
                    .await?;
            }
            None => {
                if self.deps.executions.complete(execution.id).await? {
                    self.deps
                        .workflows
                        .decrement_active(execution.workflow_id)
                        .await?;
                    info!("Execution {} completed", execution.id);
                }
            }
        }

        Ok(())
    }
}

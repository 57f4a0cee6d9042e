// Execution/enrollment manager
//
// Owns creation of WorkflowExecution rows and the guards around them:
// self-reference, inactive targets, object-type mismatch, duplicate
// active enrollment, and the re-enrollment cool-down.

use chrono::{DateTime, Duration, Utc};
use kennelflow_shared::DomainEvent;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::context::EngineDeps;
use super::envelope::{RetryContext, StepEnvelope};
use super::model::{
    LogEvent, LogStatus, WorkflowExecution, WorkflowSettings, WorkflowStatus,
};
use crate::queue::{QueueError, STEP_QUEUE};
use crate::stores::StoreError;

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("Workflow {0} has no entry step")]
    NoEntryStep(Uuid),
}

/// Provenance of a programmatic enrollment or unenrollment.
#[derive(Debug, Clone, Copy)]
pub struct EnrollmentSource {
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Uuid,
}

impl EnrollmentSource {
    fn provenance(&self) -> JsonValue {
        json!({
            "workflowId": self.workflow_id,
            "executionId": self.execution_id,
            "stepId": self.step_id,
        })
    }
}

#[derive(Debug)]
pub struct EnrollRequest {
    pub target_workflow_id: Uuid,
    pub tenant_id: Uuid,
    pub record_type: String,
    pub record_id: Uuid,
    /// Present when another workflow's enroll action is the caller.
    pub source: Option<EnrollmentSource>,
    pub metadata: JsonValue,
}

#[derive(Debug)]
pub enum EnrollDecision {
    Enrolled { execution_id: Uuid },
    /// Target not active; upstream automations are not aborted.
    SkippedInactive,
    SkippedDuplicate { execution_id: Uuid },
    SkippedReenrollmentDisallowed,
    SkippedCoolDown { next_eligible: DateTime<Utc> },
    RejectedCircular,
    RejectedTypeMismatch { expected: String, actual: String },
    RejectedNotFound,
}

/// Re-enrollment policy evaluation against the most recent prior
/// execution for the same (workflow, record).
#[derive(Debug, PartialEq)]
pub enum ReenrollmentDecision {
    Allowed,
    Disallowed,
    CoolingDown { next_eligible: DateTime<Utc> },
}

pub fn evaluate_reenrollment(
    settings: &WorkflowSettings,
    prior: Option<&WorkflowExecution>,
    now: DateTime<Utc>,
) -> ReenrollmentDecision {
    let Some(prior) = prior else {
        return ReenrollmentDecision::Allowed;
    };

    if !settings.allow_reenrollment {
        return ReenrollmentDecision::Disallowed;
    }

    if let Some(delay_days) = settings.reenrollment_delay_days {
        let next_eligible = prior.started_at + Duration::days(delay_days);
        if now < next_eligible {
            return ReenrollmentDecision::CoolingDown { next_eligible };
        }
    }

    ReenrollmentDecision::Allowed
}

/// Create, re-enroll, or reject an execution per the entry rules.
pub async fn enroll(
    deps: &EngineDeps,
    request: EnrollRequest,
) -> Result<EnrollDecision, EnrollmentError> {
    if let Some(source) = &request.source {
        if source.workflow_id == request.target_workflow_id {
            return Ok(EnrollDecision::RejectedCircular);
        }
    }

    let Some(workflow) = deps.workflows.get(request.target_workflow_id).await? else {
        return Ok(EnrollDecision::RejectedNotFound);
    };
    if workflow.tenant_id != request.tenant_id {
        return Ok(EnrollDecision::RejectedNotFound);
    }

    if workflow.status != WorkflowStatus::Active {
        return Ok(EnrollDecision::SkippedInactive);
    }

    if workflow.object_type != request.record_type {
        return Ok(EnrollDecision::RejectedTypeMismatch {
            expected: workflow.object_type.clone(),
            actual: request.record_type.clone(),
        });
    }

    if let Some(existing) = deps
        .executions
        .find_active(workflow.id, &request.record_type, request.record_id)
        .await?
    {
        return Ok(EnrollDecision::SkippedDuplicate {
            execution_id: existing.id,
        });
    }

    let prior = deps
        .executions
        .find_latest(workflow.id, &request.record_type, request.record_id)
        .await?;
    match evaluate_reenrollment(&workflow.parsed_settings(), prior.as_ref(), Utc::now()) {
        ReenrollmentDecision::Allowed => {}
        ReenrollmentDecision::Disallowed => {
            return Ok(EnrollDecision::SkippedReenrollmentDisallowed);
        }
        ReenrollmentDecision::CoolingDown { next_eligible } => {
            return Ok(EnrollDecision::SkippedCoolDown { next_eligible });
        }
    }

    let entry_step = deps
        .workflows
        .entry_step(workflow.id)
        .await?
        .ok_or(EnrollmentError::NoEntryStep(workflow.id))?;

    let mut metadata = request.metadata;
    if let Some(source) = &request.source {
        if let Some(map) = metadata.as_object_mut() {
            map.insert("enrolledBy".to_string(), source.provenance());
        }
    }

    let execution = deps
        .executions
        .create(
            request.tenant_id,
            workflow.id,
            &request.record_type,
            request.record_id,
            entry_step.id,
            metadata.clone(),
        )
        .await?;

    deps.workflows.increment_active(workflow.id).await?;

    deps.execution_logs
        .append(
            execution.id,
            Some(entry_step.id),
            LogEvent::Enrolled,
            LogStatus::Success,
            Some(&format!(
                "Enrolled {} {} in workflow '{}'",
                request.record_type, request.record_id, workflow.name
            )),
            metadata,
        )
        .await?;

    deps.queue
        .send(
            STEP_QUEUE,
            serde_json::to_value(StepEnvelope {
                execution_id: execution.id,
                workflow_id: workflow.id,
                tenant_id: request.tenant_id,
                step_id: entry_step.id,
                action: entry_step.action_type.clone(),
                retry_context: RetryContext::default(),
            })
            .map_err(QueueError::Serialization)?,
        )
        .await?;

    info!(
        "Enrolled {} {} in workflow '{}' (execution {})",
        request.record_type, request.record_id, workflow.name, execution.id
    );

    Ok(EnrollDecision::Enrolled {
        execution_id: execution.id,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnenrollTarget {
    /// Every workflow the record is actively enrolled in, except the
    /// invoking one.
    All,
    Workflow(Uuid),
}

#[derive(Debug)]
pub struct UnenrollRequest {
    pub tenant_id: Uuid,
    pub record_type: String,
    pub record_id: Uuid,
    pub target: UnenrollTarget,
    pub source: Option<EnrollmentSource>,
}

/// Cancel matching active executions. Absence of a match is not an
/// error; the caller turns an empty result into a skip.
pub async fn unenroll(
    deps: &EngineDeps,
    request: UnenrollRequest,
) -> Result<Vec<Uuid>, EnrollmentError> {
    let exclude = request
        .source
        .map(|s| s.workflow_id)
        .unwrap_or_else(Uuid::nil);

    let mut matches = deps
        .executions
        .find_active_for_record(
            request.tenant_id,
            &request.record_type,
            request.record_id,
            exclude,
        )
        .await?;

    if let UnenrollTarget::Workflow(target) = request.target {
        matches.retain(|e| e.workflow_id == target);
    }

    let mut cancelled = Vec::new();
    for execution in matches {
        let mut provenance = json!({ "reason": "unenroll_from_workflow" });
        if let Some(source) = &request.source {
            if let Some(map) = provenance.as_object_mut() {
                map.insert("unenrolledBy".to_string(), source.provenance());
            }
        }

        if deps
            .executions
            .cancel(execution.id, provenance.clone())
            .await?
        {
            deps.workflows.decrement_active(execution.workflow_id).await?;
            deps.execution_logs
                .append(
                    execution.id,
                    execution.current_step_id,
                    LogEvent::Unenrolled,
                    LogStatus::Success,
                    Some("Cancelled by unenroll action"),
                    provenance,
                )
                .await?;
            cancelled.push(execution.id);
        }
    }

    Ok(cancelled)
}

/// Trigger intake: match a domain event against the tenant's active
/// workflows and apply the entry rules per match.
pub async fn process_event(
    deps: &EngineDeps,
    event: &DomainEvent,
) -> Result<Vec<Uuid>, EnrollmentError> {
    let workflows = deps.workflows.active_for_tenant(event.tenant_id).await?;
    let mut enrolled = Vec::new();

    for workflow in workflows
        .iter()
        .filter(|w| w.listens_to(event.event_type.as_str()))
    {
        if workflow.object_type != event.record_type.as_str() {
            debug!(
                "Workflow '{}' listens to {} but targets {}, not {}; skipping",
                workflow.name,
                event.event_type,
                workflow.object_type,
                event.record_type
            );
            continue;
        }

        let decision = enroll(
            deps,
            EnrollRequest {
                target_workflow_id: workflow.id,
                tenant_id: event.tenant_id,
                record_type: event.record_type.as_str().to_string(),
                record_id: event.record_id,
                source: None,
                metadata: json!({
                    "source": "event",
                    "eventType": event.event_type.as_str(),
                }),
            },
        )
        .await?;

        match decision {
            EnrollDecision::Enrolled { execution_id } => enrolled.push(execution_id),
            other => debug!(
                "Event {} did not enroll in workflow '{}': {:?}",
                event.event_type, workflow.name, other
            ),
        }
    }

    Ok(enrolled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::model::ExecutionStatus;

    fn prior_execution(started_at: DateTime<Utc>) -> WorkflowExecution {
        WorkflowExecution {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            record_type: "pet".to_string(),
            record_id: Uuid::new_v4(),
            status: ExecutionStatus::Completed,
            current_step_id: None,
            started_at,
            completed_at: Some(started_at),
            ended_at: None,
            error_details: None,
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn test_enrolling_into_the_source_workflow_is_circular() {
        let deps = crate::workflows::testutil::lazy_deps();
        let workflow_id = Uuid::new_v4();

        // The guard fires before any store access, so no execution can
        // ever be created for a self-referential enroll action.
        let decision = enroll(
            &deps,
            EnrollRequest {
                target_workflow_id: workflow_id,
                tenant_id: Uuid::new_v4(),
                record_type: "pet".to_string(),
                record_id: Uuid::new_v4(),
                source: Some(EnrollmentSource {
                    workflow_id,
                    execution_id: Uuid::new_v4(),
                    step_id: Uuid::new_v4(),
                }),
                metadata: json!({}),
            },
        )
        .await
        .unwrap();

        assert!(matches!(decision, EnrollDecision::RejectedCircular));
    }

    #[test]
    fn test_first_enrollment_is_allowed() {
        let settings = WorkflowSettings::default();
        assert_eq!(
            evaluate_reenrollment(&settings, None, Utc::now()),
            ReenrollmentDecision::Allowed
        );
    }

    #[test]
    fn test_reenrollment_disallowed_by_default() {
        let settings = WorkflowSettings::default();
        let prior = prior_execution(Utc::now() - Duration::days(30));
        assert_eq!(
            evaluate_reenrollment(&settings, Some(&prior), Utc::now()),
            ReenrollmentDecision::Disallowed
        );
    }

    #[test]
    fn test_cool_down_computes_next_eligible() {
        let settings = WorkflowSettings {
            allow_reenrollment: true,
            reenrollment_delay_days: Some(7),
        };
        let started = Utc::now() - Duration::days(3);
        let prior = prior_execution(started);

        match evaluate_reenrollment(&settings, Some(&prior), Utc::now()) {
            ReenrollmentDecision::CoolingDown { next_eligible } => {
                assert_eq!(next_eligible, started + Duration::days(7));
            }
            other => panic!("expected cool-down, got {:?}", other),
        }
    }

    #[test]
    fn test_reenrollment_allowed_after_delay() {
        let settings = WorkflowSettings {
            allow_reenrollment: true,
            reenrollment_delay_days: Some(7),
        };
        let prior = prior_execution(Utc::now() - Duration::days(8));
        assert_eq!(
            evaluate_reenrollment(&settings, Some(&prior), Utc::now()),
            ReenrollmentDecision::Allowed
        );
    }

    #[test]
    fn test_reenrollment_without_delay_allowed_immediately() {
        let settings = WorkflowSettings {
            allow_reenrollment: true,
            reenrollment_delay_days: None,
        };
        let prior = prior_execution(Utc::now() - Duration::seconds(5));
        assert_eq!(
            evaluate_reenrollment(&settings, Some(&prior), Utc::now()),
            ReenrollmentDecision::Allowed
        );
    }
}

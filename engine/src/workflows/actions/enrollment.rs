// Cross-workflow enrollment executors

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use super::{
    config_str, config_uuid, ActionError, ActionExecutor, ActionKind, ActionOutcome, ActionResult,
    ValidationOutcome,
};
use crate::workflows::context::ExecutionContext;
use crate::workflows::enrollment::{
    self, EnrollDecision, EnrollRequest, EnrollmentError, EnrollmentSource, UnenrollRequest,
    UnenrollTarget,
};

fn source_of(ctx: &ExecutionContext<'_>) -> EnrollmentSource {
    EnrollmentSource {
        workflow_id: ctx.workflow_id,
        execution_id: ctx.execution_id,
        step_id: ctx.step_id,
    }
}

fn map_enrollment_error(error: EnrollmentError) -> ActionError {
    match error {
        EnrollmentError::Store(e) => ActionError::Store(e),
        EnrollmentError::Queue(e) => ActionError::Queue(e),
        EnrollmentError::NoEntryStep(workflow_id) => ActionError::InvalidConfig(format!(
            "target workflow {} has no entry step",
            workflow_id
        )),
    }
}

pub struct EnrollInWorkflowExecutor;

#[async_trait]
impl ActionExecutor for EnrollInWorkflowExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::EnrollInWorkflow
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        let mut errors = Vec::new();
        match config_str(config, "workflow_id") {
            None => errors.push("'workflow_id' is required".to_string()),
            Some(workflow_id) => {
                if workflow_id.parse::<Uuid>().is_err() {
                    errors.push("'workflow_id' must be a UUID".to_string());
                }
            }
        }
        ValidationOutcome::from_errors(errors)
    }

    async fn execute(&self, config: &JsonValue, ctx: &ExecutionContext<'_>) -> ActionResult {
        let target = config_uuid(config, "workflow_id")
            .ok_or_else(|| ActionError::InvalidConfig("'workflow_id' is required".to_string()))?;

        let record_type = ctx.record_str("_type").unwrap_or("unknown").to_string();
        let record_id = ctx
            .record_id()
            .ok_or(ActionError::MissingRecordField("id"))?;

        let decision = enrollment::enroll(
            ctx.deps,
            EnrollRequest {
                target_workflow_id: target,
                tenant_id: ctx.tenant_id,
                record_type,
                record_id,
                source: Some(source_of(ctx)),
                metadata: json!({ "source": "workflow" }),
            },
        )
        .await
        .map_err(map_enrollment_error)?;

        match decision {
            EnrollDecision::Enrolled { execution_id } => Ok(ActionOutcome::success(json!({
                "executionId": execution_id,
                "workflowId": target,
            }))),
            EnrollDecision::SkippedInactive => {
                Ok(ActionOutcome::skipped("target workflow is not active"))
            }
            EnrollDecision::SkippedDuplicate { execution_id } => Ok(ActionOutcome::skipped(
                format!("record already has an active execution ({})", execution_id),
            )),
            EnrollDecision::SkippedReenrollmentDisallowed => Ok(ActionOutcome::skipped(
                "target workflow does not allow re-enrollment",
            )),
            EnrollDecision::SkippedCoolDown { next_eligible } => Ok(ActionOutcome::skipped(
                format!(
                    "re-enrollment cool-down active until {}",
                    next_eligible.to_rfc3339()
                ),
            )),
            EnrollDecision::RejectedCircular => Err(ActionError::CircularEnrollment),
            EnrollDecision::RejectedTypeMismatch { .. } => Err(ActionError::ObjectTypeMismatch),
            EnrollDecision::RejectedNotFound => Err(ActionError::WorkflowNotFound),
        }
    }
}

pub struct UnenrollFromWorkflowExecutor;

#[async_trait]
impl ActionExecutor for UnenrollFromWorkflowExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::UnenrollFromWorkflow
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        let mut errors = Vec::new();
        match config_str(config, "workflow_id") {
            None => errors.push("'workflow_id' is required ('all' to unenroll everywhere)".to_string()),
            Some("all") => {}
            Some(workflow_id) => {
                if workflow_id.parse::<Uuid>().is_err() {
                    errors.push("'workflow_id' must be a UUID or 'all'".to_string());
                }
            }
        }
        ValidationOutcome::from_errors(errors)
    }

    async fn execute(&self, config: &JsonValue, ctx: &ExecutionContext<'_>) -> ActionResult {
        let target = match config_str(config, "workflow_id") {
            Some("all") => UnenrollTarget::All,
            Some(raw) => UnenrollTarget::Workflow(raw.parse().map_err(|_| {
                ActionError::InvalidConfig("'workflow_id' must be a UUID or 'all'".to_string())
            })?),
            None => {
                return Err(ActionError::InvalidConfig(
                    "'workflow_id' is required".to_string(),
                ))
            }
        };

        let record_type = ctx.record_str("_type").unwrap_or("unknown").to_string();
        let record_id = ctx
            .record_id()
            .ok_or(ActionError::MissingRecordField("id"))?;

        let cancelled = enrollment::unenroll(
            ctx.deps,
            UnenrollRequest {
                tenant_id: ctx.tenant_id,
                record_type,
                record_id,
                target,
                source: Some(source_of(ctx)),
            },
        )
        .await
        .map_err(map_enrollment_error)?;

        if cancelled.is_empty() {
            return Ok(ActionOutcome::skipped("no active executions to unenroll"));
        }

        Ok(ActionOutcome::success(json!({
            "cancelledExecutions": cancelled,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enroll_validate() {
        let executor = EnrollInWorkflowExecutor;
        assert!(
            executor
                .validate(&json!({"workflow_id": Uuid::new_v4().to_string()}))
                .valid
        );
        assert!(!executor.validate(&json!({})).valid);
        assert!(!executor.validate(&json!({"workflow_id": "all"})).valid);
    }

    #[test]
    fn test_unenroll_validate_accepts_all() {
        let executor = UnenrollFromWorkflowExecutor;
        assert!(executor.validate(&json!({"workflow_id": "all"})).valid);
        assert!(
            executor
                .validate(&json!({"workflow_id": Uuid::new_v4().to_string()}))
                .valid
        );
        assert!(!executor.validate(&json!({"workflow_id": "none"})).valid);
        assert!(!executor.validate(&json!({})).valid);
    }
}

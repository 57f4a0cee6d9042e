// Test fixtures for engine data structures

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::workflows::envelope::{RetryContext, StepEnvelope};
use crate::workflows::model::{
    ExecutionStatus, Workflow, WorkflowExecution, WorkflowStatus, WorkflowStep,
};

pub struct WorkflowFixture {
    pub workflow: Workflow,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowFixture {
    /// A two-step booking workflow: send a confirmation SMS, then bump
    /// the reminder counter.
    pub fn booking_follow_up(tenant_id: Uuid) -> Self {
        let workflow_id = Uuid::new_v4();
        let first_step = Uuid::new_v4();
        let second_step = Uuid::new_v4();

        let workflow = Workflow {
            id: workflow_id,
            tenant_id,
            name: "Booking follow-up".to_string(),
            object_type: "booking".to_string(),
            status: WorkflowStatus::Active,
            trigger_types: json!(["booking.created"]),
            settings: json!({}),
            active_count: 0,
            failed_count: 0,
            created_at: Utc::now(),
            updated_at: None,
        };

        let steps = vec![
            WorkflowStep {
                id: first_step,
                workflow_id,
                is_entry_point: true,
                action_type: "send_sms".to_string(),
                action_config: json!({
                    "message": "Hi {{owner.firstName}}, your booking is confirmed!"
                }),
                next_step_id: Some(second_step),
                created_at: Utc::now(),
            },
            WorkflowStep {
                id: second_step,
                workflow_id,
                is_entry_point: false,
                action_type: "update_field".to_string(),
                action_config: json!({
                    "field": "reminder_count",
                    "operation": "increment"
                }),
                next_step_id: None,
                created_at: Utc::now(),
            },
        ];

        Self { workflow, steps }
    }
}

pub fn execution_fixture(workflow: &Workflow, status: ExecutionStatus) -> WorkflowExecution {
    WorkflowExecution {
        id: Uuid::new_v4(),
        tenant_id: workflow.tenant_id,
        workflow_id: workflow.id,
        record_type: workflow.object_type.clone(),
        record_id: Uuid::new_v4(),
        status,
        current_step_id: None,
        started_at: Utc::now(),
        completed_at: None,
        ended_at: None,
        error_details: None,
        metadata: json!({}),
    }
}

pub fn step_envelope_fixture(workflow: &Workflow, step: &WorkflowStep) -> StepEnvelope {
    StepEnvelope {
        execution_id: Uuid::new_v4(),
        workflow_id: workflow.id,
        tenant_id: workflow.tenant_id,
        step_id: step.id,
        action: step.action_type.clone(),
        retry_context: RetryContext::default(),
    }
}

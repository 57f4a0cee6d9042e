// Workflow engine data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "workflow_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    Inactive,
    Draft,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "execution_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Active executions block duplicate enrollment and accept step work.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Waiting)
    }

    /// Terminal executions are immutable except for retention deletion.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Tenant-scoped automation definition. Created by configuration tooling;
/// the engine only mutates the counters.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Workflow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub object_type: String,
    pub status: WorkflowStatus,
    pub trigger_types: JsonValue,
    pub settings: JsonValue,
    pub active_count: i32,
    pub failed_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn parsed_settings(&self) -> WorkflowSettings {
        serde_json::from_value(self.settings.clone()).unwrap_or_default()
    }

    /// Whether this workflow subscribes to the given event type.
    pub fn listens_to(&self, event_type: &str) -> bool {
        self.trigger_types
            .as_array()
            .map(|types| types.iter().any(|t| t.as_str() == Some(event_type)))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowSettings {
    pub allow_reenrollment: bool,
    pub reenrollment_delay_days: Option<i64>,
}

/// Ordered node within a workflow. Immutable once an execution references
/// it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub is_entry_point: bool,
    pub action_type: String,
    pub action_config: JsonValue,
    pub next_step_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// One enrollment instance of a workflow against a record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_id: Uuid,
    pub record_type: String,
    pub record_id: Uuid,
    pub status: ExecutionStatus,
    pub current_step_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error_details: Option<JsonValue>,
    pub metadata: JsonValue,
}

/// Append-only audit trail row. Never updated; bulk-deleted by retention.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecutionLog {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Option<Uuid>,
    pub event_type: String,
    pub status: String,
    pub message: Option<String>,
    pub metadata: JsonValue,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    Enrolled,
    Unenrolled,
    ActionExecuted,
    ActionSkipped,
}

impl LogEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enrolled => "enrolled",
            Self::Unenrolled => "unenrolled",
            Self::ActionExecuted => "action_executed",
            Self::ActionSkipped => "action_skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStatus {
    Success,
    Failure,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classification() {
        assert!(ExecutionStatus::Running.is_active());
        assert!(ExecutionStatus::Waiting.is_active());
        assert!(!ExecutionStatus::Completed.is_active());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn test_settings_parse_with_defaults() {
        let workflow = Workflow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Booking follow-up".to_string(),
            object_type: "booking".to_string(),
            status: WorkflowStatus::Active,
            trigger_types: json!(["booking.created"]),
            settings: json!({"allowReenrollment": true, "reenrollmentDelayDays": 7}),
            active_count: 0,
            failed_count: 0,
            created_at: Utc::now(),
            updated_at: None,
        };

        let settings = workflow.parsed_settings();
        assert!(settings.allow_reenrollment);
        assert_eq!(settings.reenrollment_delay_days, Some(7));

        // Malformed settings fall back to defaults rather than failing.
        let defaulted: WorkflowSettings = serde_json::from_value(json!({})).unwrap();
        assert!(!defaulted.allow_reenrollment);
        assert!(defaulted.reenrollment_delay_days.is_none());
    }

    #[test]
    fn test_listens_to() {
        let workflow = Workflow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Vaccination reminder".to_string(),
            object_type: "pet".to_string(),
            status: WorkflowStatus::Active,
            trigger_types: json!(["pet.vaccination_expiring"]),
            settings: json!({}),
            active_count: 0,
            failed_count: 0,
            created_at: Utc::now(),
            updated_at: None,
        };

        assert!(workflow.listens_to("pet.vaccination_expiring"));
        assert!(!workflow.listens_to("booking.created"));
    }
}

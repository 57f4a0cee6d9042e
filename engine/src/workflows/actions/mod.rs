// Workflow actions
//
// Each action type is one executor: a stateless strategy that validates
// its config at authoring time and performs exactly one side effect plus
// its audit/communication log write at execution time.

pub mod dispatcher;
pub mod enrollment;
pub mod messaging;
pub mod records;
pub mod segments;
pub mod webhook;

pub use dispatcher::{ActionDispatcher, DispatchResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::context::ExecutionContext;
use crate::queue::QueueError;
use crate::records::RecordError;
use crate::stores::StoreError;

/// Closed set of action types the engine can execute
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendSms,
    SendEmail,
    SendNotification,
    CreateTask,
    UpdateField,
    AddToSegment,
    RemoveFromSegment,
    EnrollInWorkflow,
    UnenrollFromWorkflow,
    Webhook,
}

impl ActionKind {
    pub const ALL: [ActionKind; 10] = [
        Self::SendSms,
        Self::SendEmail,
        Self::SendNotification,
        Self::CreateTask,
        Self::UpdateField,
        Self::AddToSegment,
        Self::RemoveFromSegment,
        Self::EnrollInWorkflow,
        Self::UnenrollFromWorkflow,
        Self::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendSms => "send_sms",
            Self::SendEmail => "send_email",
            Self::SendNotification => "send_notification",
            Self::CreateTask => "create_task",
            Self::UpdateField => "update_field",
            Self::AddToSegment => "add_to_segment",
            Self::RemoveFromSegment => "remove_from_segment",
            Self::EnrollInWorkflow => "enroll_in_workflow",
            Self::UnenrollFromWorkflow => "unenroll_from_workflow",
            Self::Webhook => "webhook",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == s)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed executor failures, surfaced to the step consumer as step
/// failures with the human-readable message preserved.
#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Unknown action type")]
    UnknownActionType,
    #[error("Invalid action config: {0}")]
    InvalidConfig(String),
    #[error("Record has no {0} field")]
    MissingRecordField(&'static str),
    #[error("No SMS gateway configured for tenant")]
    NoSmsGateway,
    #[error("SMS delivery failed: {0}")]
    Sms(String),
    #[error("Email delivery failed: {0}")]
    Email(String),
    #[error("Email template not found")]
    TemplateNotFound,
    #[error("No resolvable target user")]
    NoTargetUser,
    #[error("Segment not found")]
    SegmentNotFound,
    #[error("Segment membership is rule-derived; cannot modify a dynamic segment")]
    DynamicSegment,
    #[error("Workflow cannot enroll records into itself")]
    CircularEnrollment,
    #[error("Record type does not match the target workflow's object type")]
    ObjectTypeMismatch,
    #[error("Target workflow not found")]
    WorkflowNotFound,
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),
    #[error("Webhook returned status {0}")]
    WebhookStatus(u16),
    #[error("Webhook timed out after {0} ms")]
    WebhookTimeout(u64),
    #[error("Webhook request failed: {0}")]
    WebhookRequest(String),
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// What a successful executor run produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ActionOutcome {
    Success(JsonValue),
    Skipped { reason: String },
}

impl ActionOutcome {
    pub fn success(output: JsonValue) -> Self {
        Self::Success(output)
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Authoring-time validation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

pub type ActionResult = Result<ActionOutcome, ActionError>;

/// One action strategy. `validate` must be callable with no live record
/// or database handle; `execute` performs the side effect.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    fn kind(&self) -> ActionKind;

    fn validate(&self, config: &JsonValue) -> ValidationOutcome;

    async fn execute(&self, config: &JsonValue, ctx: &ExecutionContext<'_>) -> ActionResult;
}

/// Config helpers shared by the executors.
pub(crate) fn config_str<'a>(config: &'a JsonValue, key: &str) -> Option<&'a str> {
    config.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

pub(crate) fn config_uuid(config: &JsonValue, key: &str) -> Option<uuid::Uuid> {
    config_str(config, key).and_then(|s| s.parse().ok())
}

pub(crate) fn require_str<'a>(
    config: &'a JsonValue,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<&'a str> {
    let value = config_str(config, key);
    if value.is_none() {
        errors.push(format!("'{}' is required", key));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ActionKind::parse("merge_records"), None);
    }

    #[test]
    fn test_kind_serde_matches_as_str() {
        for kind in ActionKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::json!(kind.as_str()));
        }
    }

    #[test]
    fn test_validation_outcome() {
        assert!(ValidationOutcome::ok().valid);
        let failed = ValidationOutcome::from_errors(vec!["'message' is required".to_string()]);
        assert!(!failed.valid);
        assert_eq!(failed.errors.len(), 1);
    }
}

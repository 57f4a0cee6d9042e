// Action dispatcher
//
// Registry over the closed executor set, built once at startup. Unknown
// action types and executor errors both collapse into a failure result so
// a single bad step can never crash the consumer loop.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::error;

use super::enrollment::{EnrollInWorkflowExecutor, UnenrollFromWorkflowExecutor};
use super::messaging::{SendEmailExecutor, SendNotificationExecutor, SendSmsExecutor};
use super::records::{CreateTaskExecutor, UpdateFieldExecutor};
use super::segments::{AddToSegmentExecutor, RemoveFromSegmentExecutor};
use super::webhook::WebhookExecutor;
use super::{ActionExecutor, ActionKind, ActionOutcome, ValidationOutcome};
use crate::workflows::context::ExecutionContext;

/// Flattened executor result handed to the step consumer.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub success: bool,
    pub skipped: bool,
    pub output: Option<JsonValue>,
    pub error: Option<String>,
}

impl DispatchResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            skipped: false,
            output: None,
            error: Some(message.into()),
        }
    }
}

pub struct ActionDispatcher {
    executors: HashMap<ActionKind, Box<dyn ActionExecutor>>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        let mut executors: HashMap<ActionKind, Box<dyn ActionExecutor>> = HashMap::new();

        let all: Vec<Box<dyn ActionExecutor>> = vec![
            Box::new(SendSmsExecutor),
            Box::new(SendEmailExecutor),
            Box::new(SendNotificationExecutor),
            Box::new(CreateTaskExecutor),
            Box::new(UpdateFieldExecutor),
            Box::new(AddToSegmentExecutor),
            Box::new(RemoveFromSegmentExecutor),
            Box::new(EnrollInWorkflowExecutor),
            Box::new(UnenrollFromWorkflowExecutor),
            Box::new(WebhookExecutor),
        ];
        for executor in all {
            executors.insert(executor.kind(), executor);
        }

        Self { executors }
    }

    /// Execute an action by its type identifier. Fails closed: an unknown
    /// type or an executor error returns a failure result, never a panic.
    pub async fn execute(
        &self,
        action_type: &str,
        config: &JsonValue,
        ctx: &ExecutionContext<'_>,
    ) -> DispatchResult {
        let Some(kind) = ActionKind::parse(action_type) else {
            return DispatchResult::failure(super::ActionError::UnknownActionType.to_string());
        };

        let executor = match self.executors.get(&kind) {
            Some(executor) => executor,
            None => {
                return DispatchResult::failure(super::ActionError::UnknownActionType.to_string())
            }
        };

        match executor.execute(config, ctx).await {
            Ok(ActionOutcome::Success(output)) => DispatchResult {
                success: true,
                skipped: false,
                output: Some(output),
                error: None,
            },
            Ok(ActionOutcome::Skipped { reason }) => DispatchResult {
                success: true,
                skipped: true,
                output: Some(serde_json::json!({ "skipped": true, "reason": reason })),
                error: None,
            },
            Err(e) => {
                error!("Action {} failed for execution {}: {}", kind, ctx.execution_id, e);
                DispatchResult::failure(e.to_string())
            }
        }
    }

    /// Authoring-time validation. Callable without a live record or
    /// database handle.
    pub fn validate(&self, action_type: &str, config: &JsonValue) -> ValidationOutcome {
        match ActionKind::parse(action_type) {
            Some(kind) => match self.executors.get(&kind) {
                Some(executor) => executor.validate(config),
                None => ValidationOutcome::from_errors(vec!["Unknown action type".to_string()]),
            },
            None => ValidationOutcome::from_errors(vec![format!(
                "Unknown action type '{}'",
                action_type
            )]),
        }
    }
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::testutil::lazy_deps;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_registry_covers_every_kind() {
        let dispatcher = ActionDispatcher::new();
        assert_eq!(dispatcher.executors.len(), ActionKind::ALL.len());
    }

    #[tokio::test]
    async fn test_unknown_type_fails_closed() {
        let dispatcher = ActionDispatcher::new();
        let deps = lazy_deps();
        let ctx = ExecutionContext {
            record: json!({"_type": "pet"}),
            tenant_id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            step_id: Uuid::new_v4(),
            deps: &deps,
        };

        let result = dispatcher.execute("launch_rocket", &json!({}), &ctx).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown action type"));
    }

    #[test]
    fn test_validate_without_database() {
        let dispatcher = ActionDispatcher::new();

        // Empty configs must produce errors, not panics, for all kinds.
        for kind in ActionKind::ALL {
            let outcome = dispatcher.validate(kind.as_str(), &json!({}));
            assert!(!outcome.valid, "{} accepted an empty config", kind);
        }

        let unknown = dispatcher.validate("launch_rocket", &json!({}));
        assert!(!unknown.valid);
        assert!(unknown.errors[0].contains("Unknown action type"));
    }

    #[test]
    fn test_validate_accepts_well_formed_configs() {
        let dispatcher = ActionDispatcher::new();

        assert!(
            dispatcher
                .validate("send_sms", &json!({"message": "See you soon, {{name}}!"}))
                .valid
        );
        assert!(
            dispatcher
                .validate(
                    "update_field",
                    &json!({"field": "boarding_count", "operation": "increment"})
                )
                .valid
        );
        assert!(
            dispatcher
                .validate("webhook", &json!({"url": "https://hooks.example/kennel"}))
                .valid
        );
    }
}

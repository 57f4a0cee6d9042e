// Record-mutating executors: create_task and update_field

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value as JsonValue};

use super::messaging::notify_quietly;
use super::{
    config_str, config_uuid, require_str, ActionError, ActionExecutor, ActionKind, ActionOutcome,
    ActionResult, ValidationOutcome,
};
use crate::records::RecordError;
use crate::workflows::context::ExecutionContext;
use crate::workflows::interpolate::interpolate;

pub struct CreateTaskExecutor;

#[async_trait]
impl ActionExecutor for CreateTaskExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::CreateTask
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        let mut errors = Vec::new();
        require_str(config, "title", &mut errors);
        ValidationOutcome::from_errors(errors)
    }

    async fn execute(&self, config: &JsonValue, ctx: &ExecutionContext<'_>) -> ActionResult {
        let title_template = config_str(config, "title")
            .ok_or_else(|| ActionError::InvalidConfig("'title' is required".to_string()))?;

        let title = interpolate(title_template, &ctx.record);
        if title.trim().is_empty() {
            return Err(ActionError::InvalidConfig(
                "task title interpolated to an empty string".to_string(),
            ));
        }

        let description = config_str(config, "description").map(|d| interpolate(d, &ctx.record));
        let due_in_days = config
            .get("due_in_days")
            .and_then(|v| v.as_i64())
            .unwrap_or(1);
        let due_date = Utc::now() + Duration::days(due_in_days);

        let assigned_to =
            config_uuid(config, "assigned_to").or_else(|| ctx.record_uuid("assigned_staff_id"));

        let record_type = ctx.record_str("_type").unwrap_or("unknown").to_string();
        let record_id = ctx.record_id().unwrap_or_else(uuid::Uuid::nil);

        let task = ctx
            .deps
            .tasks
            .create(
                ctx.tenant_id,
                &title,
                description.as_deref(),
                assigned_to,
                &record_type,
                record_id,
                due_date,
            )
            .await?;

        if let Some(assignee) = assigned_to {
            notify_quietly(
                ctx,
                assignee,
                "New task assigned",
                &format!("Task '{}' is due {}", title, due_date.format("%B %-d, %Y")),
                "task",
                task.id,
            )
            .await;
        }

        Ok(ActionOutcome::success(json!({
            "taskId": task.id,
            "dueDate": due_date,
        })))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOperation {
    Set,
    Clear,
    Increment,
    Decrement,
    Append,
    Toggle,
}

impl FieldOperation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "set" => Some(Self::Set),
            "clear" => Some(Self::Clear),
            "increment" => Some(Self::Increment),
            "decrement" => Some(Self::Decrement),
            "append" => Some(Self::Append),
            "toggle" => Some(Self::Toggle),
            _ => None,
        }
    }
}

pub struct UpdateFieldExecutor;

#[async_trait]
impl ActionExecutor for UpdateFieldExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::UpdateField
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        let mut errors = Vec::new();
        require_str(config, "field", &mut errors);

        match require_str(config, "operation", &mut errors).map(FieldOperation::parse) {
            Some(None) => errors.push(format!(
                "unknown operation '{}'",
                config_str(config, "operation").unwrap_or_default()
            )),
            Some(Some(FieldOperation::Set)) if config.get("value").is_none() => {
                errors.push("'value' is required for set".to_string());
            }
            Some(Some(FieldOperation::Append)) if config.get("value").is_none() => {
                errors.push("'value' is required for append".to_string());
            }
            _ => {}
        }

        ValidationOutcome::from_errors(errors)
    }

    async fn execute(&self, config: &JsonValue, ctx: &ExecutionContext<'_>) -> ActionResult {
        let field = config_str(config, "field")
            .ok_or_else(|| ActionError::InvalidConfig("'field' is required".to_string()))?;
        let operation_name = config_str(config, "operation")
            .ok_or_else(|| ActionError::InvalidConfig("'operation' is required".to_string()))?;
        let operation = FieldOperation::parse(operation_name)
            .ok_or_else(|| ActionError::UnknownOperation(operation_name.to_string()))?;

        let kind = ctx.record_kind().ok_or_else(|| {
            ActionError::Record(RecordError::UnmappedType(
                ctx.record_str("_type").unwrap_or("unknown").to_string(),
            ))
        })?;
        let record_id = ctx
            .record_id()
            .ok_or(ActionError::MissingRecordField("id"))?;

        let before = ctx.record.get(field).cloned().unwrap_or(JsonValue::Null);
        let after = apply_field_operation(operation, &before, config.get("value"))?;

        ctx.deps
            .records
            .update_field(kind, ctx.tenant_id, record_id, field, &after)
            .await?;

        ctx.deps
            .audit
            .record(
                ctx.tenant_id,
                "update_field",
                kind.as_str(),
                record_id,
                json!({ "field": field, "before": before, "after": after }),
                json!({
                    "workflowId": ctx.workflow_id,
                    "executionId": ctx.execution_id,
                    "stepId": ctx.step_id,
                }),
            )
            .await?;

        Ok(ActionOutcome::success(json!({
            "field": field,
            "before": before,
            "after": after,
        })))
    }
}

/// Compute the new field value. Numeric operations coerce both operands
/// with a floating-point parse: non-numeric current values count as 0 and
/// a missing delta defaults to 1.
pub fn apply_field_operation(
    operation: FieldOperation,
    current: &JsonValue,
    value: Option<&JsonValue>,
) -> Result<JsonValue, ActionError> {
    match operation {
        FieldOperation::Set => value
            .cloned()
            .ok_or_else(|| ActionError::InvalidConfig("'value' is required for set".to_string())),
        FieldOperation::Clear => Ok(JsonValue::Null),
        FieldOperation::Increment => Ok(json_number(
            coerce_number(current) + value.map(coerce_number).unwrap_or(1.0),
        )),
        FieldOperation::Decrement => Ok(json_number(
            coerce_number(current) - value.map(coerce_number).unwrap_or(1.0),
        )),
        FieldOperation::Append => {
            let value = value.ok_or_else(|| {
                ActionError::InvalidConfig("'value' is required for append".to_string())
            })?;
            match current {
                JsonValue::Array(items) => {
                    let mut items = items.clone();
                    items.push(value.clone());
                    Ok(JsonValue::Array(items))
                }
                JsonValue::Null => Ok(JsonValue::String(render_text(value))),
                current => Ok(JsonValue::String(format!(
                    "{}{}",
                    render_text(current),
                    render_text(value)
                ))),
            }
        }
        FieldOperation::Toggle => {
            let current = current.as_bool().unwrap_or(false);
            Ok(JsonValue::Bool(!current))
        }
    }
}

fn coerce_number(value: &JsonValue) -> f64 {
    match value {
        JsonValue::Number(n) => n.as_f64().unwrap_or(0.0),
        JsonValue::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn json_number(value: f64) -> JsonValue {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

fn render_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_on_null_yields_delta() {
        let result =
            apply_field_operation(FieldOperation::Increment, &JsonValue::Null, Some(&json!(5)))
                .unwrap();
        assert_eq!(result, json!(5));
    }

    #[test]
    fn test_increment_treats_non_numeric_as_zero() {
        let result =
            apply_field_operation(FieldOperation::Increment, &json!("abc"), Some(&json!(5)))
                .unwrap();
        assert_eq!(result, json!(5));
    }

    #[test]
    fn test_increment_parses_numeric_strings() {
        let result =
            apply_field_operation(FieldOperation::Increment, &json!("2.5"), Some(&json!(1)))
                .unwrap();
        assert_eq!(result, json!(3.5));
    }

    #[test]
    fn test_decrement_defaults_delta_to_one() {
        let result = apply_field_operation(FieldOperation::Decrement, &json!(10), None).unwrap();
        assert_eq!(result, json!(9));
    }

    #[test]
    fn test_set_requires_value() {
        assert!(apply_field_operation(FieldOperation::Set, &json!(1), None).is_err());
        let result =
            apply_field_operation(FieldOperation::Set, &json!(1), Some(&json!("vip"))).unwrap();
        assert_eq!(result, json!("vip"));
    }

    #[test]
    fn test_clear_sets_null() {
        let result = apply_field_operation(FieldOperation::Clear, &json!("x"), None).unwrap();
        assert_eq!(result, JsonValue::Null);
    }

    #[test]
    fn test_append_to_string_and_array() {
        let appended =
            apply_field_operation(FieldOperation::Append, &json!("note"), Some(&json!("!")))
                .unwrap();
        assert_eq!(appended, json!("note!"));

        let pushed =
            apply_field_operation(FieldOperation::Append, &json!(["a"]), Some(&json!("b")))
                .unwrap();
        assert_eq!(pushed, json!(["a", "b"]));
    }

    #[test]
    fn test_toggle_flips_and_defaults_to_true() {
        assert_eq!(
            apply_field_operation(FieldOperation::Toggle, &json!(true), None).unwrap(),
            json!(false)
        );
        assert_eq!(
            apply_field_operation(FieldOperation::Toggle, &JsonValue::Null, None).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_update_field_validate() {
        let executor = UpdateFieldExecutor;

        assert!(
            executor
                .validate(&json!({"field": "status", "operation": "set", "value": "confirmed"}))
                .valid
        );
        assert!(
            executor
                .validate(&json!({"field": "reminder_count", "operation": "increment"}))
                .valid
        );
        assert!(!executor.validate(&json!({"field": "status"})).valid);
        assert!(
            !executor
                .validate(&json!({"field": "status", "operation": "explode"}))
                .valid
        );
        assert!(
            !executor
                .validate(&json!({"field": "status", "operation": "set"}))
                .valid
        );
    }

    #[test]
    fn test_create_task_validate() {
        let executor = CreateTaskExecutor;
        assert!(executor.validate(&json!({"title": "Call {{owner.firstName}}"})).valid);
        assert!(!executor.validate(&json!({})).valid);
    }
}

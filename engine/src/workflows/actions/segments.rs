// Segment membership executors
//
// Membership rows are unique per (segment, record), so double-add and
// double-remove are skips, not errors, and the member count moves at most
// once per actual change.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use super::{
    config_str, config_uuid, ActionError, ActionExecutor, ActionKind, ActionOutcome, ActionResult,
    ValidationOutcome,
};
use crate::workflows::context::ExecutionContext;

fn validate_segment_config(config: &JsonValue) -> ValidationOutcome {
    let mut errors = Vec::new();
    match config_str(config, "segment_id") {
        None => errors.push("'segment_id' is required".to_string()),
        Some(segment_id) => {
            if segment_id.parse::<Uuid>().is_err() {
                errors.push("'segment_id' must be a UUID".to_string());
            }
        }
    }
    ValidationOutcome::from_errors(errors)
}

async fn load_static_segment(
    config: &JsonValue,
    ctx: &ExecutionContext<'_>,
) -> Result<kennelflow_shared::Segment, ActionError> {
    let segment_id = config_uuid(config, "segment_id")
        .ok_or_else(|| ActionError::InvalidConfig("'segment_id' is required".to_string()))?;

    let segment = ctx
        .deps
        .segments
        .get(segment_id)
        .await?
        .filter(|s| s.tenant_id == ctx.tenant_id)
        .ok_or(ActionError::SegmentNotFound)?;

    if segment.is_dynamic {
        return Err(ActionError::DynamicSegment);
    }

    Ok(segment)
}

pub struct AddToSegmentExecutor;

#[async_trait]
impl ActionExecutor for AddToSegmentExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::AddToSegment
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        validate_segment_config(config)
    }

    async fn execute(&self, config: &JsonValue, ctx: &ExecutionContext<'_>) -> ActionResult {
        let segment = load_static_segment(config, ctx).await?;

        let record_type = ctx.record_str("_type").unwrap_or("unknown").to_string();
        let record_id = ctx.record_id().unwrap_or_else(Uuid::nil);

        let added = ctx
            .deps
            .segments
            .add_member(segment.id, &record_type, record_id)
            .await?;

        if !added {
            return Ok(ActionOutcome::skipped("record is already a member"));
        }

        Ok(ActionOutcome::success(json!({
            "segmentId": segment.id,
            "recordId": record_id,
        })))
    }
}

pub struct RemoveFromSegmentExecutor;

#[async_trait]
impl ActionExecutor for RemoveFromSegmentExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::RemoveFromSegment
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        validate_segment_config(config)
    }

    async fn execute(&self, config: &JsonValue, ctx: &ExecutionContext<'_>) -> ActionResult {
        let segment = load_static_segment(config, ctx).await?;

        let record_type = ctx.record_str("_type").unwrap_or("unknown").to_string();
        let record_id = ctx.record_id().unwrap_or_else(Uuid::nil);

        let removed = ctx
            .deps
            .segments
            .remove_member(segment.id, &record_type, record_id)
            .await?;

        if !removed {
            return Ok(ActionOutcome::skipped("record is not a member"));
        }

        Ok(ActionOutcome::success(json!({
            "segmentId": segment.id,
            "recordId": record_id,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segment_config_validation() {
        let executor = AddToSegmentExecutor;

        assert!(
            executor
                .validate(&json!({"segment_id": Uuid::new_v4().to_string()}))
                .valid
        );
        assert!(!executor.validate(&json!({})).valid);
        assert!(!executor.validate(&json!({"segment_id": "vip-dogs"})).valid);
    }
}

// Step work envelope
//
// The unit of work the enrollment manager schedules and the step consumer
// executes. Field names are part of the wire contract.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEnvelope {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub tenant_id: Uuid,
    pub step_id: Uuid,
    /// Action type identifier of the step, carried so dead-letter
    /// diagnostics stay readable without a database lookup.
    pub action: String,
    #[serde(default)]
    pub retry_context: RetryContext,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryContext {
    pub last_error: Option<String>,
    pub attempt_number: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = StepEnvelope {
            execution_id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            step_id: Uuid::new_v4(),
            action: "send_sms".to_string(),
            retry_context: RetryContext::default(),
        };

        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value.get("executionId").is_some());
        assert!(value.get("stepId").is_some());
        assert!(value.get("retryContext").is_some());

        // retryContext is optional on the wire.
        let bare = serde_json::json!({
            "executionId": envelope.execution_id,
            "workflowId": envelope.workflow_id,
            "tenantId": envelope.tenant_id,
            "stepId": envelope.step_id,
            "action": "send_sms",
        });
        let parsed: StepEnvelope = serde_json::from_value(bare).unwrap();
        assert_eq!(parsed.retry_context.attempt_number, 0);
        assert!(parsed.retry_context.last_error.is_none());
    }
}

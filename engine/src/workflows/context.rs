// Execution context and shared dependency handle

use kennelflow_shared::RecordKind;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::queue::MessageQueue;
use crate::realtime::RealtimeHub;
use crate::records::RecordStore;
use crate::services::{EmailService, SmsService};
use crate::stores::{
    AuditStore, CommunicationLogStore, EmailTemplateStore, ExecutionLogStore, ExecutionStore,
    NotificationStore, SegmentStore, TaskStore, TenantStore, WebhookLogStore, WorkflowStore,
};

/// Everything the consumers, executors, and dead-letter processor need to
/// touch the outside world. Built once at startup and shared.
pub struct EngineDeps {
    pub workflows: WorkflowStore,
    pub executions: ExecutionStore,
    pub execution_logs: ExecutionLogStore,
    pub tenants: TenantStore,
    pub segments: SegmentStore,
    pub records: RecordStore,
    pub comms: CommunicationLogStore,
    pub notifications: NotificationStore,
    pub tasks: TaskStore,
    pub audit: AuditStore,
    pub webhook_logs: WebhookLogStore,
    pub email_templates: EmailTemplateStore,
    /// Absent when SMTP is not configured; failure notifications are then
    /// skipped.
    pub email: Option<EmailService>,
    pub sms: SmsService,
    pub realtime: RealtimeHub,
    pub queue: Arc<dyn MessageQueue>,
    pub http: reqwest::Client,
    pub webhook_timeout_ms: u64,
    pub app_base_url: String,
}

impl EngineDeps {
    pub fn new(
        pool: PgPool,
        queue: Arc<dyn MessageQueue>,
        email: Option<EmailService>,
        webhook_timeout_ms: u64,
        app_base_url: String,
    ) -> Self {
        let http = reqwest::Client::new();

        Self {
            workflows: WorkflowStore::new(pool.clone()),
            executions: ExecutionStore::new(pool.clone()),
            execution_logs: ExecutionLogStore::new(pool.clone()),
            tenants: TenantStore::new(pool.clone()),
            segments: SegmentStore::new(pool.clone()),
            records: RecordStore::new(pool.clone()),
            comms: CommunicationLogStore::new(pool.clone()),
            notifications: NotificationStore::new(pool.clone()),
            tasks: TaskStore::new(pool.clone()),
            audit: AuditStore::new(pool.clone()),
            webhook_logs: WebhookLogStore::new(pool.clone()),
            email_templates: EmailTemplateStore::new(pool),
            email,
            sms: SmsService::new(http.clone()),
            realtime: RealtimeHub::new(),
            queue,
            http,
            webhook_timeout_ms,
            app_base_url,
        }
    }

    /// Deep link to the operator view of failed executions.
    pub fn failed_executions_url(&self) -> String {
        format!(
            "{}/workflows/executions?status=failed",
            self.app_base_url.trim_end_matches('/')
        )
    }
}

/// Per-step execution context handed to action executors.
pub struct ExecutionContext<'a> {
    /// The target record as an opaque field mapping with the `_type`
    /// discriminator injected.
    pub record: JsonValue,
    pub tenant_id: Uuid,
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Uuid,
    pub deps: &'a EngineDeps,
}

impl ExecutionContext<'_> {
    pub fn record_kind(&self) -> Option<RecordKind> {
        self.record
            .get("_type")
            .and_then(|v| v.as_str())
            .and_then(RecordKind::parse)
    }

    pub fn record_id(&self) -> Option<Uuid> {
        self.record
            .get("id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }

    pub fn record_str(&self, field: &str) -> Option<&str> {
        self.record.get(field).and_then(|v| v.as_str())
    }

    pub fn record_uuid(&self, field: &str) -> Option<Uuid> {
        self.record_str(field).and_then(|s| s.parse().ok())
    }

    /// Consent gates block only on an explicit false; absent or null
    /// counts as consent.
    pub fn consent_declined(&self, field: &str) -> bool {
        self.record.get(field) == Some(&JsonValue::Bool(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with_record(record: JsonValue, deps: &EngineDeps) -> ExecutionContext<'_> {
        ExecutionContext {
            record,
            tenant_id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            step_id: Uuid::new_v4(),
            deps,
        }
    }

    #[tokio::test]
    async fn test_consent_semantics() {
        let deps = crate::workflows::testutil::lazy_deps();
        let ctx = context_with_record(
            json!({"sms_consent": false, "email_consent": null}),
            &deps,
        );

        assert!(ctx.consent_declined("sms_consent"));
        // Null and missing both count as consent.
        assert!(!ctx.consent_declined("email_consent"));
        assert!(!ctx.consent_declined("never_set"));
    }

    #[tokio::test]
    async fn test_record_kind_from_discriminator() {
        let deps = crate::workflows::testutil::lazy_deps();
        let ctx = context_with_record(json!({"_type": "pet"}), &deps);
        assert_eq!(ctx.record_kind(), Some(RecordKind::Pet));
    }
}

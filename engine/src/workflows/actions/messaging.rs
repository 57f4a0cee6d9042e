// Messaging executors: SMS, email, and in-app notification

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::warn;
use uuid::Uuid;

use super::{
    config_str, config_uuid, require_str, ActionError, ActionExecutor, ActionKind, ActionOutcome,
    ActionResult, ValidationOutcome,
};
use crate::workflows::context::ExecutionContext;
use crate::workflows::interpolate::interpolate;

fn record_ref(ctx: &ExecutionContext<'_>) -> (String, Uuid) {
    let record_type = ctx
        .record_str("_type")
        .unwrap_or("unknown")
        .to_string();
    let record_id = ctx.record_id().unwrap_or_else(Uuid::nil);
    (record_type, record_id)
}

pub struct SendSmsExecutor;

#[async_trait]
impl ActionExecutor for SendSmsExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::SendSms
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        let mut errors = Vec::new();
        require_str(config, "message", &mut errors);
        ValidationOutcome::from_errors(errors)
    }

    async fn execute(&self, config: &JsonValue, ctx: &ExecutionContext<'_>) -> ActionResult {
        let template = config_str(config, "message")
            .ok_or_else(|| ActionError::InvalidConfig("'message' is required".to_string()))?;

        if ctx.consent_declined("sms_consent") {
            return Ok(ActionOutcome::skipped("sms consent declined"));
        }

        let phone = ctx
            .record_str("phone")
            .ok_or(ActionError::MissingRecordField("phone"))?
            .to_string();

        let settings = ctx.deps.tenants.settings(ctx.tenant_id).await?;
        let gateway = settings.sms_gateway.ok_or(ActionError::NoSmsGateway)?;

        let body = interpolate(template, &ctx.record);
        ctx.deps
            .sms
            .send(&gateway, &phone, &body)
            .await
            .map_err(|e| ActionError::Sms(e.to_string()))?;

        let (record_type, record_id) = record_ref(ctx);
        ctx.deps
            .comms
            .append(
                ctx.tenant_id,
                &record_type,
                record_id,
                "sms",
                &phone,
                None,
                &body,
                "sent",
                Some(ctx.execution_id),
            )
            .await?;

        Ok(ActionOutcome::success(json!({ "recipient": phone })))
    }
}

pub struct SendEmailExecutor;

#[async_trait]
impl ActionExecutor for SendEmailExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::SendEmail
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        let mut errors = Vec::new();

        match config_str(config, "template_id") {
            Some(template_id) => {
                if template_id.parse::<Uuid>().is_err() {
                    errors.push("'template_id' must be a UUID".to_string());
                }
            }
            None => {
                require_str(config, "subject", &mut errors);
                require_str(config, "body", &mut errors);
            }
        }

        ValidationOutcome::from_errors(errors)
    }

    async fn execute(&self, config: &JsonValue, ctx: &ExecutionContext<'_>) -> ActionResult {
        if ctx.consent_declined("email_consent") {
            return Ok(ActionOutcome::skipped("email consent declined"));
        }

        let email = ctx
            .record_str("email")
            .ok_or(ActionError::MissingRecordField("email"))?
            .to_string();

        let (subject_template, body_template) = match config_uuid(config, "template_id") {
            Some(template_id) => {
                let template = ctx
                    .deps
                    .email_templates
                    .get(ctx.tenant_id, template_id)
                    .await?
                    .ok_or(ActionError::TemplateNotFound)?;
                (template.subject, template.html_body)
            }
            None => {
                let subject = config_str(config, "subject").ok_or_else(|| {
                    ActionError::InvalidConfig("'subject' is required without a template".to_string())
                })?;
                let body = config_str(config, "body").ok_or_else(|| {
                    ActionError::InvalidConfig("'body' is required without a template".to_string())
                })?;
                (subject.to_string(), body.to_string())
            }
        };

        let subject = interpolate(&subject_template, &ctx.record);
        let body = interpolate(&body_template, &ctx.record);

        let service = ctx
            .deps
            .email
            .as_ref()
            .ok_or_else(|| ActionError::Email("SMTP transport not configured".to_string()))?;
        service
            .send_email(&email, None, &subject, &body, None)
            .await
            .map_err(|e| ActionError::Email(e.to_string()))?;

        let (record_type, record_id) = record_ref(ctx);
        ctx.deps
            .comms
            .append(
                ctx.tenant_id,
                &record_type,
                record_id,
                "email",
                &email,
                Some(&subject),
                &body,
                "sent",
                Some(ctx.execution_id),
            )
            .await?;

        Ok(ActionOutcome::success(json!({
            "recipient": email,
            "subject": subject,
        })))
    }
}

pub struct SendNotificationExecutor;

#[async_trait]
impl ActionExecutor for SendNotificationExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::SendNotification
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        let mut errors = Vec::new();
        require_str(config, "message", &mut errors);
        if let Some(user_id) = config_str(config, "user_id") {
            if user_id.parse::<Uuid>().is_err() {
                errors.push("'user_id' must be a UUID".to_string());
            }
        }
        ValidationOutcome::from_errors(errors)
    }

    async fn execute(&self, config: &JsonValue, ctx: &ExecutionContext<'_>) -> ActionResult {
        let message_template = config_str(config, "message")
            .ok_or_else(|| ActionError::InvalidConfig("'message' is required".to_string()))?;

        // Explicit target first, then the record's assignee/owner fields.
        let user_id = config_uuid(config, "user_id")
            .or_else(|| ctx.record_uuid("assigned_staff_id"))
            .or_else(|| ctx.record_uuid("owner_id"))
            .ok_or(ActionError::NoTargetUser)?;

        let title = interpolate(
            config_str(config, "title").unwrap_or("Workflow notification"),
            &ctx.record,
        );
        let message = interpolate(message_template, &ctx.record);
        let notification_type = config_str(config, "type").unwrap_or("info");

        let (record_type, record_id) = record_ref(ctx);
        let notification = ctx
            .deps
            .notifications
            .create(
                ctx.tenant_id,
                user_id,
                &title,
                &message,
                notification_type,
                Some(&record_type),
                Some(record_id),
            )
            .await?;

        // Realtime delivery is best-effort; the stored row is the source
        // of truth.
        ctx.deps.realtime.emit(
            "notification.created",
            ctx.tenant_id,
            json!({
                "id": notification.id,
                "user_id": user_id,
                "title": title,
                "message": message,
            }),
        );

        Ok(ActionOutcome::success(json!({
            "notificationId": notification.id,
            "userId": user_id,
        })))
    }
}

/// Best-effort notification used by other executors (task assignment).
pub(crate) async fn notify_quietly(
    ctx: &ExecutionContext<'_>,
    user_id: Uuid,
    title: &str,
    message: &str,
    entity_type: &str,
    entity_id: Uuid,
) {
    match ctx
        .deps
        .notifications
        .create(
            ctx.tenant_id,
            user_id,
            title,
            message,
            "info",
            Some(entity_type),
            Some(entity_id),
        )
        .await
    {
        Ok(notification) => {
            ctx.deps.realtime.emit(
                "notification.created",
                ctx.tenant_id,
                json!({ "id": notification.id, "user_id": user_id, "title": title }),
            );
        }
        Err(e) => {
            warn!("Best-effort notification to {} failed: {}", user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_sms_validate() {
        let executor = SendSmsExecutor;
        assert!(executor.validate(&json!({"message": "Hi {{name}}"})).valid);

        let missing = executor.validate(&json!({}));
        assert!(!missing.valid);
        assert_eq!(missing.errors, vec!["'message' is required"]);
    }

    #[test]
    fn test_send_email_validate_template_or_body() {
        let executor = SendEmailExecutor;

        assert!(
            executor
                .validate(&json!({"template_id": Uuid::new_v4().to_string()}))
                .valid
        );
        assert!(
            executor
                .validate(&json!({"subject": "Hi", "body": "<p>Hi</p>"}))
                .valid
        );

        let invalid = executor.validate(&json!({"subject": "Hi"}));
        assert!(!invalid.valid);

        let bad_template = executor.validate(&json!({"template_id": "not-a-uuid"}));
        assert!(!bad_template.valid);
    }

    #[test]
    fn test_send_notification_validate() {
        let executor = SendNotificationExecutor;
        assert!(executor.validate(&json!({"message": "Check kennel 4"})).valid);
        assert!(!executor.validate(&json!({})).valid);
        assert!(
            !executor
                .validate(&json!({"message": "x", "user_id": "nope"}))
                .valid
        );
    }
}

// Insert-side stores for the engine's secondary records: communication
// logs, notifications, tasks, webhook logs, and the audit trail.

use chrono::{DateTime, Utc};
use kennelflow_shared::{BoardingTask, Notification};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::StoreResult;

#[derive(Clone)]
pub struct CommunicationLogStore {
    pool: PgPool,
}

impl CommunicationLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        tenant_id: Uuid,
        record_type: &str,
        record_id: Uuid,
        channel: &str,
        recipient: &str,
        subject: Option<&str>,
        body: &str,
        status: &str,
        execution_id: Option<Uuid>,
    ) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO communication_logs
                (id, tenant_id, record_type, record_id, channel, recipient, subject, body, status, execution_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(record_type)
        .bind(record_id)
        .bind(channel)
        .bind(recipient)
        .bind(subject)
        .bind(body)
        .bind(status)
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }
}

#[derive(Clone)]
pub struct NotificationStore {
    pool: PgPool,
}

impl NotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        title: &str,
        message: &str,
        notification_type: &str,
        entity_type: Option<&str>,
        entity_id: Option<Uuid>,
    ) -> StoreResult<Notification> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications
                (id, tenant_id, user_id, title, message, notification_type, entity_type, entity_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(notification_type)
        .bind(entity_type)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(notification)
    }
}

#[derive(Clone)]
pub struct TaskStore {
    pool: PgPool,
}

impl TaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        tenant_id: Uuid,
        title: &str,
        description: Option<&str>,
        assigned_to: Option<Uuid>,
        record_type: &str,
        record_id: Uuid,
        due_date: DateTime<Utc>,
    ) -> StoreResult<BoardingTask> {
        let task = sqlx::query_as::<_, BoardingTask>(
            r#"
            INSERT INTO boarding_tasks
                (id, tenant_id, title, description, assigned_to, record_type, record_id, due_date, created_by_system)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(title)
        .bind(description)
        .bind(assigned_to)
        .bind(record_type)
        .bind(record_id)
        .bind(due_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(task)
    }
}

#[derive(Clone)]
pub struct AuditStore {
    pool: PgPool,
}

impl AuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        tenant_id: Uuid,
        action: &str,
        resource_type: &str,
        resource_id: Uuid,
        changes: JsonValue,
        metadata: JsonValue,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, tenant_id, actor, action, resource_type, resource_id, changes, metadata)
            VALUES ($1, $2, 'workflow', $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(action)
        .bind(resource_type)
        .bind(resource_id)
        .bind(changes)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct WebhookLogStore {
    pool: PgPool,
}

impl WebhookLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn append(
        &self,
        tenant_id: Uuid,
        execution_id: Uuid,
        step_id: Uuid,
        url: &str,
        method: &str,
        request_headers: JsonValue,
        request_body: Option<&str>,
        status_code: Option<i32>,
        response_body: Option<&str>,
        duration_ms: i64,
        error: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_logs
                (id, tenant_id, execution_id, step_id, url, method, request_headers,
                 request_body, status_code, response_body, duration_ms, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(execution_id)
        .bind(step_id)
        .bind(url)
        .bind(method)
        .bind(request_headers)
        .bind(request_body)
        .bind(status_code)
        .bind(response_body)
        .bind(duration_ms)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct EmailTemplate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct EmailTemplateStore {
    pool: PgPool,
}

impl EmailTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        tenant_id: Uuid,
        template_id: Uuid,
    ) -> StoreResult<Option<EmailTemplate>> {
        let template = sqlx::query_as::<_, EmailTemplate>(
            "SELECT * FROM email_templates WHERE id = $1 AND tenant_id = $2",
        )
        .bind(template_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(template)
    }
}

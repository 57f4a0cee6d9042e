use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use super::StoreResult;
use crate::workflows::model::{
    ExecutionStatus, LogEvent, LogStatus, WorkflowExecution, WorkflowExecutionLog,
};

#[derive(Clone)]
pub struct ExecutionStore {
    pool: PgPool,
}

impl ExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, execution_id: Uuid) -> StoreResult<Option<WorkflowExecution>> {
        let execution = sqlx::query_as::<_, WorkflowExecution>(
            "SELECT * FROM workflow_executions WHERE id = $1",
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(execution)
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
        record_type: &str,
        record_id: Uuid,
        entry_step_id: Uuid,
        metadata: JsonValue,
    ) -> StoreResult<WorkflowExecution> {
        let execution = sqlx::query_as::<_, WorkflowExecution>(
            r#"
            INSERT INTO workflow_executions
                (id, tenant_id, workflow_id, record_type, record_id, status, current_step_id, started_at, metadata)
            VALUES ($1, $2, $3, $4, $5, 'running', $6, NOW(), $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(workflow_id)
        .bind(record_type)
        .bind(record_id)
        .bind(entry_step_id)
        .bind(metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(execution)
    }

    /// The active enrollment for a (workflow, record) pair, if any.
    pub async fn find_active(
        &self,
        workflow_id: Uuid,
        record_type: &str,
        record_id: Uuid,
    ) -> StoreResult<Option<WorkflowExecution>> {
        let execution = sqlx::query_as::<_, WorkflowExecution>(
            r#"
            SELECT * FROM workflow_executions
            WHERE workflow_id = $1 AND record_type = $2 AND record_id = $3
                AND status IN ('running', 'waiting')
            LIMIT 1
            "#,
        )
        .bind(workflow_id)
        .bind(record_type)
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(execution)
    }

    /// Most recent enrollment for a (workflow, record) pair regardless of
    /// state; drives the re-enrollment cool-down check.
    pub async fn find_latest(
        &self,
        workflow_id: Uuid,
        record_type: &str,
        record_id: Uuid,
    ) -> StoreResult<Option<WorkflowExecution>> {
        let execution = sqlx::query_as::<_, WorkflowExecution>(
            r#"
            SELECT * FROM workflow_executions
            WHERE workflow_id = $1 AND record_type = $2 AND record_id = $3
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(workflow_id)
        .bind(record_type)
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(execution)
    }

    /// All active enrollments for a record, excluding the invoking
    /// workflow. Backs unenroll_from_workflow.
    pub async fn find_active_for_record(
        &self,
        tenant_id: Uuid,
        record_type: &str,
        record_id: Uuid,
        exclude_workflow: Uuid,
    ) -> StoreResult<Vec<WorkflowExecution>> {
        let executions = sqlx::query_as::<_, WorkflowExecution>(
            r#"
            SELECT * FROM workflow_executions
            WHERE tenant_id = $1 AND record_type = $2 AND record_id = $3
                AND status IN ('running', 'waiting')
                AND workflow_id != $4
            "#,
        )
        .bind(tenant_id)
        .bind(record_type)
        .bind(record_id)
        .bind(exclude_workflow)
        .fetch_all(&self.pool)
        .await?;

        Ok(executions)
    }

    /// Claim an execution for step processing. Returns false when the
    /// execution is no longer active (cooperative cancellation).
    pub async fn mark_running(&self, execution_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = 'running'
            WHERE id = $1 AND status IN ('running', 'waiting')
            "#,
        )
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Advance to the next step and park the execution until its envelope
    /// is consumed.
    pub async fn advance_to(&self, execution_id: Uuid, next_step_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE workflow_executions
            SET current_step_id = $2, status = 'waiting'
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(execution_id)
        .bind(next_step_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn complete(&self, execution_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = 'completed', completed_at = NOW()
            WHERE id = $1 AND status IN ('running', 'waiting')
            "#,
        )
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Cancel an active execution, stamping ended_at and merging
    /// unenrollment provenance into its metadata.
    pub async fn cancel(&self, execution_id: Uuid, provenance: JsonValue) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = 'cancelled', ended_at = NOW(), metadata = metadata || $2
            WHERE id = $1 AND status IN ('running', 'waiting')
            "#,
        )
        .bind(execution_id)
        .bind(provenance)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Dead-letter transition. Idempotent: returns false when the
    /// execution is already failed, so replayed dead-letter messages do
    /// not double-count.
    pub async fn fail_from_dead_letter(
        &self,
        execution_id: Uuid,
        error_details: JsonValue,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = 'failed', completed_at = NOW(), error_details = $2
            WHERE id = $1 AND status != 'failed'
            "#,
        )
        .bind(execution_id)
        .bind(error_details)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Execution list for the operator view, optionally filtered by
    /// status and tenant.
    pub async fn list(
        &self,
        tenant_id: Option<Uuid>,
        status: Option<ExecutionStatus>,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowExecution>> {
        let executions = sqlx::query_as::<_, WorkflowExecution>(
            r#"
            SELECT * FROM workflow_executions
            WHERE ($1::uuid IS NULL OR tenant_id = $1)
                AND ($2::execution_status IS NULL OR status = $2)
            ORDER BY started_at DESC
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(executions)
    }

    /// Retention: delete terminal executions older than the cutoff for
    /// one tenant.
    pub async fn delete_terminal_older_than(
        &self,
        tenant_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM workflow_executions
            WHERE tenant_id = $1
                AND status IN ('completed', 'failed', 'cancelled')
                AND completed_at IS NOT NULL
                AND completed_at < $2
            "#,
        )
        .bind(tenant_id)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct ExecutionLogStore {
    pool: PgPool,
}

impl ExecutionLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        execution_id: Uuid,
        step_id: Option<Uuid>,
        event: LogEvent,
        status: LogStatus,
        message: Option<&str>,
        metadata: JsonValue,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_execution_logs
                (id, execution_id, step_id, event_type, status, message, metadata, started_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(execution_id)
        .bind(step_id)
        .bind(event.as_str())
        .bind(status.as_str())
        .bind(message)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn for_execution(
        &self,
        execution_id: Uuid,
    ) -> StoreResult<Vec<WorkflowExecutionLog>> {
        let logs = sqlx::query_as::<_, WorkflowExecutionLog>(
            "SELECT * FROM workflow_execution_logs WHERE execution_id = $1 ORDER BY started_at",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    /// Retention: delete log rows older than the cutoff whose parent
    /// execution belongs to the tenant.
    pub async fn delete_older_than(
        &self,
        tenant_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM workflow_execution_logs l
            USING workflow_executions e
            WHERE l.execution_id = e.id
                AND e.tenant_id = $1
                AND l.started_at < $2
            "#,
        )
        .bind(tenant_id)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

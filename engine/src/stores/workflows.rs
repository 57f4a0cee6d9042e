use sqlx::PgPool;
use uuid::Uuid;

use super::StoreResult;
use crate::workflows::model::{Workflow, WorkflowStep};

#[derive(Clone)]
pub struct WorkflowStore {
    pool: PgPool,
}

impl WorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, workflow_id: Uuid) -> StoreResult<Option<Workflow>> {
        let workflow = sqlx::query_as::<_, Workflow>(
            "SELECT * FROM workflows WHERE id = $1",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(workflow)
    }

    /// Active workflows for a tenant that subscribe to events. Trigger
    /// matching happens in memory against `trigger_types`.
    pub async fn active_for_tenant(&self, tenant_id: Uuid) -> StoreResult<Vec<Workflow>> {
        let workflows = sqlx::query_as::<_, Workflow>(
            "SELECT * FROM workflows WHERE tenant_id = $1 AND status = 'active' ORDER BY created_at",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(workflows)
    }

    pub async fn get_step(&self, step_id: Uuid) -> StoreResult<Option<WorkflowStep>> {
        let step = sqlx::query_as::<_, WorkflowStep>(
            "SELECT * FROM workflow_steps WHERE id = $1",
        )
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(step)
    }

    pub async fn entry_step(&self, workflow_id: Uuid) -> StoreResult<Option<WorkflowStep>> {
        let step = sqlx::query_as::<_, WorkflowStep>(
            "SELECT * FROM workflow_steps WHERE workflow_id = $1 AND is_entry_point = TRUE LIMIT 1",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(step)
    }

    pub async fn increment_active(&self, workflow_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE workflows SET active_count = active_count + 1 WHERE id = $1")
            .bind(workflow_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn decrement_active(&self, workflow_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE workflows SET active_count = GREATEST(active_count - 1, 0) WHERE id = $1",
        )
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counter move for a dead-lettered execution: one decrement of
    /// active, one increment of failed, in a single statement.
    pub async fn record_failure(&self, workflow_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE workflows
            SET active_count = GREATEST(active_count - 1, 0),
                failed_count = failed_count + 1
            WHERE id = $1
            "#,
        )
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Failure counter for triggers that died before any execution
    /// existed; there is no active execution to decrement.
    pub async fn increment_failed(&self, workflow_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE workflows SET failed_count = failed_count + 1 WHERE id = $1")
            .bind(workflow_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// Retention cleanup job
//
// Sweeps every tenant, resolving per-tenant retention horizons from
// settings with engine-wide defaults, then deletes old execution logs
// and terminal executions. One tenant's failure never aborts the sweep
// for the others.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RetentionConfig;
use crate::stores::tenants::parse_settings;
use crate::workflows::context::EngineDeps;

/// Manual-trigger parameters: limit the sweep to one tenant and/or
/// override the retention windows.
#[derive(Debug, Clone, Default)]
pub struct RetentionOverride {
    pub tenant_id: Option<Uuid>,
    pub log_retention_days: Option<i64>,
    pub execution_retention_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantSweep {
    pub tenant_id: Uuid,
    pub logs_deleted: u64,
    pub executions_deleted: u64,
    pub log_retention_days: i64,
    pub execution_retention_days: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct RetentionSweepResult {
    pub tenants_processed: i32,
    pub logs_deleted: u64,
    pub executions_deleted: u64,
    pub per_tenant: Vec<TenantSweep>,
    pub errors: Vec<String>,
}

pub struct RetentionCleanupJob {
    deps: Arc<EngineDeps>,
    defaults: RetentionConfig,
}

impl RetentionCleanupJob {
    pub fn new(deps: Arc<EngineDeps>, defaults: RetentionConfig) -> Self {
        Self { deps, defaults }
    }

    pub async fn run(&self, overrides: Option<RetentionOverride>) -> RetentionSweepResult {
        let overrides = overrides.unwrap_or_default();
        let mut result = RetentionSweepResult::default();

        let tenants = match self.deps.tenants.list().await {
            Ok(tenants) => tenants,
            Err(e) => {
                result.errors.push(format!("failed to list tenants: {}", e));
                return result;
            }
        };

        for tenant in tenants {
            if let Some(only) = overrides.tenant_id {
                if tenant.id != only {
                    continue;
                }
            }

            let settings = parse_settings(&tenant.settings);
            let log_days = resolve_window(
                overrides.log_retention_days,
                settings.log_retention_days,
                self.defaults.log_retention_days,
            );
            let execution_days = resolve_window(
                overrides.execution_retention_days,
                settings.execution_retention_days,
                self.defaults.execution_retention_days,
            );

            match self.sweep_tenant(tenant.id, log_days, execution_days).await {
                Ok(sweep) => {
                    result.tenants_processed += 1;
                    result.logs_deleted += sweep.logs_deleted;
                    result.executions_deleted += sweep.executions_deleted;
                    result.per_tenant.push(sweep);
                }
                Err(e) => {
                    warn!("Retention sweep failed for tenant {}: {}", tenant.id, e);
                    result.errors.push(format!("tenant {}: {}", tenant.id, e));
                }
            }
        }

        info!(
            "Retention sweep: {} tenants, {} logs deleted, {} executions deleted, {} errors",
            result.tenants_processed,
            result.logs_deleted,
            result.executions_deleted,
            result.errors.len()
        );

        result
    }

    async fn sweep_tenant(
        &self,
        tenant_id: Uuid,
        log_retention_days: i64,
        execution_retention_days: i64,
    ) -> Result<TenantSweep, crate::stores::StoreError> {
        let now = Utc::now();

        // Logs go first so a failure between the two deletes never leaves
        // executions without their trail inside the log window.
        let logs_deleted = self
            .deps
            .execution_logs
            .delete_older_than(tenant_id, now - Duration::days(log_retention_days))
            .await?;

        let executions_deleted = self
            .deps
            .executions
            .delete_terminal_older_than(tenant_id, now - Duration::days(execution_retention_days))
            .await?;

        Ok(TenantSweep {
            tenant_id,
            logs_deleted,
            executions_deleted,
            log_retention_days,
            execution_retention_days,
        })
    }
}

/// Resolve the effective retention window for one tenant.
pub fn resolve_window(
    override_days: Option<i64>,
    tenant_days: Option<i64>,
    default_days: i64,
) -> i64 {
    override_days.or(tenant_days).unwrap_or(default_days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_resolution_precedence() {
        // Override beats tenant setting beats default.
        assert_eq!(resolve_window(Some(7), Some(30), 90), 7);
        assert_eq!(resolve_window(None, Some(30), 90), 30);
        assert_eq!(resolve_window(None, None, 90), 90);
    }
}

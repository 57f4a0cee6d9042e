// Job Scheduler - schedules the engine's background jobs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use super::{RetentionCleanupJob, RetentionOverride, RetentionSweepResult};
use crate::config::RetentionConfig;
use crate::workflows::context::EngineDeps;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Job execution error: {0}")]
    ExecutionError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Cron expression for the retention sweep; default is 3 AM daily.
    pub retention_schedule: String,
    pub retention: RetentionConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            retention_schedule: "0 0 3 * * *".to_string(),
            retention: RetentionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i32,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    PartialFailure,
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    deps: Arc<EngineDeps>,
    config: JobConfig,
    execution_logs: Arc<RwLock<Vec<JobExecutionLog>>>,
}

impl JobScheduler {
    pub async fn new(deps: Arc<EngineDeps>, config: JobConfig) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            deps,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_retention_cleanup().await?;
        self.scheduler.start().await?;

        info!("Background job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_retention_cleanup(&self) -> JobResult<()> {
        let deps = self.deps.clone();
        let retention = self.config.retention.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(self.config.retention_schedule.as_str(), move |_uuid, _lock| {
            let deps = deps.clone();
            let retention = retention.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let log_id = Uuid::new_v4();
                let started_at = Utc::now();

                info!("Running retention cleanup job");

                let job = RetentionCleanupJob::new(deps, retention);
                let result = job.run(None).await;

                let completed_at = Utc::now();
                let duration = (completed_at - started_at).num_milliseconds();

                let log = JobExecutionLog {
                    id: log_id,
                    job_name: "Retention Cleanup".to_string(),
                    started_at,
                    completed_at: Some(completed_at),
                    status: if result.errors.is_empty() {
                        JobStatus::Completed
                    } else {
                        JobStatus::PartialFailure
                    },
                    items_processed: result.tenants_processed,
                    errors: result.errors,
                    duration_ms: Some(duration),
                };

                let mut logs = logs.write().await;
                logs.push(log);
                // Keep only the last 100 runs in memory.
                if logs.len() > 100 {
                    logs.remove(0);
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!(
            "Scheduled retention cleanup with cron '{}'",
            self.config.retention_schedule
        );

        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    /// Manual trigger for operational use, optionally scoped to a tenant
    /// with override windows.
    pub async fn run_retention_now(
        &self,
        overrides: Option<RetentionOverride>,
    ) -> JobResult<RetentionSweepResult> {
        let job = RetentionCleanupJob::new(self.deps.clone(), self.config.retention.clone());
        let result = job.run(overrides).await;

        if result.tenants_processed == 0 && !result.errors.is_empty() {
            error!("Manual retention run failed: {:?}", result.errors);
        }

        Ok(result)
    }
}

// Background Jobs
//
// Scheduled maintenance for the workflow engine. Jobs are scheduled with
// tokio-cron-scheduler and run automatically at the configured times.

pub mod retention;
pub mod scheduler;

pub use retention::{RetentionCleanupJob, RetentionOverride, RetentionSweepResult};
pub use scheduler::{JobConfig, JobError, JobResult, JobScheduler};

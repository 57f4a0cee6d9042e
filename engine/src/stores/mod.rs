// Data access layer
//
// Thin sqlx stores, one per aggregate. All workflow counter mutations go
// through single-statement atomic increments so concurrent consumers and
// the dead-letter processor never race a read-modify-write.

pub mod activity;
pub mod executions;
pub mod segments;
pub mod tenants;
pub mod workflows;

pub use activity::{
    AuditStore, CommunicationLogStore, EmailTemplateStore, NotificationStore, TaskStore,
    WebhookLogStore,
};
pub use executions::{ExecutionLogStore, ExecutionStore};
pub use segments::SegmentStore;
pub use tenants::{SmsGatewayConfig, TenantSettings, TenantStore};
pub use workflows::WorkflowStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

//! Integration services and the retryable-operation executor they share.

pub mod executor;
pub mod hubspot;
pub mod slack;
pub mod zapier;

pub use executor::{
    AuditLogEntry, AuditOutcome, Clock, IntegrationConfig, IntegrationMetrics, OperationResult,
    RetryableOperationExecutor, StatusSnapshot, SystemClock,
};

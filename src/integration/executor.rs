use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Audit log is a bounded FIFO; oldest entries are discarded past this cap.
const MAX_AUDIT_ENTRIES: usize = 100;

/// A service with no completed operation in this window reports unhealthy.
const HEALTH_WINDOW_MINUTES: i64 = 30;

/// Wall-clock source. Injected so the health window can be tested without
/// waiting thirty minutes; durations are still measured with `Instant`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Static tuning parameters for one integration service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    pub enabled: bool,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_ms: 1000,
            timeout_ms: 10_000,
            enabled: true,
        }
    }
}

impl IntegrationConfig {
    /// Validated once at startup; bad tuning is fatal, never retried.
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Err(AppError::ConfigurationError(
                "integration is disabled".to_string(),
            ));
        }
        if self.retry_attempts < 1 {
            return Err(AppError::ConfigurationError(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.timeout_ms < 1000 {
            return Err(AppError::ConfigurationError(
                "timeout_ms must be at least 1000".to_string(),
            ));
        }
        Ok(())
    }
}

/// Running counters for a wrapped service.
///
/// `total_requests` counts attempts (a call that retries twice contributes
/// three), while `successful_requests`/`failed_requests` each count once per
/// completed call, on its final outcome.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: f64,
    pub last_activity: DateTime<Utc>,
    pub uptime_start: DateTime<Utc>,
}

impl IntegrationMetrics {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            average_response_time_ms: 0.0,
            last_activity: now,
            uptime_start: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    Partial,
}

/// Immutable record of one completed operation.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub service: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub result: AuditOutcome,
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationMetadata {
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Uniform envelope returned for every executed operation. Exactly one of
/// `data`/`error` is populated.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: OperationMetadata,
}

impl<T> OperationResult<T> {
    fn succeeded(data: T, attempts: u32, duration_ms: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp,
            metadata: OperationMetadata {
                attempts,
                duration_ms,
            },
        }
    }

    fn failed(message: String, attempts: u32, duration_ms: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp,
            metadata: OperationMetadata {
                attempts,
                duration_ms,
            },
        }
    }

    /// Unwrap the envelope for callers that want `?` semantics downstream.
    pub fn into_result(self) -> Result<T> {
        match self {
            OperationResult {
                success: true,
                data: Some(data),
                ..
            } => Ok(data),
            OperationResult {
                error: Some(message),
                ..
            } => Err(AppError::ExternalServiceError(message)),
            _ => Err(AppError::InternalServerError(
                "operation result carried neither data nor error".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusConfig {
    pub enabled: bool,
    pub retry_attempts: u32,
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    pub service: String,
    pub initialized: bool,
    pub healthy: bool,
    pub metrics: IntegrationMetrics,
    pub config: StatusConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub success: bool,
    pub data: StatusData,
    pub timestamp: DateTime<Utc>,
}

/// Executes caller-supplied async operations with bounded retries, a
/// per-attempt timeout race, metrics accrual and an audit trail. One instance
/// is owned per integration service; state lives in process memory only.
pub struct RetryableOperationExecutor {
    service: String,
    config: IntegrationConfig,
    clock: Arc<dyn Clock>,
    metrics: RwLock<IntegrationMetrics>,
    audit_log: RwLock<VecDeque<AuditLogEntry>>,
    initialized: bool,
}

impl RetryableOperationExecutor {
    pub fn new(service: impl Into<String>, config: IntegrationConfig) -> Result<Self> {
        Self::with_clock(service, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        service: impl Into<String>,
        config: IntegrationConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let now = clock.now();
        Ok(Self {
            service: service.into(),
            config,
            clock,
            metrics: RwLock::new(IntegrationMetrics::new(now)),
            audit_log: RwLock::new(VecDeque::with_capacity(MAX_AUDIT_ENTRIES)),
            initialized: true,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// Run `operation` under the configured timeout, retrying with exponential
    /// backoff up to `max_attempts` (default: configured `retry_attempts`).
    ///
    /// Operation failures never escape as `Err`; the final outcome is always
    /// folded into the returned envelope. When the timer wins the race the
    /// in-flight future is dropped unobserved; no cancellation is propagated.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        operation: F,
        operation_name: &str,
        max_attempts: Option<u32>,
    ) -> OperationResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        // A zero override is a caller bug caught at config validation; fall
        // back to the configured attempt budget instead of looping zero times.
        let max_attempts = max_attempts
            .filter(|&n| n >= 1)
            .unwrap_or(self.config.retry_attempts);

        for attempt in 1..=max_attempts {
            {
                let mut metrics = self.metrics.write().await;
                metrics.total_requests += 1;
            }

            let started = Instant::now();
            let outcome = match timeout(Duration::from_millis(self.config.timeout_ms), operation())
                .await
            {
                Ok(Ok(data)) => Ok(data),
                Ok(Err(error)) => Err(error.to_string()),
                Err(_) => Err(format!(
                    "Operation timeout after {}ms",
                    self.config.timeout_ms
                )),
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(data) => {
                    let now = self.clock.now();
                    {
                        let mut metrics = self.metrics.write().await;
                        metrics.successful_requests += 1;
                        let n = metrics.successful_requests as f64;
                        metrics.average_response_time_ms =
                            (metrics.average_response_time_ms * (n - 1.0) + duration_ms as f64) / n;
                        metrics.last_activity = now;
                    }

                    let mut data_blob = Map::new();
                    data_blob.insert("attempt".to_string(), Value::from(attempt));
                    data_blob.insert("duration_ms".to_string(), Value::from(duration_ms));
                    self.append_audit(operation_name, AuditOutcome::Success, data_blob, None)
                        .await;

                    if attempt > 1 {
                        info!(
                            service = %self.service,
                            operation = %operation_name,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return OperationResult::succeeded(data, attempt, duration_ms, now);
                }
                Err(message) => {
                    warn!(
                        service = %self.service,
                        operation = %operation_name,
                        attempt,
                        max_attempts,
                        error = %message,
                        "Operation attempt failed"
                    );

                    if attempt == max_attempts {
                        {
                            let mut metrics = self.metrics.write().await;
                            metrics.failed_requests += 1;
                        }

                        let mut data_blob = Map::new();
                        data_blob.insert("total_attempts".to_string(), Value::from(attempt));
                        data_blob.insert("duration_ms".to_string(), Value::from(duration_ms));
                        self.append_audit(
                            operation_name,
                            AuditOutcome::Failure,
                            data_blob,
                            Some(message.clone()),
                        )
                        .await;

                        return OperationResult::failed(
                            message,
                            attempt,
                            duration_ms,
                            self.clock.now(),
                        );
                    }

                    // 1-indexed attempts: the first retry waits the base delay.
                    let delay_ms = self
                        .config
                        .retry_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt - 1));
                    debug!(
                        service = %self.service,
                        operation = %operation_name,
                        attempt,
                        delay_ms,
                        "Backing off before retry"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }

        OperationResult::failed(
            "Unexpected error in retry logic".to_string(),
            max_attempts,
            0,
            self.clock.now(),
        )
    }

    /// Coarse liveness signal: false until an operation has completed, and
    /// false again once the last activity falls outside the health window.
    pub async fn is_healthy(&self) -> bool {
        let metrics = self.metrics.read().await;
        if metrics.total_requests == 0 {
            return false;
        }
        self.clock.now() - metrics.last_activity
            <= chrono::Duration::minutes(HEALTH_WINDOW_MINUTES)
    }

    pub async fn status(&self) -> StatusSnapshot {
        let metrics = self.metrics.read().await.clone();
        let healthy = {
            if metrics.total_requests == 0 {
                false
            } else {
                self.clock.now() - metrics.last_activity
                    <= chrono::Duration::minutes(HEALTH_WINDOW_MINUTES)
            }
        };

        StatusSnapshot {
            success: self.initialized,
            data: StatusData {
                service: self.service.clone(),
                initialized: self.initialized,
                healthy,
                metrics,
                config: StatusConfig {
                    enabled: self.config.enabled,
                    retry_attempts: self.config.retry_attempts,
                    timeout: self.config.timeout_ms,
                },
            },
            timestamp: self.clock.now(),
        }
    }

    /// Most recent `limit` entries (all, if omitted) in insertion order.
    pub async fn audit_logs(&self, limit: Option<usize>) -> Vec<AuditLogEntry> {
        let log = self.audit_log.read().await;
        let limit = limit.unwrap_or(log.len()).min(log.len());
        log.iter().skip(log.len() - limit).cloned().collect()
    }

    /// Reinitializes counters and `last_activity`; the audit log is kept.
    pub async fn reset_metrics(&self) {
        let now = self.clock.now();
        let mut metrics = self.metrics.write().await;
        *metrics = IntegrationMetrics::new(now);
        info!(service = %self.service, "Integration metrics reset");
    }

    async fn append_audit(
        &self,
        action: &str,
        result: AuditOutcome,
        data: Map<String, Value>,
        error: Option<String>,
    ) {
        let timestamp = self.clock.now();
        let suffix = Uuid::new_v4().simple().to_string();
        let entry = AuditLogEntry {
            id: format!(
                "{}-{}-{}",
                self.service,
                timestamp.timestamp_millis(),
                &suffix[..8]
            ),
            service: self.service.clone(),
            action: action.to_string(),
            timestamp,
            result,
            data,
            error,
        };

        let mut log = self.audit_log.write().await;
        log.push_back(entry);
        while log.len() > MAX_AUDIT_ENTRIES {
            log.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Utc::now()),
            }
        }

        fn advance(&self, delta: chrono::Duration) {
            *self.now.lock().unwrap() += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn fast_config() -> IntegrationConfig {
        IntegrationConfig {
            retry_attempts: 3,
            retry_delay_ms: 10,
            timeout_ms: 1000,
            enabled: true,
        }
    }

    fn executor(config: IntegrationConfig) -> RetryableOperationExecutor {
        RetryableOperationExecutor::new("test-service", config).unwrap()
    }

    #[tokio::test]
    async fn failing_operation_is_attempted_exactly_max_times() {
        let exec = executor(fast_config());
        let calls = AtomicUsize::new(0);

        let result: OperationResult<String> = exec
            .execute_with_retry(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::ExternalServiceError("boom".to_string()))
                },
                "always_fails",
                None,
            )
            .await;

        assert!(!result.success);
        assert!(result.data.is_none());
        assert!(result.error.as_deref().unwrap().contains("boom"));
        assert_eq!(result.metadata.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn operation_succeeding_on_later_attempt_reports_attempt_count() {
        let exec = executor(fast_config());
        let calls = AtomicUsize::new(0);

        let result = exec
            .execute_with_retry(
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(AppError::ExternalServiceError("transient".to_string()))
                    } else {
                        Ok("ok".to_string())
                    }
                },
                "flaky",
                None,
            )
            .await;

        assert!(result.success);
        assert_eq!(result.data.as_deref(), Some("ok"));
        assert!(result.error.is_none());
        assert_eq!(result.metadata.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn backoff_delays_grow_exponentially() {
        let config = IntegrationConfig {
            retry_attempts: 3,
            retry_delay_ms: 50,
            ..fast_config()
        };
        let exec = executor(config);

        let started = Instant::now();
        let result: OperationResult<()> = exec
            .execute_with_retry(
                || async { Err(AppError::ExternalServiceError("nope".to_string())) },
                "always_fails",
                None,
            )
            .await;
        let elapsed = started.elapsed();

        assert!(!result.success);
        // Two backoffs: 50ms then 100ms.
        assert!(
            elapsed >= Duration::from_millis(150),
            "elapsed {:?} is below the expected backoff floor",
            elapsed
        );
    }

    #[tokio::test]
    async fn total_requests_counts_attempts_not_calls() {
        let exec = executor(fast_config());

        let _: OperationResult<()> = exec
            .execute_with_retry(
                || async { Err(AppError::ExternalServiceError("down".to_string())) },
                "always_fails",
                None,
            )
            .await;
        let _ = exec
            .execute_with_retry(|| async { Ok(42u32) }, "instant_success", None)
            .await;

        let status = exec.status().await;
        let metrics = status.data.metrics;
        assert_eq!(metrics.total_requests, 4);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.failed_requests, 1);
    }

    #[tokio::test]
    async fn average_response_time_is_a_running_mean_over_successes() {
        let exec = executor(fast_config());

        for _ in 0..3 {
            let _ = exec
                .execute_with_retry(|| async { Ok(()) }, "quick", None)
                .await;
        }

        let status = exec.status().await;
        let metrics = status.data.metrics;
        assert_eq!(metrics.successful_requests, 3);
        assert!(metrics.average_response_time_ms >= 0.0);
    }

    #[tokio::test]
    async fn audit_log_is_capped_at_one_hundred_most_recent_entries() {
        let exec = executor(fast_config());

        for i in 0..150 {
            let name = format!("op_{}", i);
            let _ = exec
                .execute_with_retry(|| async { Ok(()) }, &name, None)
                .await;
        }

        let logs = exec.audit_logs(None).await;
        assert_eq!(logs.len(), 100);
        assert_eq!(logs.first().unwrap().action, "op_50");
        assert_eq!(logs.last().unwrap().action, "op_149");
    }

    #[tokio::test]
    async fn audit_logs_limit_returns_most_recent_in_insertion_order() {
        let exec = executor(fast_config());

        for i in 0..12 {
            let name = format!("op_{}", i);
            let _ = exec
                .execute_with_retry(|| async { Ok(()) }, &name, None)
                .await;
        }

        let logs = exec.audit_logs(Some(10)).await;
        assert_eq!(logs.len(), 10);
        assert_eq!(logs.first().unwrap().action, "op_2");
        assert_eq!(logs.last().unwrap().action, "op_11");
        assert_eq!(logs.last().unwrap().result, AuditOutcome::Success);
    }

    #[tokio::test]
    async fn failed_operations_are_audited_with_error_message() {
        let exec = executor(IntegrationConfig {
            retry_attempts: 1,
            ..fast_config()
        });

        let _: OperationResult<()> = exec
            .execute_with_retry(
                || async { Err(AppError::ExternalServiceError("broken".to_string())) },
                "doomed",
                None,
            )
            .await;

        let logs = exec.audit_logs(None).await;
        assert_eq!(logs.len(), 1);
        let entry = &logs[0];
        assert_eq!(entry.result, AuditOutcome::Failure);
        assert!(entry.error.as_deref().unwrap().contains("broken"));
        assert_eq!(entry.data.get("total_attempts"), Some(&Value::from(1u32)));
        assert_eq!(entry.service, "test-service");
        assert!(entry.id.starts_with("test-service-"));
    }

    #[tokio::test]
    async fn health_tracks_activity_within_thirty_minutes() {
        let clock = Arc::new(ManualClock::new());
        let exec = RetryableOperationExecutor::with_clock(
            "test-service",
            fast_config(),
            clock.clone(),
        )
        .unwrap();

        assert!(!exec.is_healthy().await);

        let _ = exec
            .execute_with_retry(|| async { Ok(()) }, "quick", None)
            .await;
        assert!(exec.is_healthy().await);

        clock.advance(chrono::Duration::minutes(31));
        assert!(!exec.is_healthy().await);
    }

    #[tokio::test]
    async fn timeout_is_classified_and_the_orphan_is_disregarded() {
        let exec = executor(IntegrationConfig {
            retry_attempts: 1,
            timeout_ms: 1000,
            ..fast_config()
        });

        let result: OperationResult<()> = exec
            .execute_with_retry(
                || async {
                    sleep(Duration::from_millis(5000)).await;
                    Ok(())
                },
                "never_finishes",
                None,
            )
            .await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("timeout"));

        let status = exec.status().await;
        assert_eq!(status.data.metrics.failed_requests, 1);
    }

    #[tokio::test]
    async fn reset_metrics_zeroes_counters_but_keeps_audit_log() {
        let exec = executor(fast_config());

        for _ in 0..5 {
            let _ = exec
                .execute_with_retry(|| async { Ok(()) }, "quick", None)
                .await;
        }
        let _: OperationResult<()> = exec
            .execute_with_retry(
                || async { Err(AppError::ExternalServiceError("down".to_string())) },
                "doomed",
                Some(1),
            )
            .await;

        exec.reset_metrics().await;

        let status = exec.status().await;
        assert_eq!(status.data.metrics.total_requests, 0);
        assert_eq!(status.data.metrics.successful_requests, 0);
        assert_eq!(status.data.metrics.failed_requests, 0);
        assert!(!status.data.healthy);
        assert_eq!(exec.audit_logs(None).await.len(), 6);
    }

    #[tokio::test]
    async fn zero_attempt_override_falls_back_to_configured_budget() {
        let exec = executor(fast_config());
        let calls = AtomicUsize::new(0);

        let result: OperationResult<()> = exec
            .execute_with_retry(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::ExternalServiceError("nope".to_string()))
                },
                "always_fails",
                Some(0),
            )
            .await;

        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn status_snapshot_carries_service_and_config() {
        let exec = executor(fast_config());
        let status = exec.status().await;

        assert!(status.success);
        assert_eq!(status.data.service, "test-service");
        assert!(status.data.initialized);
        assert!(status.data.config.enabled);
        assert_eq!(status.data.config.retry_attempts, 3);
        assert_eq!(status.data.config.timeout, 1000);
    }

    #[test]
    fn construction_rejects_invalid_config() {
        let bad = IntegrationConfig {
            retry_attempts: 0,
            ..fast_config()
        };
        assert!(RetryableOperationExecutor::new("svc", bad).is_err());

        let disabled = IntegrationConfig {
            enabled: false,
            ..fast_config()
        };
        assert!(RetryableOperationExecutor::new("svc", disabled).is_err());
    }
}

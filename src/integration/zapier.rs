use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::ServiceSettings;
use crate::error::{AppError, Result};
use crate::integration::executor::{OperationResult, RetryableOperationExecutor};

/// Pushes payloads to a Zapier catch hook; every call runs through the
/// executor.
pub struct ZapierService {
    executor: RetryableOperationExecutor,
    http: Client,
    settings: ServiceSettings,
}

impl ZapierService {
    pub fn new(settings: ServiceSettings, http: Client) -> Result<Self> {
        let executor = RetryableOperationExecutor::new("zapier", settings.integration.clone())?;
        Ok(Self {
            executor,
            http,
            settings,
        })
    }

    pub fn executor(&self) -> &RetryableOperationExecutor {
        &self.executor
    }

    /// POST a free-form payload to `{base_url}{hook_path}`.
    pub async fn send(&self, hook_path: &str, payload: &Value) -> OperationResult<Value> {
        let url = format!("{}{}", self.settings.base_url, hook_path);
        debug!(hook_path, "Sending payload to Zapier hook");

        self.executor
            .execute_with_retry(
                || async {
                    let response = self.http.post(&url).json(payload).send().await?;

                    if !response.status().is_success() {
                        let error_text = response.text().await.unwrap_or_default();
                        return Err(AppError::ZapierHookError(format!(
                            "catch hook rejected payload: {}",
                            error_text
                        )));
                    }

                    let body: Value = response.json().await.unwrap_or(Value::Null);
                    Ok(body)
                },
                "zapier.send",
                None,
            )
            .await
    }
}

use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ServiceSettings;
use crate::error::{AppError, Result};
use crate::integration::executor::{OperationResult, RetryableOperationExecutor};

/// Thin Slack Web API client; every outbound call runs through the executor.
pub struct SlackService {
    executor: RetryableOperationExecutor,
    http: Client,
    settings: ServiceSettings,
}

impl SlackService {
    pub fn new(settings: ServiceSettings, http: Client) -> Result<Self> {
        let executor = RetryableOperationExecutor::new("slack", settings.integration.clone())?;
        Ok(Self {
            executor,
            http,
            settings,
        })
    }

    pub fn executor(&self) -> &RetryableOperationExecutor {
        &self.executor
    }

    /// Post a message via `chat.postMessage`.
    pub async fn post_message(&self, channel: &str, text: &str) -> OperationResult<Value> {
        let url = format!("{}/chat.postMessage", self.settings.base_url);
        debug!(channel, "Posting Slack message");

        self.executor
            .execute_with_retry(
                || async {
                    let response = self
                        .http
                        .post(&url)
                        .bearer_auth(&self.settings.api_token)
                        .json(&json!({ "channel": channel, "text": text }))
                        .send()
                        .await?;

                    if !response.status().is_success() {
                        let error_text = response.text().await.unwrap_or_default();
                        return Err(AppError::SlackApiError(format!(
                            "chat.postMessage failed: {}",
                            error_text
                        )));
                    }

                    let body: Value = response.json().await?;
                    // Slack reports API-level failures inside a 200 body.
                    if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
                        let reason = body
                            .get("error")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown_error");
                        return Err(AppError::SlackApiError(reason.to_string()));
                    }
                    Ok(body)
                },
                "slack.post_message",
                None,
            )
            .await
    }
}

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::ServiceSettings;
use crate::error::{AppError, Result};
use crate::integration::executor::{OperationResult, RetryableOperationExecutor};

/// Thin HubSpot CRM v3 client; every outbound call runs through the executor.
pub struct HubSpotService {
    executor: RetryableOperationExecutor,
    http: Client,
    settings: ServiceSettings,
}

impl HubSpotService {
    pub fn new(settings: ServiceSettings, http: Client) -> Result<Self> {
        let executor = RetryableOperationExecutor::new("hubspot", settings.integration.clone())?;
        Ok(Self {
            executor,
            http,
            settings,
        })
    }

    pub fn executor(&self) -> &RetryableOperationExecutor {
        &self.executor
    }

    /// Patch contact properties on a CRM contact record.
    pub async fn update_contact(
        &self,
        contact_id: &str,
        properties: Map<String, Value>,
    ) -> OperationResult<Value> {
        let url = format!(
            "{}/crm/v3/objects/contacts/{}",
            self.settings.base_url, contact_id
        );
        debug!(contact_id, "Updating HubSpot contact");

        self.executor
            .execute_with_retry(
                || async {
                    let response = self
                        .http
                        .patch(&url)
                        .bearer_auth(&self.settings.api_token)
                        .json(&json!({ "properties": properties }))
                        .send()
                        .await?;

                    if !response.status().is_success() {
                        let error_text = response.text().await.unwrap_or_default();
                        return Err(AppError::HubSpotApiError(format!(
                            "contact update failed: {}",
                            error_text
                        )));
                    }

                    let contact: Value = response.json().await?;
                    Ok(contact)
                },
                "hubspot.update_contact",
                None,
            )
            .await
    }

    /// Contacts whose `lastmodifieddate` is at or after `since`. Backs the
    /// polling trigger; results are raw CRM objects.
    pub async fn recently_modified_contacts(
        &self,
        since: DateTime<Utc>,
    ) -> OperationResult<Vec<Value>> {
        let url = format!("{}/crm/v3/objects/contacts/search", self.settings.base_url);
        let body = json!({
            "filterGroups": [{
                "filters": [{
                    "propertyName": "lastmodifieddate",
                    "operator": "GTE",
                    "value": since.timestamp_millis().to_string()
                }]
            }],
            "sorts": ["lastmodifieddate"],
            "limit": 100
        });

        self.executor
            .execute_with_retry(
                || async {
                    let response = self
                        .http
                        .post(&url)
                        .bearer_auth(&self.settings.api_token)
                        .json(&body)
                        .send()
                        .await?;

                    if !response.status().is_success() {
                        let error_text = response.text().await.unwrap_or_default();
                        return Err(AppError::HubSpotApiError(format!(
                            "contact search failed: {}",
                            error_text
                        )));
                    }

                    let page: Value = response.json().await?;
                    let results = page
                        .get("results")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    Ok(results)
                },
                "hubspot.recently_modified_contacts",
                None,
            )
            .await
    }
}

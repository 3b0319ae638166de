use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::dispatch::{EventAction, InboundEvent};
use crate::error::{AppError, Result};
use crate::integration::hubspot::HubSpotService;
use crate::integration::slack::SlackService;
use crate::integration::zapier::ZapierService;

/// HubSpot contact change -> Slack channel notification.
pub struct NotifySlackAction {
    slack: Arc<SlackService>,
    channel: String,
}

impl NotifySlackAction {
    pub fn new(slack: Arc<SlackService>, channel: String) -> Self {
        Self { slack, channel }
    }
}

#[async_trait]
impl EventAction for NotifySlackAction {
    fn name(&self) -> &'static str {
        "slack.notify"
    }

    async fn handle(&self, event: &InboundEvent) -> Result<Value> {
        let object_id = event
            .payload
            .get("objectId")
            .map(Value::to_string)
            .unwrap_or_else(|| "unknown".to_string());
        let property = event
            .payload
            .get("propertyName")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        let text = format!(
            "CRM update: contact {} changed `{}` ({})",
            object_id, property, event.event_type
        );
        self.slack
            .post_message(&self.channel, &text)
            .await
            .into_result()
    }
}

/// Slack message -> Zapier catch hook.
pub struct ForwardToZapierAction {
    zapier: Arc<ZapierService>,
    hook_path: String,
}

impl ForwardToZapierAction {
    pub fn new(zapier: Arc<ZapierService>, hook_path: String) -> Self {
        Self { zapier, hook_path }
    }
}

#[async_trait]
impl EventAction for ForwardToZapierAction {
    fn name(&self) -> &'static str {
        "zapier.forward"
    }

    async fn handle(&self, event: &InboundEvent) -> Result<Value> {
        self.zapier
            .send(&self.hook_path, &event.payload)
            .await
            .into_result()
    }
}

/// Zapier payload -> HubSpot contact property update.
pub struct UpdateHubSpotContactAction {
    hubspot: Arc<HubSpotService>,
}

impl UpdateHubSpotContactAction {
    pub fn new(hubspot: Arc<HubSpotService>) -> Self {
        Self { hubspot }
    }
}

#[async_trait]
impl EventAction for UpdateHubSpotContactAction {
    fn name(&self) -> &'static str {
        "hubspot.update_contact"
    }

    async fn handle(&self, event: &InboundEvent) -> Result<Value> {
        let contact_id = event
            .payload
            .get("contact_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::ValidationError("payload is missing contact_id".to_string())
            })?;
        let properties: Map<String, Value> = event
            .payload
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| {
                AppError::ValidationError("payload is missing properties".to_string())
            })?;

        self.hubspot
            .update_contact(contact_id, properties)
            .await
            .into_result()
    }
}

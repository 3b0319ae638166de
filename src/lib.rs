//! crm-bridge - a CRM automation backend gluing Slack, HubSpot and Zapier
//! together via REST webhooks and polling triggers.
//!
//! The load-bearing piece is the retryable-operation executor in
//! [`integration::executor`]; everything else is thin plumbing around it.

use std::sync::Arc;

pub mod actions;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod integration;
pub mod poller;
pub mod routes;

// Re-export commonly used types
pub use error::{AppError, Result};

use actions::{ForwardToZapierAction, NotifySlackAction, UpdateHubSpotContactAction};
use config::Config;
use dispatch::{Dispatcher, EventSource};
use integration::executor::RetryableOperationExecutor;
use integration::hubspot::HubSpotService;
use integration::slack::SlackService;
use integration::zapier::ZapierService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub env: Arc<Config>,
    pub slack: Arc<SlackService>,
    pub hubspot: Arc<HubSpotService>,
    pub zapier: Arc<ZapierService>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Build services, wire the dispatcher routes, and share one HTTP client.
    pub fn from_config(config: Config) -> Result<AppState> {
        let http = reqwest::Client::new();

        let slack = Arc::new(SlackService::new(config.slack.clone(), http.clone())?);
        let hubspot = Arc::new(HubSpotService::new(config.hubspot.clone(), http.clone())?);
        let zapier = Arc::new(ZapierService::new(config.zapier.clone(), http)?);

        let dispatcher = Dispatcher::new()
            .register_action(Arc::new(NotifySlackAction::new(
                slack.clone(),
                config.slack_notify_channel.clone(),
            )))
            .register_action(Arc::new(ForwardToZapierAction::new(
                zapier.clone(),
                config.zapier_hook_path.clone(),
            )))
            .register_action(Arc::new(UpdateHubSpotContactAction::new(hubspot.clone())))
            .add_route(EventSource::Slack, "message", "zapier.forward")
            .add_route(EventSource::HubSpot, "contact.*", "slack.notify")
            .add_route(EventSource::Zapier, "contact.update", "hubspot.update_contact");

        Ok(AppState {
            env: Arc::new(config),
            slack,
            hubspot,
            zapier,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn executor_for(&self, service: &str) -> Option<&RetryableOperationExecutor> {
        match service {
            "slack" => Some(self.slack.executor()),
            "hubspot" => Some(self.hubspot.executor()),
            "zapier" => Some(self.zapier.executor()),
            _ => None,
        }
    }
}

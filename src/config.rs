use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::integration::executor::IntegrationConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub client_origin: String,

    pub slack: ServiceSettings,
    pub hubspot: ServiceSettings,
    pub zapier: ServiceSettings,

    pub slack_notify_channel: String,
    pub zapier_hook_path: String,
    pub hubspot_poll_interval_secs: u64,
}

/// Per-integration credentials plus executor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub api_token: String,
    pub base_url: String,
    pub integration: IntegrationConfig,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        let port = env_or("PORT", "8000").parse::<u16>().map_err(|_| {
            AppError::ConfigurationError("PORT must be a number".to_string())
        })?;
        let client_origin = env_or("CLIENT_ORIGIN", "http://localhost:3000");

        let hubspot_poll_interval_secs = env_or("HUBSPOT_POLL_INTERVAL_SECS", "300")
            .parse::<u64>()
            .map_err(|_| {
                AppError::ConfigurationError(
                    "HUBSPOT_POLL_INTERVAL_SECS must be a number".to_string(),
                )
            })?;

        let config = Config {
            port,
            client_origin,
            slack: ServiceSettings::from_env("SLACK", "https://slack.com/api")?,
            hubspot: ServiceSettings::from_env("HUBSPOT", "https://api.hubapi.com")?,
            zapier: ServiceSettings::from_env("ZAPIER", "https://hooks.zapier.com")?,
            slack_notify_channel: env_or("SLACK_NOTIFY_CHANNEL", "#crm-updates"),
            zapier_hook_path: env_or("ZAPIER_HOOK_PATH", "/hooks/catch/crm-bridge"),
            hubspot_poll_interval_secs,
        };

        Ok(config)
    }
}

impl ServiceSettings {
    fn from_env(prefix: &str, default_base_url: &str) -> Result<ServiceSettings> {
        let api_token = std::env::var(format!("{}_API_TOKEN", prefix)).map_err(|_| {
            AppError::ConfigurationError(format!("{}_API_TOKEN must be set", prefix))
        })?;
        let base_url = env_or(&format!("{}_BASE_URL", prefix), default_base_url);

        let integration = IntegrationConfig {
            retry_attempts: parse_env(prefix, "RETRY_ATTEMPTS", "3")?,
            retry_delay_ms: parse_env(prefix, "RETRY_DELAY_MS", "1000")?,
            timeout_ms: parse_env(prefix, "TIMEOUT_MS", "10000")?,
            enabled: parse_env(prefix, "ENABLED", "true")?,
        };
        integration.validate()?;

        Ok(ServiceSettings {
            api_token,
            base_url,
            integration,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(prefix: &str, key: &str, default: &str) -> Result<T> {
    let name = format!("{}_{}", prefix, key);
    std::env::var(&name)
        .unwrap_or_else(|_| default.to_owned())
        .parse::<T>()
        .map_err(|_| AppError::ConfigurationError(format!("{} is not valid", name)))
}

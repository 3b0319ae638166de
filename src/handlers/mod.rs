pub mod integrations;
pub mod webhooks;

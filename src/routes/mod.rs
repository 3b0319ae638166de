pub mod integrations;
pub mod webhooks;

pub use integrations::integrations_router;
pub use webhooks::webhook_router;

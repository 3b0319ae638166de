use crate::{
    handlers::webhooks::{hubspot_webhook, slack_webhook, zapier_webhook},
    AppState,
};
use axum::{routing::post, Router};

pub fn webhook_router() -> Router<AppState> {
    Router::new()
        .route("/slack", post(slack_webhook))
        .route("/hubspot", post(hubspot_webhook))
        .route("/zapier", post(zapier_webhook))
}

use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::dispatch::{EventSource, InboundEvent};
use crate::AppState;

/// Slack Events API entrypoint. Answers the `url_verification` handshake and
/// forwards `event_callback` events to the dispatcher. Always 200: Slack
/// retries aggressively on anything else.
pub async fn slack_webhook(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    match body.get("type").and_then(Value::as_str) {
        Some("url_verification") => {
            let challenge = body.get("challenge").cloned().unwrap_or(Value::Null);
            debug!("Answering Slack url_verification challenge");
            Json(json!({ "challenge": challenge }))
        }
        Some("event_callback") => {
            let payload = body.get("event").cloned().unwrap_or(Value::Null);
            let event_type = payload
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();

            let event = InboundEvent::new(EventSource::Slack, event_type, payload);
            let outcome = state.dispatcher.dispatch(&event).await;
            Json(json!({ "ok": true, "dispatch": outcome }))
        }
        _ => Json(json!({ "ok": true })),
    }
}

/// HubSpot webhook entrypoint: a batch of property-change notifications, each
/// dispatched on its own correlation id.
pub async fn hubspot_webhook(
    State(state): State<AppState>,
    Json(notifications): Json<Vec<Value>>,
) -> Json<Value> {
    info!(count = notifications.len(), "Received HubSpot webhook batch");

    let mut outcomes = Vec::with_capacity(notifications.len());
    for notification in notifications {
        let event_type = notification
            .get("subscriptionType")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let event = InboundEvent::new(EventSource::HubSpot, event_type, notification);
        outcomes.push(state.dispatcher.dispatch(&event).await);
    }

    Json(json!({ "ok": true, "received": outcomes.len(), "dispatch": outcomes }))
}

/// Zapier push entrypoint: one free-form payload per request.
pub async fn zapier_webhook(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    let event_type = body
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or("payload.received")
        .to_string();

    let event = InboundEvent::new(EventSource::Zapier, event_type, body);
    let outcome = state.dispatcher.dispatch(&event).await;
    Json(json!({ "ok": true, "dispatch": outcome }))
}

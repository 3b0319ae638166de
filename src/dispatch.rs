use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Slack,
    HubSpot,
    Zapier,
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventSource::Slack => write!(f, "slack"),
            EventSource::HubSpot => write!(f, "hubspot"),
            EventSource::Zapier => write!(f, "zapier"),
        }
    }
}

/// One inbound webhook (or synthetic poll) event. Every event carries a
/// correlation id that all downstream logs are tagged with.
#[derive(Debug, Clone, Serialize)]
pub struct InboundEvent {
    pub source: EventSource,
    pub event_type: String,
    pub correlation_id: Uuid,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(source: EventSource, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            source,
            event_type: event_type.into(),
            correlation_id: Uuid::new_v4(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// A named downstream action an event can be routed to.
#[async_trait]
pub trait EventAction: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, event: &InboundEvent) -> Result<Value>;
}

/// `event_type` matches exactly, or by prefix when the pattern ends in `*`.
#[derive(Debug, Clone)]
struct DispatchRule {
    source: EventSource,
    event_type: String,
    action: String,
}

impl DispatchRule {
    fn matches(&self, event: &InboundEvent) -> bool {
        if self.source != event.source {
            return false;
        }
        match self.event_type.strip_suffix('*') {
            Some(prefix) => event.event_type.starts_with(prefix),
            None => self.event_type == event.event_type,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub correlation_id: Uuid,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Routes inbound events to registered actions by (source, event-type) rule.
/// Rules are checked in registration order; the first match wins.
pub struct Dispatcher {
    rules: Vec<DispatchRule>,
    actions: HashMap<String, Arc<dyn EventAction>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            actions: HashMap::new(),
        }
    }

    pub fn register_action(mut self, action: Arc<dyn EventAction>) -> Self {
        self.actions.insert(action.name().to_string(), action);
        self
    }

    pub fn add_route(
        mut self,
        source: EventSource,
        event_type: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        self.rules.push(DispatchRule {
            source,
            event_type: event_type.into(),
            action: action.into(),
        });
        self
    }

    pub async fn dispatch(&self, event: &InboundEvent) -> DispatchOutcome {
        let Some(rule) = self.rules.iter().find(|rule| rule.matches(event)) else {
            // Unrouted events are acknowledged, not failed; vendors retry on
            // anything but a 2xx.
            debug!(
                correlation_id = %event.correlation_id,
                source = %event.source,
                event_type = %event.event_type,
                "No dispatch rule matched, acknowledging"
            );
            return DispatchOutcome {
                correlation_id: event.correlation_id,
                matched: false,
                action: None,
                success: true,
                error: None,
            };
        };

        let Some(action) = self.actions.get(&rule.action) else {
            warn!(
                correlation_id = %event.correlation_id,
                action = %rule.action,
                "Dispatch rule points at an unregistered action"
            );
            return DispatchOutcome {
                correlation_id: event.correlation_id,
                matched: true,
                action: Some(rule.action.clone()),
                success: false,
                error: Some(format!("action not registered: {}", rule.action)),
            };
        };

        info!(
            correlation_id = %event.correlation_id,
            source = %event.source,
            event_type = %event.event_type,
            action = %action.name(),
            "Dispatching inbound event"
        );

        match action.handle(event).await {
            Ok(_) => DispatchOutcome {
                correlation_id: event.correlation_id,
                matched: true,
                action: Some(rule.action.clone()),
                success: true,
                error: None,
            },
            Err(error) => {
                warn!(
                    correlation_id = %event.correlation_id,
                    action = %action.name(),
                    error = %error,
                    "Dispatched action failed"
                );
                DispatchOutcome {
                    correlation_id: event.correlation_id,
                    matched: true,
                    action: Some(rule.action.clone()),
                    success: false,
                    error: Some(error.to_string()),
                }
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingAction {
        calls: AtomicUsize,
        fail: bool,
    }

    impl RecordingAction {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl EventAction for RecordingAction {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn handle(&self, _event: &InboundEvent) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AppError::ExternalServiceError("downstream down".to_string()))
            } else {
                Ok(json!({ "handled": true }))
            }
        }
    }

    #[tokio::test]
    async fn routes_event_to_matching_action() {
        let action = Arc::new(RecordingAction::new(false));
        let dispatcher = Dispatcher::new()
            .register_action(action.clone())
            .add_route(EventSource::Slack, "message", "recording");

        let event = InboundEvent::new(EventSource::Slack, "message", json!({"text": "hi"}));
        let outcome = dispatcher.dispatch(&event).await;

        assert!(outcome.matched);
        assert!(outcome.success);
        assert_eq!(outcome.action.as_deref(), Some("recording"));
        assert_eq!(outcome.correlation_id, event.correlation_id);
        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wildcard_rule_matches_by_prefix() {
        let action = Arc::new(RecordingAction::new(false));
        let dispatcher = Dispatcher::new()
            .register_action(action.clone())
            .add_route(EventSource::HubSpot, "contact.*", "recording");

        let event = InboundEvent::new(
            EventSource::HubSpot,
            "contact.propertyChange",
            json!({"objectId": 42}),
        );
        let outcome = dispatcher.dispatch(&event).await;

        assert!(outcome.matched);
        assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unrouted_event_is_acknowledged_without_running_anything() {
        let action = Arc::new(RecordingAction::new(false));
        let dispatcher = Dispatcher::new()
            .register_action(action.clone())
            .add_route(EventSource::Slack, "message", "recording");

        let event = InboundEvent::new(EventSource::Zapier, "payload.received", json!({}));
        let outcome = dispatcher.dispatch(&event).await;

        assert!(!outcome.matched);
        assert!(outcome.success);
        assert!(outcome.action.is_none());
        assert_eq!(action.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn action_failure_is_reported_in_the_outcome() {
        let action = Arc::new(RecordingAction::new(true));
        let dispatcher = Dispatcher::new()
            .register_action(action)
            .add_route(EventSource::Slack, "message", "recording");

        let event = InboundEvent::new(EventSource::Slack, "message", json!({}));
        let outcome = dispatcher.dispatch(&event).await;

        assert!(outcome.matched);
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("downstream down"));
    }

    #[tokio::test]
    async fn first_matching_rule_wins() {
        struct NamedAction(&'static str, Arc<AtomicUsize>);

        #[async_trait]
        impl EventAction for NamedAction {
            fn name(&self) -> &'static str {
                self.0
            }
            async fn handle(&self, _event: &InboundEvent) -> Result<Value> {
                self.1.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        }

        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new()
            .register_action(Arc::new(NamedAction("first", first_calls.clone())))
            .register_action(Arc::new(NamedAction("second", second_calls.clone())))
            .add_route(EventSource::Slack, "message", "first")
            .add_route(EventSource::Slack, "*", "second");

        let event = InboundEvent::new(EventSource::Slack, "message", json!({}));
        dispatcher.dispatch(&event).await;

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }
}

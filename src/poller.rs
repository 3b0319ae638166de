use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::{EventSource, InboundEvent};
use crate::AppState;

/// Polling trigger for HubSpot: every `hubspot_poll_interval_secs`, fetch
/// contacts modified since the last sweep and push each one through the
/// dispatcher as a synthetic `contact.propertyChange` event.
pub fn spawn_hubspot_poller(state: AppState) -> JoinHandle<()> {
    let interval_secs = state.env.hubspot_poll_interval_secs;

    tokio::spawn(async move {
        info!(interval_secs, "Starting HubSpot polling trigger");
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut since = Utc::now();
        loop {
            ticker.tick().await;

            let sweep_started = Utc::now();
            let result = state.hubspot.recently_modified_contacts(since).await;

            if !result.success {
                // Retries and auditing already happened inside the executor.
                warn!(
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "HubSpot poll sweep failed"
                );
                continue;
            }

            let contacts = result.data.unwrap_or_default();
            debug!(count = contacts.len(), "HubSpot poll sweep completed");
            for contact in contacts {
                let event =
                    InboundEvent::new(EventSource::HubSpot, "contact.propertyChange", contact);
                state.dispatcher.dispatch(&event).await;
            }

            since = sweep_started;
        }
    })
}

use crate::{
    handlers::integrations::{get_audit_logs, get_status, list_integrations, reset_metrics},
    AppState,
};
use axum::{
    routing::{get, post},
    Router,
};

pub fn integrations_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_integrations))
        .route("/:service/status", get(get_status))
        .route("/:service/audit", get(get_audit_logs))
        .route("/:service/metrics/reset", post(reset_metrics))
}

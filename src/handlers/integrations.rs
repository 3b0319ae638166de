use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::{AppError, Result};
use crate::integration::executor::{AuditLogEntry, StatusSnapshot};
use crate::AppState;

const SERVICES: [&str; 3] = ["slack", "hubspot", "zapier"];

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// Status snapshots for every integration service.
pub async fn list_integrations(State(state): State<AppState>) -> Json<Value> {
    let mut statuses = Vec::with_capacity(SERVICES.len());
    for service in SERVICES {
        if let Some(executor) = state.executor_for(service) {
            statuses.push(executor.status().await);
        }
    }
    Json(json!({ "success": true, "data": statuses }))
}

pub async fn get_status(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<StatusSnapshot>> {
    let executor = state
        .executor_for(&service)
        .ok_or_else(|| AppError::NotFound(format!("unknown integration: {}", service)))?;
    Ok(Json(executor.status().await))
}

pub async fn get_audit_logs(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogEntry>>> {
    let executor = state
        .executor_for(&service)
        .ok_or_else(|| AppError::NotFound(format!("unknown integration: {}", service)))?;
    Ok(Json(executor.audit_logs(query.limit).await))
}

pub async fn reset_metrics(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Result<Json<Value>> {
    let executor = state
        .executor_for(&service)
        .ok_or_else(|| AppError::NotFound(format!("unknown integration: {}", service)))?;
    executor.reset_metrics().await;
    info!(service = %service, "Metrics reset requested via API");
    Ok(Json(json!({ "success": true, "service": service })))
}

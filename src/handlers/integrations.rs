// Accounting Integration API Handlers
// REST endpoints for registering accounting connectors per company and
// running, inspecting and cancelling sync jobs.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::{ConnectorType, EntityType, SyncDirection};
use crate::services::accounting::{ConnectorSettings, IntegrationError, IntegrationManager, SyncOptions};
use crate::services::audit_service::MemoryAuditLogger;
use crate::utils::log_sanitizer::sanitize_for_log;

const DEFAULT_AUDIT_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<IntegrationManager>,
    pub audit_log: Arc<MemoryAuditLogger>,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterConnectorRequest {
    /// `economic`, `e-conomic`, `dinero`, `billy`, `visma` or `visma.net`.
    #[validate(length(min = 1, max = 32))]
    pub connector_type: String,
    #[serde(flatten)]
    pub settings: ConnectorSettings,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    pub entity_types: Option<Vec<EntityType>>,
    pub direction: Option<SyncDirection>,
    #[serde(default)]
    pub full_sync: bool,
    /// ISO 8601 date or timestamp; vendors filter by day.
    #[serde(default, deserialize_with = "deserialize_since")]
    pub since: Option<NaiveDate>,
}

fn deserialize_since<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(timestamp.naive_utc().date()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| serde::de::Error::custom(format!("invalid since value: {}", sanitize_for_log(raw))))
}

#[derive(Debug, Deserialize)]
pub struct PeriodLockedQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RegisteredCompany {
    pub company_id: String,
    pub connector_type: ConnectorType,
    pub connected: bool,
    pub sync_running: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /api/integrations/connectors
pub async fn list_available_connectors(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.available_connectors())
}

/// GET /api/integrations
pub async fn list_registered(State(state): State<AppState>) -> impl IntoResponse {
    let companies: Vec<RegisteredCompany> = state
        .manager
        .registered_companies()
        .into_iter()
        .map(|(company_id, connector_type)| {
            let connected = state
                .manager
                .get_connector(&company_id)
                .map_or(false, |c| c.is_connected());
            let sync_running = state
                .manager
                .get_sync_engine(&company_id)
                .map_or(false, |e| e.is_job_running(&company_id));
            RegisteredCompany {
                company_id,
                connector_type,
                connected,
                sync_running,
            }
        })
        .collect();

    Json(json!({ "total": companies.len(), "integrations": companies }))
}

/// POST /api/integrations/:company_id
pub async fn register_connector(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Json(request): Json<RegisterConnectorRequest>,
) -> Result<impl IntoResponse> {
    request.validate()?;

    tracing::info!(
        "Registering {} connector for company {}",
        sanitize_for_log(&request.connector_type),
        sanitize_for_log(&company_id)
    );

    let connector_type = request
        .connector_type
        .parse::<ConnectorType>()
        .map_err(|_| IntegrationError::UnknownConnector(request.connector_type.clone()))?;

    let registration = state
        .manager
        .register_connector(&company_id, connector_type, &request.settings)
        .await?;

    Ok((StatusCode::CREATED, Json(registration)))
}

/// DELETE /api/integrations/:company_id
pub async fn remove_connector(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> Result<impl IntoResponse> {
    if !state.manager.remove_connector(&company_id).await {
        return Err(IntegrationError::NotRegistered(company_id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/integrations/:company_id/test
pub async fn test_connection(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> Result<impl IntoResponse> {
    let connector = state
        .manager
        .get_connector(&company_id)
        .ok_or_else(|| IntegrationError::NotRegistered(company_id.clone()))?;

    Ok(Json(connector.test_connection().await))
}

/// POST /api/integrations/:company_id/sync
///
/// Runs the job to completion and returns it.
pub async fn run_sync(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Json(request): Json<SyncRequest>,
) -> Result<impl IntoResponse> {
    let mut options = SyncOptions::new(&company_id)
        .full_sync(request.full_sync)
        .since(request.since)
        .triggered_by("api");
    if let Some(entity_types) = request.entity_types {
        options = options.entity_types(entity_types);
    }
    if let Some(direction) = request.direction {
        options = options.direction(direction);
    }

    let job = state.manager.run_sync(options).await?;
    Ok(Json(job))
}

/// GET /api/integrations/:company_id/sync
pub async fn get_sync_status(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> Result<impl IntoResponse> {
    let engine = state
        .manager
        .get_sync_engine(&company_id)
        .ok_or_else(|| IntegrationError::NotRegistered(company_id.clone()))?;

    let job = engine
        .get_job_status(&company_id)
        .ok_or_else(|| AppError::NotFound("No sync job running".to_string()))?;
    Ok(Json(job))
}

/// POST /api/integrations/:company_id/sync/cancel
pub async fn cancel_sync(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> Result<impl IntoResponse> {
    let engine = state
        .manager
        .get_sync_engine(&company_id)
        .ok_or_else(|| IntegrationError::NotRegistered(company_id.clone()))?;

    Ok(Json(json!({ "cancelled": engine.cancel_job(&company_id) })))
}

/// GET /api/integrations/:company_id/period-locked?date=YYYY-MM-DD
pub async fn check_period_locked(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Query(query): Query<PeriodLockedQuery>,
) -> Result<impl IntoResponse> {
    let connector = state
        .manager
        .get_connector(&company_id)
        .ok_or_else(|| IntegrationError::NotRegistered(company_id.clone()))?;

    let locked = connector.is_period_locked(query.date).await?;
    Ok(Json(json!({ "date": query.date, "locked": locked })))
}

/// GET /api/integrations/:company_id/audit?limit=
pub async fn recent_audit_events(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).min(500);
    Json(state.audit_log.recent_for_company(&company_id, limit))
}

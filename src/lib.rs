pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, BookingPeriodCheck};
use crate::handlers::integrations;
use crate::handlers::AppState;
use crate::services::accounting::IntegrationManager;
use crate::services::audit_service::{
    AuditLogger, CompositeAuditLogger, MemoryAuditLogger, TracingAuditLogger,
};

/// Wires the integration manager and audit sinks from configuration.
pub fn build_state(config: &AppConfig) -> AppState {
    let audit_log = Arc::new(MemoryAuditLogger::new());
    let audit: Arc<dyn AuditLogger> = Arc::new(CompositeAuditLogger::new(vec![
        Arc::new(TracingAuditLogger),
        audit_log.clone(),
    ]));

    let manager = IntegrationManager::new(audit)
        .with_enabled_connectors(config.enabled_connectors.iter().copied())
        .with_retry_policy(config.retry_policy())
        .with_default_timeout(config.connector_timeout)
        .with_locked_period_check(config.booking_period_check == BookingPeriodCheck::Client);

    AppState {
        manager: Arc::new(manager),
        audit_log,
    }
}

pub fn create_app(state: AppState, cors_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/health", get(integrations::health))
        .nest(
            "/api/integrations",
            Router::new()
                .route("/", get(integrations::list_registered))
                .route("/connectors", get(integrations::list_available_connectors))
                .route(
                    "/:company_id",
                    post(integrations::register_connector).delete(integrations::remove_connector),
                )
                .route("/:company_id/test", get(integrations::test_connection))
                .route(
                    "/:company_id/sync",
                    post(integrations::run_sync).get(integrations::get_sync_status),
                )
                .route("/:company_id/sync/cancel", post(integrations::cancel_sync))
                .route("/:company_id/period-locked", get(integrations::check_period_locked))
                .route("/:company_id/audit", get(integrations::recent_audit_events)),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

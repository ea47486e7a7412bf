// ============================================================================
// Error Handling - HTTP Error Responses
// ============================================================================
//
// Vendor and internal failures are logged server-side in full. Clients get a
// status code and a safe message; vendor business-rule messages and
// configuration problems are passed through because the caller can act on
// them.
//
// ============================================================================

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use crate::services::accounting::{ConnectorError, IntegrationError, SyncError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] JsonRejection),

    #[error("Integration error: {0}")]
    Integration(#[from] IntegrationError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Status, client message and optional remediation hint for a connector error.
fn connector_response(err: &ConnectorError) -> (StatusCode, String, Option<String>) {
    match err {
        ConnectorError::Authentication(_) => {
            tracing::warn!("Accounting system rejected credentials: {}", err);
            (
                StatusCode::BAD_GATEWAY,
                "Accounting system rejected the credentials".to_string(),
                None,
            )
        }
        ConnectorError::Configuration(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
        ConnectorError::Timeout(_) => {
            tracing::error!("Accounting system timeout: {}", err);
            (
                StatusCode::GATEWAY_TIMEOUT,
                "Accounting system did not respond".to_string(),
                None,
            )
        }
        ConnectorError::RateLimited(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Accounting system rate limit reached".to_string(),
            None,
        ),
        ConnectorError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            "Record not found in accounting system".to_string(),
            None,
        ),
        ConnectorError::UnsupportedOperation { .. } => {
            (StatusCode::NOT_IMPLEMENTED, err.to_string(), None)
        }
        ConnectorError::VendorBusinessRule {
            message,
            remediation,
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            message.clone(),
            remediation.clone(),
        ),
        ConnectorError::Network(_)
        | ConnectorError::Api { .. }
        | ConnectorError::InvalidResponse(_) => {
            tracing::error!("Accounting system error: {:?}", err);
            (
                StatusCode::BAD_GATEWAY,
                "Accounting system request failed".to_string(),
                None,
            )
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, remediation) = match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation failed".to_string(), None),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "Invalid JSON".to_string(), None),
            AppError::Integration(err) => match err {
                IntegrationError::NotYetImplemented(_) => {
                    (StatusCode::NOT_IMPLEMENTED, err.to_string(), None)
                }
                IntegrationError::UnknownConnector(_) => {
                    (StatusCode::BAD_REQUEST, err.to_string(), None)
                }
                IntegrationError::NotRegistered(_) => (StatusCode::NOT_FOUND, err.to_string(), None),
                IntegrationError::AlreadyRegistered(_) => {
                    (StatusCode::CONFLICT, err.to_string(), None)
                }
                IntegrationError::Sync(_) => (StatusCode::CONFLICT, err.to_string(), None),
                IntegrationError::SyncTask(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), None)
                }
                IntegrationError::Connector(ref inner) => connector_response(inner),
            },
            AppError::Connector(err) => connector_response(&err),
            AppError::Sync(err) => (StatusCode::CONFLICT, err.to_string(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let mut body = json!({
            "error": error_message,
            "status": status.as_u16()
        });
        if let Some(remediation) = remediation {
            body["remediation"] = json!(remediation);
        }

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                AppError::from(IntegrationError::NotRegistered("kro-1".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(SyncError::JobAlreadyRunning("kro-1".to_string())),
                StatusCode::CONFLICT,
            ),
            (
                AppError::from(ConnectorError::VendorBusinessRule {
                    message: "no".to_string(),
                    remediation: None,
                }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::from(ConnectorError::Api {
                    status: 500,
                    code: None,
                    message: "stack trace".to_string(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}

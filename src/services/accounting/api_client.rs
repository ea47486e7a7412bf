// Shared HTTP plumbing for the vendor connectors
// Rate gate, header merging, timeout and status classification live here so
// each connector only supplies paths, auth headers and mapping.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::models::ConnectorType;
use crate::services::accounting::connector::{ConnectorError, Result};
use crate::services::accounting::rate_limiter::RateLimiter;
use crate::utils::log_sanitizer::{mask_secret, sanitize_for_log};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ApiClient {
    connector: ConnectorType,
    base_url: String,
    http_client: Client,
    rate_limiter: RateLimiter,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(
        connector: ConnectorType,
        base_url: &str,
        requests_per_minute: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| {
            ConnectorError::Configuration(format!("invalid base URL '{}': {}", base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConnectorError::Configuration(format!(
                "base URL must be http(s): {}",
                base_url
            )));
        }

        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::Configuration(e.to_string()))?;

        Ok(Self {
            connector,
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
            rate_limiter: RateLimiter::per_minute(requests_per_minute),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn rate_limit(&self) -> u32 {
        self.rate_limiter.limit()
    }

    /// Sends one request through the rate gate.
    ///
    /// `auth_headers` are merged over `Content-Type: application/json`.
    /// Returns `None` for 204 responses and empty bodies.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        auth_headers: &[(&'static str, String)],
    ) -> Result<Option<Value>> {
        self.rate_limiter.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(
            connector = %self.connector,
            method = %method,
            path = %sanitize_for_log(path),
            "Accounting API request"
        );

        let mut request = self
            .http_client
            .request(method.clone(), &url)
            .headers(self.build_headers(auth_headers)?);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        self.parse_response(response).await
    }

    /// Like [`send`](Self::send), for endpoints that always answer with a body.
    pub async fn send_json(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        auth_headers: &[(&'static str, String)],
    ) -> Result<Value> {
        let label = format!("{} {}", method, sanitize_for_log(path));
        self.send(method, path, query, body, auth_headers)
            .await?
            .ok_or_else(|| ConnectorError::InvalidResponse(format!("{} returned no body", label)))
    }

    fn build_headers(&self, auth_headers: &[(&'static str, String)]) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in auth_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConnectorError::Configuration(format!("header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                ConnectorError::Configuration(format!(
                    "header {} has an invalid value {}",
                    name,
                    mask_secret(value)
                ))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn transport_error(&self, error: reqwest::Error) -> ConnectorError {
        if error.is_timeout() {
            ConnectorError::Timeout(format!(
                "{} did not respond within {}s",
                self.connector.display_name(),
                self.timeout.as_secs()
            ))
        } else {
            ConnectorError::Network(format!(
                "{} unreachable: {}",
                self.connector.display_name(),
                error
            ))
        }
    }

    async fn parse_response(&self, response: Response) -> Result<Option<Value>> {
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        if !status.is_success() {
            return Err(self.handle_error_response(response).await);
        }

        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ConnectorError::InvalidResponse(e.to_string()))
    }

    async fn handle_error_response(&self, response: Response) -> ConnectorError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let (code, message) = extract_vendor_error(&error_text);
        let message = message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

        tracing::debug!(
            connector = %self.connector,
            status = status.as_u16(),
            "Accounting API error: {}",
            sanitize_for_log(&message)
        );

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ConnectorError::Authentication(message)
            }
            StatusCode::NOT_FOUND => ConnectorError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited(message),
            _ => ConnectorError::Api {
                status: status.as_u16(),
                code,
                message,
            },
        }
    }
}

/// Pulls `code` and `message`/`error` out of a vendor JSON error body.
fn extract_vendor_error(body: &str) -> (Option<String>, Option<String>) {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        let trimmed = body.trim();
        return (None, (!trimmed.is_empty()).then(|| trimmed.to_string()));
    };

    let text = |value: Option<&Value>| -> Option<String> {
        match value? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    };

    let code = text(json.get("code")).or_else(|| text(json.get("errorCode")));
    let message = text(json.get("message"))
        .or_else(|| text(json.get("error")))
        .or_else(|| text(json.get("Message")));
    (code, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_vendor_error_fields() {
        let (code, message) =
            extract_vendor_error(r#"{"message":"Customer not found","code":"E404"}"#);
        assert_eq!(code.as_deref(), Some("E404"));
        assert_eq!(message.as_deref(), Some("Customer not found"));

        let (code, message) = extract_vendor_error(r#"{"error":{"message":"Invalid token"}}"#);
        assert_eq!(code, None);
        assert_eq!(message.as_deref(), Some("Invalid token"));

        let (_, message) = extract_vendor_error("Bad Gateway");
        assert_eq!(message.as_deref(), Some("Bad Gateway"));

        let (_, message) = extract_vendor_error("");
        assert_eq!(message, None);
    }

    #[test]
    fn test_invalid_base_url_is_configuration_error() {
        let result = ApiClient::new(ConnectorType::Billy, "not a url", 10, DEFAULT_TIMEOUT);
        assert!(matches!(result, Err(ConnectorError::Configuration(_))));

        let result = ApiClient::new(ConnectorType::Billy, "ftp://example.com", 10, DEFAULT_TIMEOUT);
        assert!(matches!(result, Err(ConnectorError::Configuration(_))));
    }

    #[test]
    fn test_invalid_auth_header_is_masked() {
        let client = ApiClient::new(
            ConnectorType::Billy,
            "https://api.billysbilling.com/v2",
            100,
            DEFAULT_TIMEOUT,
        )
        .unwrap();

        let result = client.build_headers(&[("X-Access-Token", "secret-token\nabcd".to_string())]);

        match result {
            Err(ConnectorError::Configuration(message)) => {
                assert!(message.ends_with("****abcd"), "{}", message);
                assert!(!message.contains("secret-token"));
            }
            other => panic!("expected configuration error, got {:?}", other.map(|h| h.len())),
        }
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = ApiClient::new(
            ConnectorType::Dinero,
            "https://api.dinero.dk/v1/",
            100,
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        assert_eq!(client.base_url(), "https://api.dinero.dk/v1");
        assert_eq!(client.rate_limit(), 100);
    }
}

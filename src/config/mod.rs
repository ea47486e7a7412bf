use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::env;
use std::time::Duration;

use crate::models::ConnectorType;
use crate::services::accounting::retry::{default_retry_delays, RetryPolicy, DEFAULT_MAX_ATTEMPTS};

/// Where bookings into a closed period are caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingPeriodCheck {
    /// Check `closedForInvoices` before booking and fail fast.
    Client,
    /// Leave it to the vendor to reject the booking.
    Vendor,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub enabled_connectors: BTreeSet<ConnectorType>,
    pub sync_max_attempts: u32,
    pub sync_retry_delays: Vec<Duration>,
    pub connector_timeout: Duration,
    pub booking_period_check: BookingPeriodCheck,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            cors_origins: vec!["http://localhost:3000".to_string()],
            enabled_connectors: BTreeSet::from([ConnectorType::Economic]),
            sync_max_attempts: DEFAULT_MAX_ATTEMPTS,
            sync_retry_delays: default_retry_delays(),
            connector_timeout: Duration::from_secs(30),
            booking_period_check: BookingPeriodCheck::Client,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let cors_origins = var("CORS_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_origins);

        let enabled_connectors = match var("INTEGRATIONS_ENABLED_CONNECTORS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|name| name.parse::<ConnectorType>().map_err(|e| anyhow!(e)))
                .collect::<Result<BTreeSet<_>>>()
                .context("INTEGRATIONS_ENABLED_CONNECTORS")?,
            None => defaults.enabled_connectors,
        };

        let sync_max_attempts = match var("SYNC_MAX_ATTEMPTS") {
            Some(value) => value.trim().parse().context("SYNC_MAX_ATTEMPTS must be a number")?,
            None => defaults.sync_max_attempts,
        };

        let sync_retry_delays = match var("SYNC_RETRY_DELAYS_MS") {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|ms| ms.parse::<u64>().map(Duration::from_millis))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("SYNC_RETRY_DELAYS_MS must be a comma separated list of milliseconds")?,
            None => defaults.sync_retry_delays,
        };

        let connector_timeout = match var("CONNECTOR_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(
                value.trim().parse().context("CONNECTOR_TIMEOUT_SECS must be a number")?,
            ),
            None => defaults.connector_timeout,
        };

        let booking_period_check = match var("BOOKING_PERIOD_CHECK").as_deref().map(str::trim) {
            None | Some("client") => BookingPeriodCheck::Client,
            Some("vendor") => BookingPeriodCheck::Vendor,
            Some(other) => return Err(anyhow!("BOOKING_PERIOD_CHECK must be client or vendor, got {}", other)),
        };

        Ok(Self {
            server_host: var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: var("SERVER_PORT")
                .and_then(|port| port.parse().ok())
                .unwrap_or(defaults.server_port),
            cors_origins,
            enabled_connectors,
            sync_max_attempts,
            sync_retry_delays,
            connector_timeout,
            booking_period_check,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.sync_max_attempts, self.sync_retry_delays.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_address(), "0.0.0.0:8080");
        assert_eq!(config.enabled_connectors, BTreeSet::from([ConnectorType::Economic]));
        assert_eq!(config.sync_max_attempts, 5);
        assert_eq!(config.sync_retry_delays.last(), Some(&Duration::from_secs(16)));
        assert_eq!(config.booking_period_check, BookingPeriodCheck::Client);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("SERVER_PORT", "9000"),
            ("INTEGRATIONS_ENABLED_CONNECTORS", "economic, dinero,visma.net"),
            ("SYNC_RETRY_DELAYS_MS", "10,20"),
            ("CONNECTOR_TIMEOUT_SECS", "5"),
            ("BOOKING_PERIOD_CHECK", "vendor"),
        ])
        .unwrap();

        assert_eq!(config.server_port, 9000);
        assert_eq!(config.enabled_connectors.len(), 3);
        assert!(config.enabled_connectors.contains(&ConnectorType::Visma));
        assert_eq!(config.retry_policy().delay_for(7), Duration::from_millis(20));
        assert_eq!(config.connector_timeout, Duration::from_secs(5));
        assert_eq!(config.booking_period_check, BookingPeriodCheck::Vendor);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(config_from(&[("INTEGRATIONS_ENABLED_CONNECTORS", "economic,quickbooks")]).is_err());
        assert!(config_from(&[("SYNC_RETRY_DELAYS_MS", "1000,soon")]).is_err());
        assert!(config_from(&[("BOOKING_PERIOD_CHECK", "sometimes")]).is_err());
    }
}

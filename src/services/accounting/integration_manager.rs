// Integration Manager
// Per-tenant registry of connected accounting systems and their sync engines.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ConnectorType, SyncJob};
use crate::services::accounting::billy_client::{BillyClient, BillyConfig};
use crate::services::accounting::connector::{
    AccountingConnector, CompanyInfo, ConnectorError, ConnectorSettings,
};
use crate::services::accounting::dinero_client::{DineroClient, DineroConfig};
use crate::services::accounting::economic_client::{EconomicClient, EconomicConfig};
use crate::services::accounting::retry::RetryPolicy;
use crate::services::accounting::storage::{MemoryStorage, SyncStorage};
use crate::services::accounting::sync_engine::{SyncEngine, SyncError, SyncOptions};
use crate::services::accounting::visma_client::{VismaClient, VismaConfig};
use crate::services::audit_service::AuditLogger;
use crate::utils::log_sanitizer::sanitize_for_log;

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("{0} connector is not yet available")]
    NotYetImplemented(String),

    #[error("Unknown connector type: {0}")]
    UnknownConnector(String),

    #[error("No accounting integration registered for company {0}")]
    NotRegistered(String),

    #[error("An accounting integration is already registered for company {0}")]
    AlreadyRegistered(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Sync task for company {0} did not complete")]
    SyncTask(String),
}

pub type Result<T> = std::result::Result<T, IntegrationError>;

/// Builds the storage adapter for a newly registered company.
pub type StorageFactory = Arc<dyn Fn(&str) -> Arc<dyn SyncStorage> + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub company_id: String,
    pub connector_type: ConnectorType,
    pub connected: bool,
    pub company: Option<CompanyInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Available,
    Planned,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorDescriptor {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub connector_type: ConnectorType,
    pub status: AvailabilityStatus,
    pub features: Vec<&'static str>,
}

fn connector_features(connector_type: ConnectorType) -> Vec<&'static str> {
    match connector_type {
        ConnectorType::Economic => vec![
            "customers",
            "products",
            "invoices",
            "payments",
            "accounts",
            "vat",
            "journals",
            "credit_notes",
        ],
        ConnectorType::Dinero | ConnectorType::Billy => vec!["customers", "products", "invoices"],
        ConnectorType::Visma => vec!["customers", "invoices"],
    }
}

struct Tenant {
    connector: Arc<dyn AccountingConnector>,
    engine: Arc<SyncEngine>,
}

pub struct IntegrationManager {
    tenants: DashMap<String, Tenant>,
    enabled: BTreeSet<ConnectorType>,
    audit: Arc<dyn AuditLogger>,
    storage_factory: StorageFactory,
    retry: RetryPolicy,
    default_timeout: Option<Duration>,
    check_locked_period: bool,
}

impl IntegrationManager {
    /// Only e-conomic enabled, in-memory storage per company.
    pub fn new(audit: Arc<dyn AuditLogger>) -> Self {
        Self {
            tenants: DashMap::new(),
            enabled: BTreeSet::from([ConnectorType::Economic]),
            audit,
            storage_factory: Arc::new(|_| Arc::new(MemoryStorage::new()) as Arc<dyn SyncStorage>),
            retry: RetryPolicy::default(),
            default_timeout: None,
            check_locked_period: true,
        }
    }

    pub fn with_enabled_connectors(mut self, enabled: impl IntoIterator<Item = ConnectorType>) -> Self {
        self.enabled = enabled.into_iter().collect();
        self
    }

    pub fn with_storage_factory(mut self, factory: StorageFactory) -> Self {
        self.storage_factory = factory;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Timeout for connectors whose settings do not set one.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_locked_period_check(mut self, enabled: bool) -> Self {
        self.check_locked_period = enabled;
        self
    }

    pub fn is_enabled(&self, connector_type: ConnectorType) -> bool {
        self.enabled.contains(&connector_type)
    }

    // ========================================================================
    // Connector Factory
    // ========================================================================

    /// Builds an unconnected connector. Disabled vendors are refused.
    pub fn create_connector(
        &self,
        connector_type: ConnectorType,
        settings: &ConnectorSettings,
    ) -> Result<Arc<dyn AccountingConnector>> {
        if !self.is_enabled(connector_type) {
            return Err(IntegrationError::NotYetImplemented(
                connector_type.display_name().to_string(),
            ));
        }

        let mut settings = settings.clone();
        if settings.timeout_secs.is_none() {
            settings.timeout_secs = self.default_timeout.map(|t| t.as_secs());
        }

        let connector: Arc<dyn AccountingConnector> = match connector_type {
            ConnectorType::Economic => {
                let mut config = EconomicConfig::from_settings(&settings)?;
                config.check_locked_period = self.check_locked_period;
                Arc::new(EconomicClient::new(config)?)
            }
            ConnectorType::Dinero => Arc::new(DineroClient::new(DineroConfig::from_settings(&settings)?)?),
            ConnectorType::Billy => Arc::new(BillyClient::new(BillyConfig::from_settings(&settings)?)?),
            ConnectorType::Visma => Arc::new(VismaClient::new(VismaConfig::from_settings(&settings)?)?),
        };
        Ok(connector)
    }

    /// Like [`create_connector`](Self::create_connector), from a vendor name
    /// such as `e-conomic` or `visma.net`.
    pub fn create_connector_by_name(
        &self,
        connector_name: &str,
        settings: &ConnectorSettings,
    ) -> Result<Arc<dyn AccountingConnector>> {
        let connector_type = connector_name
            .parse::<ConnectorType>()
            .map_err(|_| IntegrationError::UnknownConnector(connector_name.to_string()))?;
        self.create_connector(connector_type, settings)
    }

    // ========================================================================
    // Tenant Registry
    // ========================================================================

    /// Builds and connects a connector for `company_id` and pairs it with a
    /// sync engine.
    pub async fn register_connector(
        &self,
        company_id: &str,
        connector_type: ConnectorType,
        settings: &ConnectorSettings,
    ) -> Result<Registration> {
        if self.tenants.contains_key(company_id) {
            return Err(IntegrationError::AlreadyRegistered(company_id.to_string()));
        }

        let connector = self.create_connector(connector_type, settings)?;
        let company = connector.connect().await?;

        let storage = (self.storage_factory)(company_id);
        let engine = SyncEngine::new(connector.clone(), storage, self.audit.clone())
            .with_retry_policy(self.retry.clone());

        match self.tenants.entry(company_id.to_string()) {
            Entry::Occupied(_) => {
                connector.disconnect().await;
                return Err(IntegrationError::AlreadyRegistered(company_id.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(Tenant {
                    connector,
                    engine: Arc::new(engine),
                });
            }
        }

        tracing::info!(
            company_id = %sanitize_for_log(company_id),
            connector = %connector_type,
            "Accounting integration registered"
        );

        Ok(Registration {
            company_id: company_id.to_string(),
            connector_type,
            connected: true,
            company: Some(company),
        })
    }

    pub fn get_connector(&self, company_id: &str) -> Option<Arc<dyn AccountingConnector>> {
        self.tenants
            .get(company_id)
            .map(|tenant| tenant.connector.clone())
    }

    pub fn get_sync_engine(&self, company_id: &str) -> Option<Arc<SyncEngine>> {
        self.tenants.get(company_id).map(|tenant| tenant.engine.clone())
    }

    /// Disconnects and forgets the integration. Returns `false` when none was
    /// registered.
    pub async fn remove_connector(&self, company_id: &str) -> bool {
        let Some((_, tenant)) = self.tenants.remove(company_id) else {
            return false;
        };
        tenant.engine.cancel_job(company_id);
        tenant.connector.disconnect().await;

        tracing::info!(
            company_id = %sanitize_for_log(company_id),
            "Accounting integration removed"
        );
        true
    }

    /// Runs the job on its own task, so it completes even if the caller's
    /// future is dropped.
    pub async fn run_sync(&self, options: SyncOptions) -> Result<SyncJob> {
        let company_id = options.company_id.clone();
        let engine = self
            .get_sync_engine(&company_id)
            .ok_or_else(|| IntegrationError::NotRegistered(company_id.clone()))?;

        let task = tokio::spawn(async move { engine.run_sync(options).await });
        match task.await {
            Ok(job) => Ok(job?),
            Err(e) => {
                tracing::error!(
                    company_id = %sanitize_for_log(&company_id),
                    "Sync task failed: {}",
                    e
                );
                Err(IntegrationError::SyncTask(company_id))
            }
        }
    }

    /// Registered company ids with their connector types, sorted by company.
    pub fn registered_companies(&self) -> Vec<(String, ConnectorType)> {
        let mut companies: Vec<_> = self
            .tenants
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().connector.connector_type()))
            .collect();
        companies.sort();
        companies
    }

    pub fn available_connectors(&self) -> Vec<ConnectorDescriptor> {
        ConnectorType::ALL
            .iter()
            .map(|&connector_type| ConnectorDescriptor {
                name: connector_type.display_name(),
                connector_type,
                status: if self.is_enabled(connector_type) {
                    AvailabilityStatus::Available
                } else {
                    AvailabilityStatus::Planned
                },
                features: connector_features(connector_type),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::audit_service::MemoryAuditLogger;

    fn manager() -> IntegrationManager {
        IntegrationManager::new(Arc::new(MemoryAuditLogger::new()))
    }

    #[test]
    fn test_disabled_connector_not_yet_implemented() {
        let settings = ConnectorSettings::default().with_credential("apiToken", "tok");
        let result = manager().create_connector(ConnectorType::Billy, &settings);
        assert!(matches!(result, Err(IntegrationError::NotYetImplemented(name)) if name == "Billy"));
    }

    #[test]
    fn test_unknown_connector_name() {
        let result = manager().create_connector_by_name("quickbooks", &ConnectorSettings::default());
        assert!(matches!(result, Err(IntegrationError::UnknownConnector(_))));
    }

    #[test]
    fn test_missing_credentials_are_configuration_errors() {
        let result = manager().create_connector(ConnectorType::Economic, &ConnectorSettings::default());
        assert!(matches!(
            result,
            Err(IntegrationError::Connector(ConnectorError::Configuration(_)))
        ));
    }

    #[test]
    fn test_available_connectors_follow_feature_flag() {
        let manager = manager().with_enabled_connectors([ConnectorType::Economic, ConnectorType::Dinero]);
        let connectors = manager.available_connectors();

        assert_eq!(connectors.len(), 4);
        let status = |t: ConnectorType| {
            connectors
                .iter()
                .find(|c| c.connector_type == t)
                .map(|c| c.status)
        };
        assert_eq!(status(ConnectorType::Economic), Some(AvailabilityStatus::Available));
        assert_eq!(status(ConnectorType::Dinero), Some(AvailabilityStatus::Available));
        assert_eq!(status(ConnectorType::Visma), Some(AvailabilityStatus::Planned));
    }

    #[tokio::test]
    async fn test_unknown_company_lookups() {
        let manager = manager();
        assert!(manager.get_connector("nobody").is_none());
        assert!(manager.get_sync_engine("nobody").is_none());
        assert!(!manager.remove_connector("nobody").await);
        assert!(matches!(
            manager.run_sync(SyncOptions::new("nobody")).await,
            Err(IntegrationError::NotRegistered(_))
        ));
    }
}

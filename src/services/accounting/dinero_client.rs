// Dinero connector
// Bearer API key, every path scoped by organization id, page-number
// pagination starting at 0.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

use crate::models::{ConnectorType, Customer, Invoice, Product};
use crate::services::accounting::api_client::{ApiClient, DEFAULT_TIMEOUT};
use crate::services::accounting::connector::{
    AccountingConnector, CompanyInfo, ConnectionState, ConnectorError, ConnectorSettings, Created,
    ListOptions, Page, Result,
};
use crate::services::accounting::mappers::{self, dinero as mapper};

pub const DINERO_BASE_URL: &str = "https://api.dinero.dk/v1";
pub const DINERO_RATE_LIMIT: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct DineroConfig {
    pub api_key: String,
    pub organization_id: String,
    pub base_url: String,
    pub rate_limit_per_minute: u32,
    pub timeout: Duration,
}

impl DineroConfig {
    pub fn new(api_key: &str, organization_id: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            organization_id: organization_id.to_string(),
            base_url: DINERO_BASE_URL.to_string(),
            rate_limit_per_minute: DINERO_RATE_LIMIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &ConnectorSettings) -> Result<Self> {
        let vendor = ConnectorType::Dinero;
        let mut config = Self::new(
            &settings.require(vendor, "apiKey")?,
            &settings.require(vendor, "organizationId")?,
        );
        if let Some(base_url) = &settings.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(limit) = settings.rate_limit_per_minute {
            config.rate_limit_per_minute = limit;
        }
        if let Some(secs) = settings.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ConnectorError::Configuration(
                "apiKey is required for the Dinero connector".to_string(),
            ));
        }
        if self.organization_id.trim().is_empty() {
            return Err(ConnectorError::Configuration(
                "organizationId is required for the Dinero connector".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct DineroClient {
    config: DineroConfig,
    api: ApiClient,
    state: ConnectionState,
}

impl DineroClient {
    pub fn new(config: DineroConfig) -> Result<Self> {
        config.validate()?;

        let api = ApiClient::new(
            ConnectorType::Dinero,
            &config.base_url,
            config.rate_limit_per_minute,
            config.timeout,
        )?;

        Ok(Self {
            config,
            api,
            state: ConnectionState::default(),
        })
    }

    fn path(&self, resource: &str) -> String {
        format!("/{}/{}", self.config.organization_id, resource)
    }

    async fn fetch(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let auth = [("Authorization", format!("Bearer {}", self.config.api_key))];
        self.api
            .send_json(method, &self.path(resource), query, body, &auth)
            .await
    }

    async fn list_page<T>(
        &self,
        resource: &str,
        options: &ListOptions,
        extra: Option<(&'static str, String)>,
        map: impl Fn(&Value) -> T,
    ) -> Result<Page<T>> {
        let page = options.page_number(0)?;
        let page_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut query = vec![("page", page.to_string()), ("pageSize", page_size.to_string())];
        query.extend(extra);

        let response = self.fetch(Method::GET, resource, &query, None).await?;
        let data = mappers::array_field(&response, &["Collection"])
            .iter()
            .map(map)
            .collect();
        Ok(Page::numbered(data, page, page_size))
    }
}

#[async_trait]
impl AccountingConnector for DineroClient {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Dinero
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    async fn connect(&self) -> Result<CompanyInfo> {
        match self.fetch(Method::GET, "organizations", &[], None).await {
            Ok(response) => {
                let company = CompanyInfo {
                    name: mappers::str_field(&response, &["Name"])
                        .or_else(|| Some("Dinero".to_string())),
                    vat_number: mappers::str_field(&response, &["VatNumber"]),
                    org_number: Some(self.config.organization_id.clone()),
                };
                tracing::info!("Connected to Dinero organization");
                self.state.set_connected(company.clone());
                Ok(company)
            }
            Err(e) => {
                self.state.clear();
                tracing::warn!("Failed to connect to Dinero: {}", e);
                Err(e)
            }
        }
    }

    async fn disconnect(&self) {
        self.state.clear();
    }

    fn company_info(&self) -> Option<CompanyInfo> {
        self.state.company()
    }

    async fn list_customers(&self, options: &ListOptions) -> Result<Page<Customer>> {
        self.list_page("contacts", options, None, mapper::customer_to_canonical)
            .await
    }

    async fn get_customer(&self, id: &str) -> Result<Customer> {
        let response = self
            .fetch(Method::GET, &format!("contacts/{}", id), &[], None)
            .await?;
        Ok(mapper::customer_to_canonical(&response))
    }

    async fn create_customer(&self, customer: &Customer) -> Result<Created<Customer>> {
        let payload = mapper::customer_from_canonical(customer);
        let response = self
            .fetch(Method::POST, "contacts", &[], Some(&payload))
            .await?;
        let data = mapper::customer_to_canonical(&response);
        let external_id = mappers::id_field(&response, &["ContactGuid"]).unwrap_or_default();

        Ok(Created {
            id: customer.id,
            external_id,
            data,
        })
    }

    async fn list_products(&self, options: &ListOptions) -> Result<Page<Product>> {
        self.list_page("products", options, None, mapper::product_to_canonical)
            .await
    }

    async fn list_invoices(&self, options: &ListOptions) -> Result<Page<Invoice>> {
        let since = options
            .since
            .map(|since| ("startDate", since.format("%Y-%m-%d").to_string()));
        self.list_page("invoices", options, since, mapper::invoice_to_canonical)
            .await
    }

    async fn get_invoice(&self, id: &str) -> Result<Invoice> {
        let response = self
            .fetch(Method::GET, &format!("invoices/{}", id), &[], None)
            .await?;
        Ok(mapper::invoice_to_canonical(&response))
    }

    async fn create_invoice(&self, invoice: &Invoice) -> Result<Created<Invoice>> {
        let payload = mapper::invoice_from_canonical(invoice);
        let response = self
            .fetch(Method::POST, "invoices", &[], Some(&payload))
            .await?;
        let data = mapper::invoice_to_canonical(&response);
        let external_id = mappers::id_field(&response, &["Guid"]).unwrap_or_default();

        Ok(Created {
            id: invoice.id,
            external_id,
            data,
        })
    }
}

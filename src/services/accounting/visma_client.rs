// Visma.net connector
// Bearer token plus the ipp-company-id header, which is only known after
// connect. Lists are bare arrays with page-number pagination from 1.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

use crate::models::{ConnectorType, Customer, Invoice};
use crate::services::accounting::api_client::{ApiClient, DEFAULT_TIMEOUT};
use crate::services::accounting::connector::{
    AccountingConnector, CompanyInfo, ConnectionState, ConnectorError, ConnectorSettings, Created,
    ListOptions, Page, Result,
};
use crate::services::accounting::mappers::{self, visma as mapper};

pub const VISMA_BASE_URL: &str = "https://integration.visma.net/API";
pub const VISMA_RATE_LIMIT: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 100;
const API_PREFIX: &str = "/controller/api/v1";

#[derive(Debug, Clone)]
pub struct VismaConfig {
    pub bearer_token: String,
    pub base_url: String,
    pub rate_limit_per_minute: u32,
    pub timeout: Duration,
}

impl VismaConfig {
    pub fn new(bearer_token: &str) -> Self {
        Self {
            bearer_token: bearer_token.to_string(),
            base_url: VISMA_BASE_URL.to_string(),
            rate_limit_per_minute: VISMA_RATE_LIMIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &ConnectorSettings) -> Result<Self> {
        let mut config = Self::new(&settings.require(ConnectorType::Visma, "bearerToken")?);
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
        if self.bearer_token.trim().is_empty() {
            return Err(ConnectorError::Configuration(
                "bearerToken is required for the Visma.net connector".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct VismaClient {
    config: VismaConfig,
    api: ApiClient,
    state: ConnectionState,
}

impl VismaClient {
    pub fn new(config: VismaConfig) -> Result<Self> {
        config.validate()?;

        let api = ApiClient::new(
            ConnectorType::Visma,
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

    fn auth_headers(&self) -> [(&'static str, String); 2] {
        let company_id = self
            .state
            .company()
            .and_then(|company| company.org_number)
            .unwrap_or_default();
        [
            ("Authorization", format!("Bearer {}", self.config.bearer_token)),
            ("ipp-company-id", company_id),
        ]
    }

    async fn call(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let path = format!("{}/{}", API_PREFIX, resource);
        self.api
            .send(method, &path, query, body, &self.auth_headers())
            .await
    }

    async fn fetch(&self, method: Method, resource: &str, query: &[(&str, String)]) -> Result<Value> {
        let path = format!("{}/{}", API_PREFIX, resource);
        self.api
            .send_json(method, &path, query, None, &self.auth_headers())
            .await
    }

    async fn list_page<T>(
        &self,
        resource: &str,
        options: &ListOptions,
        map: impl Fn(&Value) -> T,
    ) -> Result<Page<T>> {
        let page = options.page_number(1)?;
        let page_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let query = [("pageNumber", page.to_string()), ("pageSize", page_size.to_string())];

        let response = self.fetch(Method::GET, resource, &query).await?;
        let data = response
            .as_array()
            .map(|items| items.iter().map(map).collect())
            .unwrap_or_default();
        Ok(Page::numbered(data, page, page_size))
    }
}

#[async_trait]
impl AccountingConnector for VismaClient {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Visma
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    async fn connect(&self) -> Result<CompanyInfo> {
        match self.fetch(Method::GET, "company", &[]).await {
            Ok(response) => {
                let company = CompanyInfo {
                    name: mappers::str_field(&response, &["name"]),
                    vat_number: mappers::str_field(&response, &["vatRegistrationId"]),
                    org_number: mappers::id_field(&response, &["number"]),
                };
                tracing::info!("Connected to Visma.net company");
                self.state.set_connected(company.clone());
                Ok(company)
            }
            Err(e) => {
                self.state.clear();
                tracing::warn!("Failed to connect to Visma.net: {}", e);
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
        self.list_page("customer", options, mapper::customer_to_canonical)
            .await
    }

    async fn get_customer(&self, id: &str) -> Result<Customer> {
        let response = self
            .fetch(Method::GET, &format!("customer/{}", id), &[])
            .await?;
        Ok(mapper::customer_to_canonical(&response))
    }

    /// Visma.net may answer a create with an empty body; the submitted record
    /// is returned in that case.
    async fn create_customer(&self, customer: &Customer) -> Result<Created<Customer>> {
        let payload = mapper::customer_from_canonical(customer);
        let data = match self
            .call(Method::POST, "customer", &[], Some(&payload))
            .await?
        {
            Some(response) => mapper::customer_to_canonical(&response),
            None => customer.clone(),
        };
        let external_id = data.customer_number.clone().unwrap_or_default();

        Ok(Created {
            id: customer.id,
            external_id,
            data,
        })
    }

    async fn list_invoices(&self, options: &ListOptions) -> Result<Page<Invoice>> {
        self.list_page("customerInvoice", options, mapper::invoice_to_canonical)
            .await
    }

    async fn create_invoice(&self, invoice: &Invoice) -> Result<Created<Invoice>> {
        let payload = mapper::invoice_from_canonical(invoice);
        let data = match self
            .call(Method::POST, "customerInvoice", &[], Some(&payload))
            .await?
        {
            Some(response) => mapper::invoice_to_canonical(&response),
            None => invoice.clone(),
        };
        let external_id = data.invoice_number.clone().unwrap_or_default();

        Ok(Created {
            id: invoice.id,
            external_id,
            data,
        })
    }
}

// Billy connector
// X-Access-Token auth. Billy returns whole collections, so every list is a
// single page. Write endpoints wrap the record and answer with an array.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

use crate::models::{ConnectorType, Customer, Invoice, Product};
use crate::services::accounting::api_client::{ApiClient, DEFAULT_TIMEOUT};
use crate::services::accounting::connector::{
    AccountingConnector, CompanyInfo, ConnectionState, ConnectorError, ConnectorSettings, Created,
    ListOptions, Page, Result,
};
use crate::services::accounting::mappers::{self, billy as mapper};

pub const BILLY_BASE_URL: &str = "https://api.billysbilling.com/v2";
pub const BILLY_RATE_LIMIT: u32 = 120;

#[derive(Debug, Clone)]
pub struct BillyConfig {
    pub api_token: String,
    pub base_url: String,
    pub rate_limit_per_minute: u32,
    pub timeout: Duration,
}

impl BillyConfig {
    pub fn new(api_token: &str) -> Self {
        Self {
            api_token: api_token.to_string(),
            base_url: BILLY_BASE_URL.to_string(),
            rate_limit_per_minute: BILLY_RATE_LIMIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &ConnectorSettings) -> Result<Self> {
        let mut config = Self::new(&settings.require(ConnectorType::Billy, "apiToken")?);
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
        if self.api_token.trim().is_empty() {
            return Err(ConnectorError::Configuration(
                "apiToken is required for the Billy connector".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct BillyClient {
    config: BillyConfig,
    api: ApiClient,
    state: ConnectionState,
}

impl BillyClient {
    pub fn new(config: BillyConfig) -> Result<Self> {
        config.validate()?;

        let api = ApiClient::new(
            ConnectorType::Billy,
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

    async fn fetch(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let auth = [("X-Access-Token", self.config.api_token.clone())];
        self.api.send_json(method, path, query, body, &auth).await
    }

    /// Single record from a `{ key: {...} }` envelope.
    fn unwrap_one<'a>(response: &'a Value, key: &str) -> Result<&'a Value> {
        response
            .get(key)
            .filter(|v| v.is_object())
            .ok_or_else(|| ConnectorError::InvalidResponse(format!("Billy response has no {}", key)))
    }

    /// First record of a `{ key: [...] }` envelope, as returned by creates.
    fn first_of<'a>(response: &'a Value, key: &str) -> Result<&'a Value> {
        mappers::array_field(response, &[key])
            .first()
            .ok_or_else(|| ConnectorError::InvalidResponse(format!("Billy response has no {}", key)))
    }
}

#[async_trait]
impl AccountingConnector for BillyClient {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Billy
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    async fn connect(&self) -> Result<CompanyInfo> {
        match self.fetch(Method::GET, "/organization", &[], None).await {
            Ok(response) => {
                let company = CompanyInfo {
                    name: mappers::str_field(&response, &["organization", "name"]),
                    vat_number: mappers::str_field(&response, &["organization", "registrationNo"]),
                    org_number: mappers::id_field(&response, &["organization", "id"]),
                };
                tracing::info!("Connected to Billy organization");
                self.state.set_connected(company.clone());
                Ok(company)
            }
            Err(e) => {
                self.state.clear();
                tracing::warn!("Failed to connect to Billy: {}", e);
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

    async fn list_customers(&self, _options: &ListOptions) -> Result<Page<Customer>> {
        let response = self
            .fetch(Method::GET, "/contacts", &[("isCustomer", "true".to_string())], None)
            .await?;
        Ok(Page::single(
            mappers::array_field(&response, &["contacts"])
                .iter()
                .map(mapper::customer_to_canonical)
                .collect(),
        ))
    }

    async fn get_customer(&self, id: &str) -> Result<Customer> {
        let response = self
            .fetch(Method::GET, &format!("/contacts/{}", id), &[], None)
            .await?;
        Ok(mapper::customer_to_canonical(Self::unwrap_one(&response, "contact")?))
    }

    async fn create_customer(&self, customer: &Customer) -> Result<Created<Customer>> {
        let payload = json!({ "contact": mapper::customer_from_canonical(customer) });
        let response = self
            .fetch(Method::POST, "/contacts", &[], Some(&payload))
            .await?;
        let created = Self::first_of(&response, "contacts")?;

        Ok(Created {
            id: customer.id,
            external_id: mappers::id_field(created, &["id"]).unwrap_or_default(),
            data: mapper::customer_to_canonical(created),
        })
    }

    async fn list_products(&self, _options: &ListOptions) -> Result<Page<Product>> {
        let response = self.fetch(Method::GET, "/products", &[], None).await?;
        Ok(Page::single(
            mappers::array_field(&response, &["products"])
                .iter()
                .map(mapper::product_to_canonical)
                .collect(),
        ))
    }

    async fn list_invoices(&self, options: &ListOptions) -> Result<Page<Invoice>> {
        let query: Vec<(&str, String)> = options
            .since
            .map(|since| ("createdAfter", since.format("%Y-%m-%d").to_string()))
            .into_iter()
            .collect();
        let response = self.fetch(Method::GET, "/invoices", &query, None).await?;
        Ok(Page::single(
            mappers::array_field(&response, &["invoices"])
                .iter()
                .map(mapper::invoice_to_canonical)
                .collect(),
        ))
    }

    async fn get_invoice(&self, id: &str) -> Result<Invoice> {
        let response = self
            .fetch(Method::GET, &format!("/invoices/{}", id), &[], None)
            .await?;
        Ok(mapper::invoice_to_canonical(Self::unwrap_one(&response, "invoice")?))
    }

    async fn create_invoice(&self, invoice: &Invoice) -> Result<Created<Invoice>> {
        let payload = json!({ "invoice": mapper::invoice_from_canonical(invoice) });
        let response = self
            .fetch(Method::POST, "/invoices", &[], Some(&payload))
            .await?;
        let created = Self::first_of(&response, "invoices")?;

        Ok(Created {
            id: invoice.id,
            external_id: mappers::id_field(created, &["id"]).unwrap_or_default(),
            data: mapper::invoice_to_canonical(created),
        })
    }
}

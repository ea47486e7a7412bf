// Accounting connector interface
// Every vendor connector implements AccountingConnector; operations a vendor
// does not offer fall through to the UnsupportedOperation defaults.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Account, ConnectorType, Customer, EntityType, Invoice, Payment, Product, SyncRecord, VatCode,
};

/// HTTP statuses treated as transient by the sync engine's retry loop.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum ConnectorError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{connector} does not support {operation}")]
    UnsupportedOperation { connector: String, operation: String },

    #[error("{message}")]
    VendorBusinessRule {
        message: String,
        remediation: Option<String>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ConnectorError {
    pub fn unsupported(connector: ConnectorType, operation: &str) -> Self {
        ConnectorError::UnsupportedOperation {
            connector: connector.to_string(),
            operation: operation.to_string(),
        }
    }

    /// HTTP status the error was derived from, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ConnectorError::Authentication(_) => Some(401),
            ConnectorError::RateLimited(_) => Some(429),
            ConnectorError::NotFound(_) => Some(404),
            ConnectorError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectorError::Network(_)
            | ConnectorError::Timeout(_)
            | ConnectorError::RateLimited(_) => true,
            ConnectorError::Api { status, .. } => RETRYABLE_STATUSES.contains(status),
            _ => false,
        }
    }

    /// Stable machine-readable code, recorded in sync job error entries.
    pub fn code(&self) -> &str {
        match self {
            ConnectorError::Authentication(_) => "AUTHENTICATION_ERROR",
            ConnectorError::Configuration(_) => "CONFIGURATION_ERROR",
            ConnectorError::Network(_) => "NETWORK_ERROR",
            ConnectorError::Timeout(_) => "TIMEOUT",
            ConnectorError::RateLimited(_) => "RATE_LIMITED",
            ConnectorError::Api { code, .. } => code.as_deref().unwrap_or("API_ERROR"),
            ConnectorError::NotFound(_) => "NOT_FOUND",
            ConnectorError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            ConnectorError::VendorBusinessRule { .. } => "VENDOR_BUSINESS_RULE",
            ConnectorError::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

// ============================================================================
// Operation Types
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Opaque continuation token returned by the previous page.
    pub cursor: Option<String>,
    /// Only records changed or created on or after this date, where the vendor supports it.
    pub since: Option<NaiveDate>,
    pub page_size: Option<u32>,
}

impl ListOptions {
    /// Page number carried in `cursor`, or `first` when starting over.
    pub fn page_number(&self, first: u32) -> Result<u32> {
        match self.cursor.as_deref() {
            Some(cursor) => cursor
                .parse()
                .map_err(|_| ConnectorError::InvalidResponse(format!("invalid page cursor: {}", cursor))),
            None => Ok(first),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub has_more: bool,
    pub cursor: Option<String>,
}

impl<T> Page<T> {
    /// A complete, unpaginated result.
    pub fn single(data: Vec<T>) -> Self {
        Self {
            data,
            has_more: false,
            cursor: None,
        }
    }

    /// Page-number pagination: a full page means there may be another.
    pub fn numbered(data: Vec<T>, page: u32, page_size: u32) -> Self {
        let has_more = page_size > 0 && data.len() == page_size as usize;
        Self {
            data,
            has_more,
            cursor: has_more.then(|| (page + 1).to_string()),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            has_more: self.has_more,
            cursor: self.cursor,
        }
    }
}

/// Result of a create call: the canonical id the caller supplied, the id the
/// vendor assigned, and the record as the vendor stored it.
#[derive(Debug, Clone)]
pub struct Created<T> {
    pub id: Uuid,
    pub external_id: String,
    pub data: T,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompanyInfo {
    pub name: Option<String>,
    pub vat_number: Option<String>,
    /// e-conomic agreement number, or the vendor's organization/company number.
    pub org_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub valid: bool,
    pub message: String,
    pub company: Option<CompanyInfo>,
}

/// Per-tenant connector settings as supplied at registration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectorSettings {
    /// Vendor credentials keyed by their vendor names, e.g. `appSecretToken`.
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    pub base_url: Option<String>,
    pub rate_limit_per_minute: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl ConnectorSettings {
    pub fn with_credential(mut self, key: &str, value: &str) -> Self {
        self.credentials.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    /// A non-empty credential, or a `Configuration` error naming the key.
    pub fn require(&self, connector: ConnectorType, key: &str) -> Result<String> {
        match self.credentials.get(key).map(|v| v.trim()) {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(ConnectorError::Configuration(format!(
                "{} is required for the {} connector",
                key,
                connector.display_name()
            ))),
        }
    }
}

// ============================================================================
// Connection State
// ============================================================================

/// Connected flag and cached company payload shared by all vendor clients.
#[derive(Debug, Default)]
pub struct ConnectionState {
    connected: AtomicBool,
    company: RwLock<Option<CompanyInfo>>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, company: CompanyInfo) {
        if let Ok(mut cached) = self.company.write() {
            *cached = Some(company);
        }
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut cached) = self.company.write() {
            *cached = None;
        }
    }

    pub fn company(&self) -> Option<CompanyInfo> {
        self.company.read().ok().and_then(|cached| cached.clone())
    }
}

// ============================================================================
// Connector Trait
// ============================================================================

#[async_trait]
pub trait AccountingConnector: Send + Sync {
    fn connector_type(&self) -> ConnectorType;

    fn is_connected(&self) -> bool;

    /// Validates credentials against the vendor and caches the company payload.
    async fn connect(&self) -> Result<CompanyInfo>;

    /// Clears connection state. No network traffic.
    async fn disconnect(&self);

    fn company_info(&self) -> Option<CompanyInfo>;

    /// Never fails; problems are reported through `valid = false`.
    async fn test_connection(&self) -> ConnectionTest {
        match self.connect().await {
            Ok(company) => ConnectionTest {
                valid: true,
                message: format!(
                    "Connected to {}",
                    company
                        .name
                        .as_deref()
                        .unwrap_or(self.connector_type().display_name())
                ),
                company: Some(company),
            },
            Err(e) => ConnectionTest {
                valid: false,
                message: e.to_string(),
                company: None,
            },
        }
    }

    fn unsupported(&self, operation: &str) -> ConnectorError {
        ConnectorError::unsupported(self.connector_type(), operation)
    }

    // ---- customers ----

    async fn list_customers(&self, _options: &ListOptions) -> Result<Page<Customer>> {
        Err(self.unsupported("list_customers"))
    }

    async fn get_customer(&self, _id: &str) -> Result<Customer> {
        Err(self.unsupported("get_customer"))
    }

    async fn create_customer(&self, _customer: &Customer) -> Result<Created<Customer>> {
        Err(self.unsupported("create_customer"))
    }

    async fn update_customer(&self, _id: &str, _customer: &Customer) -> Result<Customer> {
        Err(self.unsupported("update_customer"))
    }

    async fn delete_customer(&self, _id: &str) -> Result<bool> {
        Err(self.unsupported("delete_customer"))
    }

    // ---- products ----

    async fn list_products(&self, _options: &ListOptions) -> Result<Page<Product>> {
        Err(self.unsupported("list_products"))
    }

    async fn get_product(&self, _id: &str) -> Result<Product> {
        Err(self.unsupported("get_product"))
    }

    async fn create_product(&self, _product: &Product) -> Result<Created<Product>> {
        Err(self.unsupported("create_product"))
    }

    async fn update_product(&self, _id: &str, _product: &Product) -> Result<Product> {
        Err(self.unsupported("update_product"))
    }

    async fn delete_product(&self, _id: &str) -> Result<bool> {
        Err(self.unsupported("delete_product"))
    }

    // ---- invoices ----

    async fn list_invoices(&self, _options: &ListOptions) -> Result<Page<Invoice>> {
        Err(self.unsupported("list_invoices"))
    }

    async fn get_invoice(&self, _id: &str) -> Result<Invoice> {
        Err(self.unsupported("get_invoice"))
    }

    async fn create_invoice(&self, _invoice: &Invoice) -> Result<Created<Invoice>> {
        Err(self.unsupported("create_invoice"))
    }

    async fn update_invoice(&self, _id: &str, _invoice: &Invoice) -> Result<Invoice> {
        Err(self.unsupported("update_invoice"))
    }

    async fn delete_invoice(&self, _id: &str) -> Result<bool> {
        Err(self.unsupported("delete_invoice"))
    }

    /// Turns a draft into a booked invoice with a final invoice number.
    async fn book_invoice(&self, _draft_id: &str) -> Result<Invoice> {
        Err(self.unsupported("book_invoice"))
    }

    async fn void_invoice(&self, _id: &str, _reason: Option<&str>) -> Result<Invoice> {
        Err(self.unsupported("void_invoice"))
    }

    async fn create_credit_note(&self, _invoice_number: &str) -> Result<Invoice> {
        Err(self.unsupported("create_credit_note"))
    }

    /// Whether bookings dated `date` fall in a period closed for invoicing.
    async fn is_period_locked(&self, _date: NaiveDate) -> Result<bool> {
        Err(self.unsupported("is_period_locked"))
    }

    // ---- payments ----

    async fn list_payments(&self, _options: &ListOptions) -> Result<Page<Payment>> {
        Err(self.unsupported("list_payments"))
    }

    async fn get_payment(&self, _id: &str) -> Result<Payment> {
        Err(self.unsupported("get_payment"))
    }

    async fn create_payment(&self, _payment: &Payment) -> Result<Created<Payment>> {
        Err(self.unsupported("create_payment"))
    }

    async fn update_payment(&self, _id: &str, _payment: &Payment) -> Result<Payment> {
        Err(self.unsupported("update_payment"))
    }

    async fn delete_payment(&self, _id: &str) -> Result<bool> {
        Err(self.unsupported("delete_payment"))
    }

    // ---- accounts ----

    async fn list_accounts(&self, _options: &ListOptions) -> Result<Page<Account>> {
        Err(self.unsupported("list_accounts"))
    }

    async fn get_account(&self, _id: &str) -> Result<Account> {
        Err(self.unsupported("get_account"))
    }

    async fn create_account(&self, _account: &Account) -> Result<Created<Account>> {
        Err(self.unsupported("create_account"))
    }

    async fn update_account(&self, _id: &str, _account: &Account) -> Result<Account> {
        Err(self.unsupported("update_account"))
    }

    async fn delete_account(&self, _id: &str) -> Result<bool> {
        Err(self.unsupported("delete_account"))
    }

    // ---- VAT codes ----

    async fn list_vat_codes(&self, _options: &ListOptions) -> Result<Page<VatCode>> {
        Err(self.unsupported("list_vat_codes"))
    }

    async fn get_vat_code(&self, _id: &str) -> Result<VatCode> {
        Err(self.unsupported("get_vat_code"))
    }

    async fn create_vat_code(&self, _vat_code: &VatCode) -> Result<Created<VatCode>> {
        Err(self.unsupported("create_vat_code"))
    }

    async fn update_vat_code(&self, _id: &str, _vat_code: &VatCode) -> Result<VatCode> {
        Err(self.unsupported("update_vat_code"))
    }

    async fn delete_vat_code(&self, _id: &str) -> Result<bool> {
        Err(self.unsupported("delete_vat_code"))
    }
}

// ============================================================================
// Entity-generic dispatch
// ============================================================================

fn created_record<T: Into<SyncRecord>>(created: Created<T>) -> Created<SyncRecord> {
    Created {
        id: created.id,
        external_id: created.external_id,
        data: created.data.into(),
    }
}

/// Lists one page of any entity type as `SyncRecord`s.
pub async fn list_records(
    connector: &dyn AccountingConnector,
    entity_type: EntityType,
    options: &ListOptions,
) -> Result<Page<SyncRecord>> {
    Ok(match entity_type {
        EntityType::Customer => connector.list_customers(options).await?.map(SyncRecord::from),
        EntityType::Product => connector.list_products(options).await?.map(SyncRecord::from),
        EntityType::Invoice => connector.list_invoices(options).await?.map(SyncRecord::from),
        EntityType::Payment => connector.list_payments(options).await?.map(SyncRecord::from),
        EntityType::Account => connector.list_accounts(options).await?.map(SyncRecord::from),
        EntityType::VatCode => connector.list_vat_codes(options).await?.map(SyncRecord::from),
    })
}

pub async fn create_record(
    connector: &dyn AccountingConnector,
    record: &SyncRecord,
) -> Result<Created<SyncRecord>> {
    Ok(match record {
        SyncRecord::Customer(c) => created_record(connector.create_customer(c).await?),
        SyncRecord::Product(p) => created_record(connector.create_product(p).await?),
        SyncRecord::Invoice(i) => created_record(connector.create_invoice(i).await?),
        SyncRecord::Payment(p) => created_record(connector.create_payment(p).await?),
        SyncRecord::Account(a) => created_record(connector.create_account(a).await?),
        SyncRecord::VatCode(v) => created_record(connector.create_vat_code(v).await?),
    })
}

pub async fn update_record(
    connector: &dyn AccountingConnector,
    external_id: &str,
    record: &SyncRecord,
) -> Result<SyncRecord> {
    Ok(match record {
        SyncRecord::Customer(c) => connector.update_customer(external_id, c).await?.into(),
        SyncRecord::Product(p) => connector.update_product(external_id, p).await?.into(),
        SyncRecord::Invoice(i) => connector.update_invoice(external_id, i).await?.into(),
        SyncRecord::Payment(p) => connector.update_payment(external_id, p).await?.into(),
        SyncRecord::Account(a) => connector.update_account(external_id, a).await?.into(),
        SyncRecord::VatCode(v) => connector.update_vat_code(external_id, v).await?.into(),
    })
}

pub async fn delete_record(
    connector: &dyn AccountingConnector,
    entity_type: EntityType,
    external_id: &str,
) -> Result<bool> {
    match entity_type {
        EntityType::Customer => connector.delete_customer(external_id).await,
        EntityType::Product => connector.delete_product(external_id).await,
        EntityType::Invoice => connector.delete_invoice(external_id).await,
        EntityType::Payment => connector.delete_payment(external_id).await,
        EntityType::Account => connector.delete_account(external_id).await,
        EntityType::VatCode => connector.delete_vat_code(external_id).await,
    }
}

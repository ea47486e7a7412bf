// e-conomic REST connector
// Token-header auth (app secret + agreement grant), skippages pagination,
// drafts/booked invoice split. Booked invoices are immutable: corrections go
// through credit notes.

use async_trait::async_trait;
use base64::Engine;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::models::{
    Account, ConnectorType, Customer, Invoice, InvoiceStatus, JournalEntry, Payment, Product,
    VatCode,
};
use crate::services::accounting::api_client::{ApiClient, DEFAULT_TIMEOUT};
use crate::services::accounting::connector::{
    AccountingConnector, CompanyInfo, ConnectionState, ConnectorError, ConnectorSettings, Created,
    ListOptions, Page, Result,
};
use crate::services::accounting::mappers::{self, economic as mapper};
use crate::utils::log_sanitizer::{sanitize_for_log, sanitize_option_for_log};

pub const ECONOMIC_BASE_URL: &str = "https://restapi.e-conomic.com";
pub const ECONOMIC_RATE_LIMIT: u32 = 300;
const DEFAULT_PAGE_SIZE: u32 = 1000;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct EconomicConfig {
    pub app_secret_token: String,
    pub agreement_grant_token: String,
    pub base_url: String,
    pub rate_limit_per_minute: u32,
    pub timeout: Duration,
    /// Refuse to book drafts dated inside a period closed for invoicing.
    pub check_locked_period: bool,
}

impl EconomicConfig {
    pub fn new(app_secret_token: &str, agreement_grant_token: &str) -> Self {
        Self {
            app_secret_token: app_secret_token.to_string(),
            agreement_grant_token: agreement_grant_token.to_string(),
            base_url: ECONOMIC_BASE_URL.to_string(),
            rate_limit_per_minute: ECONOMIC_RATE_LIMIT,
            timeout: DEFAULT_TIMEOUT,
            check_locked_period: true,
        }
    }

    pub fn from_settings(settings: &ConnectorSettings) -> Result<Self> {
        let vendor = ConnectorType::Economic;
        let mut config = Self::new(
            &settings.require(vendor, "appSecretToken")?,
            &settings.require(vendor, "agreementGrantToken")?,
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
        if self.app_secret_token.trim().is_empty() {
            return Err(ConnectorError::Configuration(
                "appSecretToken is required for the e-conomic connector".to_string(),
            ));
        }
        if self.agreement_grant_token.trim().is_empty() {
            return Err(ConnectorError::Configuration(
                "agreementGrantToken is required for the e-conomic connector".to_string(),
            ));
        }
        if self.base_url.is_empty() {
            return Err(ConnectorError::Configuration("base_url is required".to_string()));
        }
        Ok(())
    }
}

/// Decoded invoice PDF.
#[derive(Debug, Clone, Serialize)]
pub struct InvoicePdf {
    pub filename: String,
    #[serde(skip)]
    pub content: Vec<u8>,
}

// ============================================================================
// Client
// ============================================================================

pub struct EconomicClient {
    config: EconomicConfig,
    api: ApiClient,
    state: ConnectionState,
}

impl EconomicClient {
    pub fn new(config: EconomicConfig) -> Result<Self> {
        config.validate()?;

        let api = ApiClient::new(
            ConnectorType::Economic,
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
        [
            ("X-AppSecretToken", self.config.app_secret_token.clone()),
            ("X-AgreementGrantToken", self.config.agreement_grant_token.clone()),
        ]
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        self.api
            .send(method, path, query, body, &self.auth_headers())
            .await
    }

    async fn fetch(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        self.api
            .send_json(method, path, query, body, &self.auth_headers())
            .await
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.fetch(Method::GET, path, query, None).await
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    /// `cursor` holds the number of pages to skip.
    fn page_query(options: &ListOptions) -> Result<Vec<(&'static str, String)>> {
        let skip_pages = options.page_number(0)?;
        Ok(vec![
            ("pagesize", options.page_size.unwrap_or(DEFAULT_PAGE_SIZE).to_string()),
            ("skippages", skip_pages.to_string()),
        ])
    }

    fn since_filter(options: &ListOptions) -> Option<(&'static str, String)> {
        options
            .since
            .map(|since| ("filter", format!("date$gte:{}", since.format("%Y-%m-%d"))))
    }

    fn to_page<T>(response: &Value, map: impl Fn(&Value) -> T) -> Page<T> {
        let data = mappers::array_field(response, &["collection"])
            .iter()
            .map(map)
            .collect();

        let has_more = response
            .pointer("/pagination/nextPage")
            .map_or(false, |next| !next.is_null());
        let cursor = if has_more {
            let skipped = response
                .pointer("/pagination/skipPages")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Some((skipped + 1).to_string())
        } else {
            None
        };

        Page {
            data,
            has_more,
            cursor,
        }
    }

    fn require_customer_number<'a>(customer_id: Option<&'a str>, what: &str) -> Result<&'a str> {
        customer_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ConnectorError::VendorBusinessRule {
                message: format!("customerNumber is required to create {} in e-conomic", what),
                remediation: Some("Sync the customer to e-conomic first".to_string()),
            })
    }

    // ========================================================================
    // e-conomic specific operations
    // ========================================================================

    pub async fn list_draft_invoices(&self, options: &ListOptions) -> Result<Page<Invoice>> {
        let response = self.get("/invoices/drafts", &Self::page_query(options)?).await?;
        let as_of = Self::today();
        Ok(Self::to_page(&response, |draft| {
            let mut invoice = mapper::invoice_to_canonical(draft, as_of);
            invoice.status = InvoiceStatus::Draft;
            invoice
        }))
    }

    pub async fn get_draft_invoice(&self, draft_number: &str) -> Result<Invoice> {
        let response = self
            .get(&format!("/invoices/drafts/{}", draft_number), &[])
            .await?;
        let mut invoice = mapper::invoice_to_canonical(&response, Self::today());
        invoice.status = InvoiceStatus::Draft;
        Ok(invoice)
    }

    pub async fn search_customers(&self, query: &str) -> Result<Page<Customer>> {
        let mut params = Self::page_query(&ListOptions::default())?;
        params.push(("filter", format!("name$like:{}", query)));
        let response = self.get("/customers", &params).await?;
        Ok(Self::to_page(&response, mapper::customer_to_canonical))
    }

    pub async fn list_vat_zones(&self) -> Result<Vec<Value>> {
        let response = self.get("/vat-zones", &[]).await?;
        Ok(mappers::array_field(&response, &["collection"]).to_vec())
    }

    pub async fn list_journals(&self) -> Result<Vec<Value>> {
        let response = self.get("/journals-experimental", &[]).await?;
        Ok(mappers::array_field(&response, &["collection"]).to_vec())
    }

    pub async fn list_journal_vouchers(
        &self,
        journal_number: &str,
        options: &ListOptions,
    ) -> Result<Page<JournalEntry>> {
        let response = self
            .get(
                &format!("/journals-experimental/{}/vouchers", journal_number),
                &Self::page_query(options)?,
            )
            .await?;
        Ok(Self::to_page(&response, mapper::voucher_to_canonical))
    }

    /// Posts a manual voucher. Unbalanced entries are rejected locally.
    pub async fn create_journal_voucher(
        &self,
        journal_number: &str,
        entry: &JournalEntry,
    ) -> Result<Created<JournalEntry>> {
        if let Err(errors) = entry.validate_balanced() {
            return Err(ConnectorError::VendorBusinessRule {
                message: format!("Journal entry is not balanced: {}", errors),
                remediation: Some("Make total debit equal total credit".to_string()),
            });
        }

        let payload = mapper::voucher_from_canonical(entry);
        let response = self
            .fetch(
                Method::POST,
                &format!("/journals-experimental/{}/vouchers", journal_number),
                &[],
                Some(&payload),
            )
            .await?;

        // The endpoint answers with an array of created vouchers.
        let created = match &response {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        let mut data = mapper::voucher_to_canonical(&created);
        let external_id = data.entry_number.clone().unwrap_or_default();
        data.id = entry.id;
        data.journal_number = Some(journal_number.to_string());

        Ok(Created {
            id: entry.id,
            external_id,
            data,
        })
    }

    pub async fn get_invoice_pdf(&self, invoice_number: &str) -> Result<InvoicePdf> {
        let response = self
            .get(&format!("/invoices/booked/{}/pdf", invoice_number), &[])
            .await?;
        let encoded = response
            .get("pdf")
            .and_then(Value::as_str)
            .ok_or_else(|| ConnectorError::InvalidResponse("PDF payload missing".to_string()))?;
        let content = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| ConnectorError::InvalidResponse(format!("PDF is not base64: {}", e)))?;

        Ok(InvoicePdf {
            filename: format!("invoice-{}.pdf", invoice_number),
            content,
        })
    }

    pub async fn send_invoice_email(&self, invoice_number: &str, email: &str) -> Result<bool> {
        self.call(
            Method::POST,
            &format!("/invoices/booked/{}/send", invoice_number),
            &[],
            Some(&json!({ "sendTo": email })),
        )
        .await?;
        Ok(true)
    }

    pub async fn next_customer_number(&self) -> Result<i64> {
        let response = self
            .get(
                "/customers",
                &[("pagesize", "1".to_string()), ("sort", "-customerNumber".to_string())],
            )
            .await?;
        Ok(response
            .pointer("/collection/0/customerNumber")
            .and_then(Value::as_i64)
            .map_or(1, |last| last + 1))
    }

    pub async fn next_invoice_number(&self) -> Result<i64> {
        let response = self
            .get(
                "/invoices/booked",
                &[
                    ("pagesize", "1".to_string()),
                    ("sort", "-bookedInvoiceNumber".to_string()),
                ],
            )
            .await?;
        Ok(response
            .pointer("/collection/0/bookedInvoiceNumber")
            .and_then(Value::as_i64)
            .map_or(1, |last| last + 1))
    }
}

#[async_trait]
impl AccountingConnector for EconomicClient {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Economic
    }

    fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    async fn connect(&self) -> Result<CompanyInfo> {
        match self.get("/self", &[]).await {
            Ok(response) => {
                let company = CompanyInfo {
                    name: mappers::str_field(&response, &["company", "name"]),
                    vat_number: mappers::str_field(&response, &["company", "vatNumber"]),
                    org_number: mappers::id_field(&response, &["agreementNumber"]),
                };
                tracing::info!(
                    "Connected to e-conomic agreement {}",
                    sanitize_option_for_log(company.org_number.as_deref())
                );
                self.state.set_connected(company.clone());
                Ok(company)
            }
            Err(e) => {
                self.state.clear();
                tracing::warn!("Failed to connect to e-conomic: {}", e);
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

    // ---- customers ----

    async fn list_customers(&self, options: &ListOptions) -> Result<Page<Customer>> {
        let response = self.get("/customers", &Self::page_query(options)?).await?;
        Ok(Self::to_page(&response, mapper::customer_to_canonical))
    }

    async fn get_customer(&self, id: &str) -> Result<Customer> {
        let response = self.get(&format!("/customers/{}", id), &[]).await?;
        Ok(mapper::customer_to_canonical(&response))
    }

    async fn create_customer(&self, customer: &Customer) -> Result<Created<Customer>> {
        let payload = mapper::customer_from_canonical(customer, None);
        let response = self
            .fetch(Method::POST, "/customers", &[], Some(&payload))
            .await?;
        let data = mapper::customer_to_canonical(&response);

        Ok(Created {
            id: customer.id,
            external_id: data.customer_number.clone().unwrap_or_default(),
            data,
        })
    }

    async fn update_customer(&self, id: &str, customer: &Customer) -> Result<Customer> {
        let path = format!("/customers/{}", id);
        let existing = self.get(&path, &[]).await?;
        let payload = mapper::customer_from_canonical(customer, Some(&existing));
        let response = self.fetch(Method::PUT, &path, &[], Some(&payload)).await?;
        Ok(mapper::customer_to_canonical(&response))
    }

    /// e-conomic never deletes customers; they are barred instead.
    async fn delete_customer(&self, id: &str) -> Result<bool> {
        self.call(
            Method::PUT,
            &format!("/customers/{}", id),
            &[],
            Some(&json!({ "barred": true })),
        )
        .await?;
        Ok(true)
    }

    // ---- products ----

    async fn list_products(&self, options: &ListOptions) -> Result<Page<Product>> {
        let response = self.get("/products", &Self::page_query(options)?).await?;
        Ok(Self::to_page(&response, mapper::product_to_canonical))
    }

    async fn get_product(&self, id: &str) -> Result<Product> {
        let response = self.get(&format!("/products/{}", id), &[]).await?;
        Ok(mapper::product_to_canonical(&response))
    }

    async fn create_product(&self, product: &Product) -> Result<Created<Product>> {
        let payload = mapper::product_from_canonical(product);
        let response = self
            .fetch(Method::POST, "/products", &[], Some(&payload))
            .await?;
        let data = mapper::product_to_canonical(&response);

        Ok(Created {
            id: product.id,
            external_id: data.product_number.clone().unwrap_or_default(),
            data,
        })
    }

    async fn update_product(&self, id: &str, product: &Product) -> Result<Product> {
        let payload = mapper::product_from_canonical(product);
        let response = self
            .fetch(Method::PUT, &format!("/products/{}", id), &[], Some(&payload))
            .await?;
        Ok(mapper::product_to_canonical(&response))
    }

    // ---- accounts & VAT ----

    async fn list_accounts(&self, options: &ListOptions) -> Result<Page<Account>> {
        let response = self.get("/accounts", &Self::page_query(options)?).await?;
        Ok(Self::to_page(&response, mapper::account_to_canonical))
    }

    async fn get_account(&self, id: &str) -> Result<Account> {
        let response = self.get(&format!("/accounts/{}", id), &[]).await?;
        Ok(mapper::account_to_canonical(&response))
    }

    async fn list_vat_codes(&self, options: &ListOptions) -> Result<Page<VatCode>> {
        let response = self.get("/vat-accounts", &Self::page_query(options)?).await?;
        Ok(Self::to_page(&response, mapper::vat_code_to_canonical))
    }

    // ---- invoices ----

    /// Booked invoices. `since` filters on invoice date.
    async fn list_invoices(&self, options: &ListOptions) -> Result<Page<Invoice>> {
        let mut query = Self::page_query(options)?;
        query.extend(Self::since_filter(options));

        let response = self.get("/invoices/booked", &query).await?;
        let as_of = Self::today();
        Ok(Self::to_page(&response, |invoice| {
            mapper::invoice_to_canonical(invoice, as_of)
        }))
    }

    async fn get_invoice(&self, id: &str) -> Result<Invoice> {
        let response = self.get(&format!("/invoices/booked/{}", id), &[]).await?;
        Ok(mapper::invoice_to_canonical(&response, Self::today()))
    }

    /// Creates a draft invoice against `invoice.customer_id` (an e-conomic
    /// customer number).
    async fn create_invoice(&self, invoice: &Invoice) -> Result<Created<Invoice>> {
        let customer_number = Self::require_customer_number(invoice.customer_id.as_deref(), "an invoice")?;
        let payload = mapper::invoice_from_canonical(invoice, customer_number);
        let response = self
            .fetch(Method::POST, "/invoices/drafts", &[], Some(&payload))
            .await?;

        let mut data = mapper::invoice_to_canonical(&response, Self::today());
        data.status = InvoiceStatus::Draft;
        let external_id = mappers::id_field(&response, &["draftInvoiceNumber"]).unwrap_or_default();

        Ok(Created {
            id: invoice.id,
            external_id,
            data,
        })
    }

    /// Updates a draft. Booked invoices cannot be changed.
    async fn update_invoice(&self, id: &str, invoice: &Invoice) -> Result<Invoice> {
        let customer_number = Self::require_customer_number(invoice.customer_id.as_deref(), "an invoice")?;
        let payload = mapper::invoice_from_canonical(invoice, customer_number);
        let response = self
            .fetch(Method::PUT, &format!("/invoices/drafts/{}", id), &[], Some(&payload))
            .await?;

        let mut data = mapper::invoice_to_canonical(&response, Self::today());
        data.status = InvoiceStatus::Draft;
        Ok(data)
    }

    async fn delete_invoice(&self, id: &str) -> Result<bool> {
        self.call(Method::DELETE, &format!("/invoices/drafts/{}", id), &[], None)
            .await?;
        Ok(true)
    }

    async fn book_invoice(&self, draft_id: &str) -> Result<Invoice> {
        if self.config.check_locked_period {
            let draft = self.get(&format!("/invoices/drafts/{}", draft_id), &[]).await?;
            if let Some(date) = mappers::date_field(&draft, &["date"]) {
                if self.is_period_locked(date).await? {
                    return Err(ConnectorError::VendorBusinessRule {
                        message: format!(
                            "Cannot book draft {}: {} falls in a period closed for invoicing",
                            draft_id, date
                        ),
                        remediation: Some(
                            "Change the invoice date or reopen the period in e-conomic".to_string(),
                        ),
                    });
                }
            }
        }

        let response = self
            .fetch(
                Method::POST,
                &format!("/invoices/drafts/{}/book", draft_id),
                &[],
                None,
            )
            .await?;
        Ok(mapper::invoice_to_canonical(&response, Self::today()))
    }

    async fn void_invoice(&self, _id: &str, _reason: Option<&str>) -> Result<Invoice> {
        Err(ConnectorError::VendorBusinessRule {
            message: "e-conomic does not support voiding booked invoices".to_string(),
            remediation: Some("Create a credit note instead using create_credit_note".to_string()),
        })
    }

    /// Books a credit note mirroring `invoice_number` with negated quantities.
    async fn create_credit_note(&self, invoice_number: &str) -> Result<Invoice> {
        let original = self
            .get(&format!("/invoices/booked/{}", invoice_number), &[])
            .await?;

        let mut credit_draft = original.clone();
        if let Some(lines) = credit_draft.get_mut("lines").and_then(Value::as_array_mut) {
            for line in lines.iter_mut() {
                let quantity = mappers::decimal_field(line, &["quantity"]).unwrap_or_default();
                line["quantity"] = mappers::decimal_to_json(-quantity.abs());
            }
        }
        credit_draft["references"] = json!({
            "other": format!("Kreditnota for faktura {}", invoice_number)
        });
        if let Some(fields) = credit_draft.as_object_mut() {
            for key in ["bookedInvoiceNumber", "pdf", "sent"] {
                fields.remove(key);
            }
        }

        let draft = self
            .fetch(Method::POST, "/invoices/drafts", &[], Some(&credit_draft))
            .await?;
        let draft_number = mappers::id_field(&draft, &["draftInvoiceNumber"]).ok_or_else(|| {
            ConnectorError::InvalidResponse("credit note draft has no draftInvoiceNumber".to_string())
        })?;

        let booked = self
            .fetch(
                Method::POST,
                &format!("/invoices/drafts/{}/book", draft_number),
                &[],
                None,
            )
            .await?;
        tracing::info!(
            "Booked credit note for e-conomic invoice {}",
            sanitize_for_log(invoice_number)
        );
        Ok(mapper::invoice_to_canonical(&booked, Self::today()))
    }

    /// `true` when `date` is on or before `settings.closedForInvoices`.
    async fn is_period_locked(&self, date: NaiveDate) -> Result<bool> {
        let response = self.get("/self", &[]).await?;
        Ok(mappers::date_field(&response, &["settings", "closedForInvoices"])
            .map_or(false, |closed| date <= closed))
    }

    // ---- payments ----

    async fn list_payments(&self, options: &ListOptions) -> Result<Page<Payment>> {
        let response = self
            .get("/customer-payments", &Self::page_query(options)?)
            .await?;
        Ok(Self::to_page(&response, mapper::payment_to_canonical))
    }

    async fn create_payment(&self, payment: &Payment) -> Result<Created<Payment>> {
        let customer_number = Self::require_customer_number(payment.customer_id.as_deref(), "a payment")?;
        let payload = mapper::payment_from_canonical(payment, customer_number);
        let response = self
            .fetch(Method::POST, "/customer-payments", &[], Some(&payload))
            .await?;
        let data = mapper::payment_to_canonical(&response);

        Ok(Created {
            id: payment.id,
            external_id: data.payment_number.clone().unwrap_or_default(),
            data,
        })
    }
}

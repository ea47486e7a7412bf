// Mock accounting systems for integration tests.
// Each mock binds 127.0.0.1:0 and records every request it sees.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, RwLock};

use orderflow_integrations::models::{ConnectorType, Customer, Invoice, SyncRecord};
use orderflow_integrations::services::accounting::connector::{
    AccountingConnector, CompanyInfo, ConnectorError, Created, ListOptions, Page,
};

type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

pub const ECONOMIC_SECRET: &str = "demo-secret";
pub const ECONOMIC_GRANT: &str = "demo-grant";
pub const VENDOR_TOKEN: &str = "vendor-token";

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    format!("http://{}", addr)
}

fn header<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Invalid token" })),
    )
        .into_response()
}

// ============================================================================
// e-conomic
// ============================================================================

#[derive(Debug, Default)]
pub struct EconomicMockState {
    pub customers: Vec<Value>,
    /// Collection page size served regardless of the requested `pagesize`.
    pub page_size: usize,
    pub booked_invoices: HashMap<String, Value>,
    pub drafts: HashMap<String, Value>,
    pub next_draft_number: u64,
    pub closed_for_invoices: Option<String>,
    pub posted_drafts: Vec<Value>,
    pub requests: Vec<String>,
    /// Raw query strings, in request order.
    pub queries: Vec<String>,
    /// Statuses answered, in order, before normal handling resumes.
    pub injected_failures: VecDeque<u16>,
    /// Base64 payloads served from `/invoices/booked/:number/pdf`.
    pub pdfs: HashMap<String, String>,
    pub vouchers: Vec<Value>,
    pub sent_emails: Vec<(String, Value)>,
}

impl EconomicMockState {
    pub fn count(&self, method_and_path: &str) -> usize {
        self.requests
            .iter()
            .filter(|r| r.as_str() == method_and_path)
            .count()
    }
}

pub type SharedEconomic = Arc<RwLock<EconomicMockState>>;

pub fn economic_customer(number: u32, name: &str) -> Value {
    json!({
        "customerNumber": number,
        "name": name,
        "corporateIdentificationNumber": "12345678",
        "email": format!("kunde{}@example.dk", number),
        "currency": "DKK",
        "paymentTerms": { "daysOfCredit": 14 },
        "barred": false
    })
}

pub fn economic_booked_invoice(number: u32) -> Value {
    json!({
        "bookedInvoiceNumber": number,
        "date": "2024-03-01",
        "dueDate": "2099-03-15",
        "currency": "DKK",
        "netAmount": 200.0,
        "vatAmount": 50.0,
        "grossAmount": 250.0,
        "remainder": 250.0,
        "customer": { "customerNumber": 1 },
        "recipient": { "name": "Kroen ApS" },
        "pdf": { "download": "https://example.invalid/pdf" },
        "lines": [
            { "description": "Frokostbuffet", "quantity": 2, "unitNetPrice": 75.0 },
            { "description": "Kaffe", "quantity": 1, "unitNetPrice": 50.0 }
        ]
    })
}

async fn economic_guard(State(state): State<SharedEconomic>, req: Request, next: Next) -> Response {
    let authorized = header(&req, "X-AppSecretToken") == Some(ECONOMIC_SECRET)
        && header(&req, "X-AgreementGrantToken") == Some(ECONOMIC_GRANT);
    {
        let mut state = state.write().await;
        state
            .requests
            .push(format!("{} {}", req.method(), req.uri().path()));
        let query = req.uri().query().unwrap_or_default().to_string();
        state.queries.push(query);
        if let Some(status) = state.injected_failures.pop_front() {
            let status = StatusCode::from_u16(status).unwrap();
            return (status, Json(json!({ "message": "Injected failure" }))).into_response();
        }
    }
    if !authorized {
        return unauthorized();
    }
    next.run(req).await
}

async fn economic_self(State(state): State<SharedEconomic>) -> Json<Value> {
    let state = state.read().await;
    Json(json!({
        "agreementNumber": 123456,
        "company": { "name": "Kroen ApS", "vatNumber": "DK12345678" },
        "settings": { "closedForInvoices": state.closed_for_invoices }
    }))
}

#[derive(Debug, Deserialize)]
struct EconomicPageQuery {
    skippages: Option<usize>,
}

async fn economic_list_customers(
    State(state): State<SharedEconomic>,
    Query(query): Query<EconomicPageQuery>,
) -> Json<Value> {
    let state = state.read().await;
    let page = query.skippages.unwrap_or(0);
    let size = state.page_size.max(1);
    let items: Vec<Value> = state
        .customers
        .iter()
        .skip(page * size)
        .take(size)
        .cloned()
        .collect();
    let next_page = if (page + 1) * size < state.customers.len() {
        json!(format!("/customers?skippages={}", page + 1))
    } else {
        Value::Null
    };

    Json(json!({
        "collection": items,
        "pagination": {
            "skipPages": page,
            "pageSize": size,
            "results": state.customers.len(),
            "nextPage": next_page
        }
    }))
}

async fn economic_get_customer(
    State(state): State<SharedEconomic>,
    Path(number): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let state = state.read().await;
    state
        .customers
        .iter()
        .find(|c| c["customerNumber"].to_string() == number)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn economic_create_customer(
    State(state): State<SharedEconomic>,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.write().await;
    let number = state.customers.len() as u64 + 1;
    body["customerNumber"] = json!(number);
    state.customers.push(body.clone());
    (StatusCode::CREATED, Json(body))
}

async fn economic_update_customer(
    State(state): State<SharedEconomic>,
    Path(number): Path<String>,
    Json(mut body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let mut state = state.write().await;
    let existing = state
        .customers
        .iter_mut()
        .find(|c| c["customerNumber"].to_string() == number)
        .ok_or(StatusCode::NOT_FOUND)?;
    body["customerNumber"] = existing["customerNumber"].clone();
    *existing = body.clone();
    Ok(Json(body))
}

async fn economic_list_booked(State(state): State<SharedEconomic>) -> Json<Value> {
    let state = state.read().await;
    let invoices: Vec<Value> = state.booked_invoices.values().cloned().collect();
    Json(json!({
        "collection": invoices,
        "pagination": { "skipPages": 0, "nextPage": null }
    }))
}

async fn economic_get_booked(
    State(state): State<SharedEconomic>,
    Path(number): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let state = state.read().await;
    state
        .booked_invoices
        .get(&number)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn economic_create_draft(
    State(state): State<SharedEconomic>,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.write().await;
    state.posted_drafts.push(body.clone());
    state.next_draft_number += 1;
    let number = state.next_draft_number;
    body["draftInvoiceNumber"] = json!(number);
    state.drafts.insert(number.to_string(), body.clone());
    (StatusCode::CREATED, Json(body))
}

async fn economic_get_draft(
    State(state): State<SharedEconomic>,
    Path(number): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let state = state.read().await;
    state
        .drafts
        .get(&number)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn economic_delete_draft(
    State(state): State<SharedEconomic>,
    Path(number): Path<String>,
) -> StatusCode {
    let mut state = state.write().await;
    match state.drafts.remove(&number) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn economic_book_draft(
    State(state): State<SharedEconomic>,
    Path(number): Path<String>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let mut state = state.write().await;
    let mut draft = state.drafts.remove(&number).ok_or(StatusCode::NOT_FOUND)?;
    let booked_number = 1000 + number.parse::<u64>().unwrap_or(0);
    draft["bookedInvoiceNumber"] = json!(booked_number);
    state
        .booked_invoices
        .insert(booked_number.to_string(), draft.clone());
    Ok((StatusCode::CREATED, Json(draft)))
}

async fn economic_list_drafts(State(state): State<SharedEconomic>) -> Json<Value> {
    let state = state.read().await;
    let drafts: Vec<Value> = state.drafts.values().cloned().collect();
    Json(json!({ "collection": drafts, "pagination": { "nextPage": null } }))
}

async fn economic_invoice_pdf(
    State(state): State<SharedEconomic>,
    Path(number): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let state = state.read().await;
    state
        .pdfs
        .get(&number)
        .map(|pdf| Json(json!({ "pdf": pdf })))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn economic_send_invoice(
    State(state): State<SharedEconomic>,
    Path(number): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.write().await.sent_emails.push((number, body));
    Json(json!({ "sent": true }))
}

async fn economic_vat_zones() -> Json<Value> {
    Json(json!({
        "collection": [
            { "vatZoneNumber": 1, "name": "Domestic" },
            { "vatZoneNumber": 2, "name": "EU" },
            { "vatZoneNumber": 3, "name": "Abroad" }
        ]
    }))
}

async fn economic_journals() -> Json<Value> {
    Json(json!({ "collection": [{ "journalNumber": 1, "name": "Kassekladde" }] }))
}

async fn economic_list_vouchers(State(state): State<SharedEconomic>) -> Json<Value> {
    let state = state.read().await;
    Json(json!({ "collection": state.vouchers, "pagination": { "nextPage": null } }))
}

/// Answers with an array of the created vouchers.
async fn economic_create_voucher(
    State(state): State<SharedEconomic>,
    Path(journal): Path<String>,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.write().await;
    body["voucherNumber"] = json!(state.vouchers.len() + 1);
    body["journal"] = json!({ "journalNumber": journal.parse::<u64>().unwrap_or(0) });
    state.vouchers.push(body.clone());
    (StatusCode::CREATED, Json(json!([body])))
}

pub fn economic_router(state: SharedEconomic) -> Router {
    Router::new()
        .route("/self", get(economic_self))
        .route(
            "/customers",
            get(economic_list_customers).post(economic_create_customer),
        )
        .route(
            "/customers/:number",
            get(economic_get_customer).put(economic_update_customer),
        )
        .route("/invoices/booked", get(economic_list_booked))
        .route("/invoices/booked/:number", get(economic_get_booked))
        .route("/invoices/booked/:number/pdf", get(economic_invoice_pdf))
        .route("/invoices/booked/:number/send", post(economic_send_invoice))
        .route(
            "/invoices/drafts",
            get(economic_list_drafts).post(economic_create_draft),
        )
        .route(
            "/invoices/drafts/:number",
            get(economic_get_draft).delete(economic_delete_draft),
        )
        .route("/invoices/drafts/:number/book", post(economic_book_draft))
        .route("/vat-zones", get(economic_vat_zones))
        .route("/journals-experimental", get(economic_journals))
        .route(
            "/journals-experimental/:number/vouchers",
            get(economic_list_vouchers).post(economic_create_voucher),
        )
        .layer(middleware::from_fn_with_state(state.clone(), economic_guard))
        .with_state(state)
}

/// Starts an e-conomic mock holding `customers`, served `page_size` per page.
pub async fn start_economic(customers: Vec<Value>, page_size: usize) -> (String, SharedEconomic) {
    let state = Arc::new(RwLock::new(EconomicMockState {
        customers,
        page_size,
        ..Default::default()
    }));
    let url = serve(economic_router(state.clone())).await;
    (url, state)
}

// ============================================================================
// Dinero, Billy, Visma.net
// ============================================================================

#[derive(Debug, Default)]
pub struct VendorMockState {
    pub customers: Vec<Value>,
    /// `ipp-company-id` header seen on each request, empty when absent.
    pub company_headers: Vec<String>,
    pub requests: Vec<String>,
    pub created: Vec<Value>,
}

pub type SharedVendor = Arc<RwLock<VendorMockState>>;

async fn bearer_guard(State(state): State<SharedVendor>, req: Request, next: Next) -> Response {
    let authorized = header(&req, "Authorization") == Some(&format!("Bearer {}", VENDOR_TOKEN))
        || header(&req, "X-Access-Token") == Some(VENDOR_TOKEN);
    {
        let mut state = state.write().await;
        let uri = req.uri().to_string();
        state.requests.push(format!("{} {}", req.method(), uri));
        let company = header(&req, "ipp-company-id").unwrap_or_default().to_string();
        state.company_headers.push(company);
    }
    if !authorized {
        return unauthorized();
    }
    next.run(req).await
}

#[derive(Debug, Deserialize)]
struct DineroPageQuery {
    page: Option<usize>,
    #[serde(rename = "pageSize")]
    page_size: Option<usize>,
}

async fn dinero_organization() -> Json<Value> {
    Json(json!({ "Name": "Dinero Kro", "VatNumber": "DK87654321" }))
}

async fn dinero_list_contacts(
    State(state): State<SharedVendor>,
    Query(query): Query<DineroPageQuery>,
) -> Json<Value> {
    let state = state.read().await;
    let size = query.page_size.unwrap_or(100).max(1);
    let page = query.page.unwrap_or(0);
    let items: Vec<Value> = state
        .customers
        .iter()
        .skip(page * size)
        .take(size)
        .cloned()
        .collect();
    Json(json!({ "Collection": items, "Pagination": { "Page": page, "PageSize": size } }))
}

async fn dinero_create_contact(
    State(state): State<SharedVendor>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.write().await;
    state.created.push(body);
    (
        StatusCode::CREATED,
        Json(json!({ "ContactGuid": "9f1b2c3d-0000-4000-8000-000000000001" })),
    )
}

pub fn dinero_router(state: SharedVendor) -> Router {
    Router::new()
        .route("/:org/organizations", get(dinero_organization))
        .route(
            "/:org/contacts",
            get(dinero_list_contacts).post(dinero_create_contact),
        )
        .layer(middleware::from_fn_with_state(state.clone(), bearer_guard))
        .with_state(state)
}

async fn billy_organization() -> Json<Value> {
    Json(json!({
        "organization": { "id": "org-77", "name": "Billy Kro", "registrationNo": "11223344" }
    }))
}

async fn billy_list_contacts(State(state): State<SharedVendor>) -> Json<Value> {
    let state = state.read().await;
    Json(json!({ "contacts": state.customers }))
}

async fn billy_create_contact(
    State(state): State<SharedVendor>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut state = state.write().await;
    let mut contact = body["contact"].clone();
    contact["id"] = json!("billy-contact-1");
    state.created.push(body);
    state.customers.push(contact.clone());
    Json(json!({ "contacts": [contact] }))
}

async fn billy_get_contact(
    State(state): State<SharedVendor>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let state = state.read().await;
    state
        .customers
        .iter()
        .find(|c| c["id"] == json!(id))
        .map(|c| Json(json!({ "contact": c })))
        .ok_or(StatusCode::NOT_FOUND)
}

pub fn billy_router(state: SharedVendor) -> Router {
    Router::new()
        .route("/organization", get(billy_organization))
        .route("/contacts", get(billy_list_contacts).post(billy_create_contact))
        .route("/contacts/:id", get(billy_get_contact))
        .layer(middleware::from_fn_with_state(state.clone(), bearer_guard))
        .with_state(state)
}

async fn visma_company() -> Json<Value> {
    Json(json!({ "name": "Visma Kro", "number": "7654321", "vatRegistrationId": "DK55667788" }))
}

async fn visma_list_customers(State(state): State<SharedVendor>) -> Json<Value> {
    let state = state.read().await;
    Json(json!(state.customers))
}

async fn visma_create_customer(
    State(state): State<SharedVendor>,
    Json(body): Json<Value>,
) -> StatusCode {
    state.write().await.created.push(body);
    StatusCode::NO_CONTENT
}

pub fn visma_router(state: SharedVendor) -> Router {
    Router::new()
        .route("/controller/api/v1/company", get(visma_company))
        .route(
            "/controller/api/v1/customer",
            get(visma_list_customers).post(visma_create_customer),
        )
        .layer(middleware::from_fn_with_state(state.clone(), bearer_guard))
        .with_state(state)
}

pub async fn start_vendor(connector_type: ConnectorType, customers: Vec<Value>) -> (String, SharedVendor) {
    let state = Arc::new(RwLock::new(VendorMockState {
        customers,
        ..Default::default()
    }));
    let router = match connector_type {
        ConnectorType::Dinero => dinero_router(state.clone()),
        ConnectorType::Billy => billy_router(state.clone()),
        ConnectorType::Visma => visma_router(state.clone()),
        ConnectorType::Economic => panic!("use start_economic for e-conomic"),
    };
    let url = serve(router).await;
    (url, state)
}

// ============================================================================
// Scripted connector
// ============================================================================

/// In-process connector whose customer pages are scripted up front.
#[derive(Default)]
pub struct FakeConnector {
    connected: AtomicBool,
    fail_connect: bool,
    customer_pages: Mutex<VecDeque<ConnectorResult<Page<Customer>>>>,
    gate: Option<Arc<Notify>>,
    next_id: AtomicU32,
    pub connect_calls: AtomicU32,
    pub list_calls: AtomicU32,
    pub list_options: Mutex<Vec<ListOptions>>,
    pub created: Mutex<Vec<SyncRecord>>,
    pub updated: Mutex<Vec<(String, SyncRecord)>>,
    pub booked: Mutex<Vec<String>>,
    book_failures: Mutex<VecDeque<ConnectorError>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_connect() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    pub fn with_customer_page(self, page: ConnectorResult<Page<Customer>>) -> Self {
        self.customer_pages.lock().unwrap().push_back(page);
        self
    }

    /// Every customer list call waits for a `notify_one` on `gate`.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// The next `book_invoice` call fails with `error`.
    pub fn with_book_failure(self, error: ConnectorError) -> Self {
        self.book_failures.lock().unwrap().push_back(error);
        self
    }

    pub fn list_count(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn next_external_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

pub fn customers(count: usize) -> Vec<Customer> {
    (1..=count)
        .map(|n| {
            let mut customer = Customer::new(format!("Kunde {}", n));
            customer
                .external_ids
                .insert(ConnectorType::Economic, n.to_string());
            customer.customer_number = Some(n.to_string());
            customer
        })
        .collect()
}

#[async_trait]
impl AccountingConnector for FakeConnector {
    fn connector_type(&self) -> ConnectorType {
        ConnectorType::Economic
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> ConnectorResult<CompanyInfo> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(ConnectorError::Authentication("bad grant".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(CompanyInfo {
            name: Some("Kroen ApS".to_string()),
            ..Default::default()
        })
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn company_info(&self) -> Option<CompanyInfo> {
        None
    }

    async fn list_customers(&self, options: &ListOptions) -> ConnectorResult<Page<Customer>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.list_options.lock().unwrap().push(options.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self.customer_pages.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Page::single(Vec::new())))
    }

    async fn list_invoices(&self, _options: &ListOptions) -> ConnectorResult<Page<Invoice>> {
        Ok(Page::single(Vec::new()))
    }

    async fn create_customer(&self, customer: &Customer) -> ConnectorResult<Created<Customer>> {
        self.created.lock().unwrap().push(customer.clone().into());
        Ok(Created {
            id: customer.id,
            external_id: self.next_external_id("C"),
            data: customer.clone(),
        })
    }

    async fn update_customer(&self, id: &str, customer: &Customer) -> ConnectorResult<Customer> {
        self.updated
            .lock()
            .unwrap()
            .push((id.to_string(), customer.clone().into()));
        Ok(customer.clone())
    }

    async fn create_invoice(&self, invoice: &Invoice) -> ConnectorResult<Created<Invoice>> {
        self.created.lock().unwrap().push(invoice.clone().into());
        Ok(Created {
            id: invoice.id,
            external_id: self.next_external_id("D"),
            data: invoice.clone(),
        })
    }

    async fn book_invoice(&self, draft_id: &str) -> ConnectorResult<Invoice> {
        if let Some(error) = self.book_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.booked.lock().unwrap().push(draft_id.to_string());
        Ok(Invoice::new(None, Vec::new()))
    }
}

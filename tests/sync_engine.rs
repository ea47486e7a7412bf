// Sync engine behaviour with scripted connectors and storage.
// Run with: cargo test --test sync_engine

mod common;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use common::*;
use orderflow_integrations::models::{
    ConnectorType, Customer, EntityType, Invoice, InvoiceLine, SyncDirection, SyncRecord,
    SyncStatus,
};
use orderflow_integrations::services::accounting::connector::{ConnectorError, Page};
use orderflow_integrations::services::accounting::{
    ChangeAction, EconomicClient, EconomicConfig, MemoryStorage, PendingChange, ProgressKind,
    RetryPolicy, StorageError, SyncEngine, SyncError, SyncOptions, SyncProgress, SyncStorage,
};
use orderflow_integrations::services::audit_service::MemoryAuditLogger;
use rust_decimal_macros::dec;

const COMPANY: &str = "kro-1";

struct Harness {
    engine: Arc<SyncEngine>,
    connector: Arc<FakeConnector>,
    storage: Arc<MemoryStorage>,
    audit: Arc<MemoryAuditLogger>,
}

fn harness(connector: FakeConnector) -> Harness {
    let connector = Arc::new(connector);
    let storage = Arc::new(MemoryStorage::new());
    let audit = Arc::new(MemoryAuditLogger::new());
    let engine = SyncEngine::new(connector.clone(), storage.clone(), audit.clone())
        .with_retry_policy(RetryPolicy::none());
    Harness {
        engine: Arc::new(engine),
        connector,
        storage,
        audit,
    }
}

fn customer_options() -> SyncOptions {
    SyncOptions::new(COMPANY).entity_types(vec![EntityType::Customer])
}

/// Storage that fails the n-th upsert and delegates everything else.
struct FlakyStorage {
    inner: MemoryStorage,
    fail_on: usize,
    upserts: AtomicUsize,
}

#[async_trait]
impl SyncStorage for FlakyStorage {
    async fn upsert(&self, entity_type: EntityType, record: SyncRecord) -> Result<SyncRecord, StorageError> {
        let n = self.upserts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(StorageError::Unavailable("disk full".to_string()));
        }
        self.inner.upsert(entity_type, record).await
    }

    async fn get(&self, entity_type: EntityType, id: Uuid) -> Result<Option<SyncRecord>, StorageError> {
        self.inner.get(entity_type, id).await
    }

    async fn get_by_external_id(
        &self,
        entity_type: EntityType,
        connector: ConnectorType,
        external_id: &str,
    ) -> Result<Option<SyncRecord>, StorageError> {
        self.inner
            .get_by_external_id(entity_type, connector, external_id)
            .await
    }

    async fn get_pending_changes(
        &self,
        entity_type: EntityType,
        company_id: &str,
    ) -> Result<Vec<PendingChange>, StorageError> {
        self.inner.get_pending_changes(entity_type, company_id).await
    }

    async fn mark_synced(&self, entity_type: EntityType, change_id: Uuid) -> Result<(), StorageError> {
        self.inner.mark_synced(entity_type, change_id).await
    }
}

async fn wait_for_list_call(connector: &FakeConnector) {
    for _ in 0..200 {
        if connector.list_count() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("connector was never listed");
}

// ============================================================================
// Pull
// ============================================================================

#[tokio::test]
async fn test_pull_stores_every_customer() {
    let h = harness(FakeConnector::new().with_customer_page(Ok(Page::single(customers(4)))));

    let job = h.engine.run_sync(customer_options()).await.unwrap();

    assert_eq!(job.status, SyncStatus::Completed);
    assert_eq!(job.records_processed, 4);
    assert_eq!(job.records_succeeded, 4);
    assert_eq!(job.triggered_by.as_deref(), Some("manual"));
    assert!(job.completed_at.is_some());
    assert_eq!(h.storage.list(EntityType::Customer).len(), 4);
    assert!(!h.engine.is_job_running(COMPANY));
}

#[tokio::test]
async fn test_one_bad_record_makes_the_job_partial() {
    let connector = Arc::new(FakeConnector::new().with_customer_page(Ok(Page::single(customers(10)))));
    let storage = Arc::new(FlakyStorage {
        inner: MemoryStorage::new(),
        fail_on: 3,
        upserts: AtomicUsize::new(0),
    });
    let audit = Arc::new(MemoryAuditLogger::new());
    let engine = SyncEngine::new(connector, storage.clone(), audit);

    let job = engine.run_sync(customer_options()).await.unwrap();

    assert_eq!(job.status, SyncStatus::Partial);
    assert_eq!(job.records_processed, 10);
    assert_eq!(job.records_succeeded, 9);
    assert_eq!(job.records_failed, 1);
    assert_eq!(job.errors.len(), 1);
    let error = &job.errors[0];
    assert_eq!(error.error_code, "STORAGE_ERROR");
    assert_eq!(error.entity_id.as_deref(), Some("3"));
    assert_eq!(error.entity_type, Some(EntityType::Customer));
    assert_eq!(storage.inner.list(EntityType::Customer).len(), 9);
}

#[tokio::test]
async fn test_invalid_records_are_not_stored() {
    let mut records = customers(2);
    records[1].cvr = Some("12-AB".to_string());
    let h = harness(FakeConnector::new().with_customer_page(Ok(Page::single(records))));

    let job = h.engine.run_sync(customer_options()).await.unwrap();

    assert_eq!(job.status, SyncStatus::Partial);
    assert_eq!(job.errors[0].error_code, "VALIDATION_ERROR");
    assert!(!job.errors[0].retryable);
    assert_eq!(h.storage.list(EntityType::Customer).len(), 1);
}

#[tokio::test]
async fn test_cursor_pages_are_followed() {
    let mut first = customers(3);
    let second = first.split_off(2);
    let h = harness(
        FakeConnector::new()
            .with_customer_page(Ok(Page {
                data: first,
                has_more: true,
                cursor: Some("page-2".to_string()),
            }))
            .with_customer_page(Ok(Page::single(second))),
    );

    let job = h.engine.run_sync(customer_options()).await.unwrap();

    assert_eq!(job.records_succeeded, 3);
    assert_eq!(job.next_cursor.as_deref(), Some("page-2"));
    let options = h.connector.list_options.lock().unwrap();
    assert_eq!(options.len(), 2);
    assert_eq!(options[0].cursor, None);
    assert_eq!(options[1].cursor.as_deref(), Some("page-2"));
}

#[tokio::test]
async fn test_repeated_cursor_stops_the_entity() {
    let page = |n: usize| {
        Ok::<_, ConnectorError>(Page {
            data: customers(n).split_off(n - 1),
            has_more: true,
            cursor: Some("same".to_string()),
        })
    };
    let h = harness(
        FakeConnector::new()
            .with_customer_page(page(1))
            .with_customer_page(page(2))
            .with_customer_page(page(3)),
    );

    let job = h.engine.run_sync(customer_options()).await.unwrap();

    assert_eq!(h.connector.list_count(), 2);
    assert_eq!(job.status, SyncStatus::Partial);
    assert_eq!(job.records_succeeded, 2);
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].error_code, "PAGINATION_LOOP");
}

#[tokio::test]
async fn test_more_pages_without_cursor_stops_the_entity() {
    let h = harness(FakeConnector::new().with_customer_page(Ok(Page {
        data: customers(1),
        has_more: true,
        cursor: None,
    })));

    let job = h.engine.run_sync(customer_options()).await.unwrap();

    assert_eq!(h.connector.list_count(), 1);
    assert_eq!(job.errors[0].error_code, "PAGINATION_LOOP");
}

#[tokio::test]
async fn test_full_sync_ignores_since() {
    let since = NaiveDate::from_ymd_opt(2024, 1, 1);

    let h = harness(FakeConnector::new());
    h.engine
        .run_sync(customer_options().since(since).full_sync(true))
        .await
        .unwrap();
    h.engine
        .run_sync(customer_options().since(since))
        .await
        .unwrap();

    let options = h.connector.list_options.lock().unwrap();
    assert_eq!(options[0].since, None);
    assert_eq!(options[1].since, since);
}

#[tokio::test]
async fn test_entity_failure_does_not_stop_later_entities() {
    let h = harness(FakeConnector::new().with_customer_page(Err(ConnectorError::Authentication(
        "grant revoked".to_string(),
    ))));
    let options = SyncOptions::new(COMPANY)
        .entity_types(vec![EntityType::Customer, EntityType::Product, EntityType::Invoice]);

    let job = h.engine.run_sync(options).await.unwrap();

    assert_eq!(job.status, SyncStatus::Failed);
    let codes: Vec<&str> = job.errors.iter().map(|e| e.error_code.as_str()).collect();
    assert_eq!(codes, vec!["AUTHENTICATION_ERROR", "UNSUPPORTED_OPERATION"]);
    assert_eq!(job.records_failed, 2);
    assert_eq!(job.records_processed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_list_failures_are_retried_with_backoff() {
    let unavailable = || -> Result<Page<Customer>, ConnectorError> {
        Err(ConnectorError::Api {
            status: 503,
            code: None,
            message: "maintenance".to_string(),
        })
    };
    let connector = Arc::new(
        FakeConnector::new()
            .with_customer_page(unavailable())
            .with_customer_page(unavailable())
            .with_customer_page(unavailable())
            .with_customer_page(unavailable())
            .with_customer_page(Ok(Page::single(customers(2)))),
    );
    let engine = SyncEngine::new(
        connector.clone(),
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryAuditLogger::new()),
    );

    let started = tokio::time::Instant::now();
    let job = engine.run_sync(customer_options()).await.unwrap();

    assert_eq!(job.status, SyncStatus::Completed);
    assert_eq!(job.records_succeeded, 2);
    assert_eq!(connector.list_count(), 5);
    // 1 + 2 + 4 + 8 seconds of backoff
    assert!(started.elapsed() >= Duration::from_secs(15));
}

// ============================================================================
// Job lifecycle
// ============================================================================

#[tokio::test]
async fn test_connect_failure_is_fatal() {
    let h = harness(FakeConnector::failing_connect());

    let job = h.engine.run_sync(customer_options()).await.unwrap();

    assert_eq!(job.status, SyncStatus::Failed);
    assert_eq!(job.errors[0].error_code, "FATAL_ERROR");
    assert_eq!(h.connector.list_count(), 0);
    assert_eq!(h.audit.len(), 1);
}

#[tokio::test]
async fn test_second_job_for_same_company_is_rejected() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        FakeConnector::new()
            .gated(gate.clone())
            .with_customer_page(Ok(Page::single(customers(1)))),
    );

    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.run_sync(customer_options()).await });
    wait_for_list_call(&h.connector).await;

    assert!(h.engine.is_job_running(COMPANY));
    let running = h.engine.get_job_status(COMPANY).unwrap();
    assert_eq!(running.status, SyncStatus::Running);

    let second = h.engine.run_sync(customer_options()).await;
    assert_eq!(second.unwrap_err(), SyncError::JobAlreadyRunning(COMPANY.to_string()));

    gate.notify_one();
    let job = first.await.unwrap().unwrap();
    assert_eq!(job.status, SyncStatus::Completed);
    assert_eq!(job.id, running.id);
    assert!(!h.engine.is_job_running(COMPANY));
    assert_eq!(h.audit.len(), 1);
}

#[tokio::test]
async fn test_cancelled_job_stops_at_next_checkpoint() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        FakeConnector::new()
            .gated(gate.clone())
            .with_customer_page(Ok(Page::single(customers(5)))),
    );

    let engine = h.engine.clone();
    let running = tokio::spawn(async move { engine.run_sync(customer_options()).await });
    wait_for_list_call(&h.connector).await;

    assert!(h.engine.cancel_job(COMPANY));
    assert!(!h.engine.is_job_running(COMPANY));
    assert!(!h.engine.cancel_job(COMPANY));

    gate.notify_one();
    let job = running.await.unwrap().unwrap();

    assert_eq!(job.status, SyncStatus::Failed);
    assert_eq!(job.records_succeeded, 0);
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].error_code, "CANCELLED");
    assert!(h.storage.list(EntityType::Customer).is_empty());
    assert_eq!(h.audit.len(), 1);
}

#[tokio::test]
async fn test_dropped_job_frees_company_and_is_audited() {
    let gate = Arc::new(Notify::new());
    let h = harness(
        FakeConnector::new()
            .gated(gate.clone())
            .with_customer_page(Ok(Page::single(customers(2)))),
    );

    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.run_sync(customer_options()).await });
    wait_for_list_call(&h.connector).await;
    assert!(h.engine.is_job_running(COMPANY));

    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());
    assert!(!h.engine.is_job_running(COMPANY));

    for _ in 0..100 {
        if !h.audit.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let events = h.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].new_state["status"], "FAILED");
    assert_eq!(events[0].new_state["errors"][0]["error_code"], "CANCELLED");

    // The company can sync again.
    let next = h.engine.run_sync(customer_options());
    gate.notify_one();
    let job = next.await.unwrap();
    assert_eq!(job.status, SyncStatus::Completed);
    assert_eq!(h.audit.len(), 2);
}

#[tokio::test]
async fn test_audit_event_written_once_per_job() {
    let h = harness(FakeConnector::new().with_customer_page(Ok(Page::single(customers(2)))));

    let job = h
        .engine
        .run_sync(customer_options().triggered_by("scheduler"))
        .await
        .unwrap();

    let events = h.audit.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.company_id, COMPANY);
    assert_eq!(event.event_type, "sync");
    assert_eq!(event.entity_type, "sync_job");
    assert_eq!(event.system_actor, "economic");
    assert_eq!(event.entity_id, Some(job.id.to_string()));
    assert_eq!(event.new_state["status"], "COMPLETED");
    assert_eq!(event.new_state["triggered_by"], "scheduler");
}

#[tokio::test]
async fn test_progress_reported_per_entity() {
    let seen: Arc<Mutex<Vec<(ProgressKind, EntityType)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let h = harness(FakeConnector::new());

    let options = SyncOptions::new(COMPANY).on_progress(Arc::new(move |progress: SyncProgress| {
        sink.lock()
            .unwrap()
            .push((progress.kind, progress.entity_type));
    }));
    h.engine.run_sync(options).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (ProgressKind::EntityStart, EntityType::Customer),
            (ProgressKind::EntityComplete, EntityType::Customer),
            (ProgressKind::EntityStart, EntityType::Invoice),
            (ProgressKind::EntityComplete, EntityType::Invoice),
        ]
    );
}

// ============================================================================
// Push
// ============================================================================

#[tokio::test]
async fn test_push_create_records_vendor_id() {
    let h = harness(FakeConnector::new());
    let customer = Customer::new("Ny Kro");
    let customer_id = customer.id;
    h.storage
        .add_pending_change(PendingChange::new(COMPANY, ChangeAction::Create, customer))
        .unwrap();

    let options = customer_options().direction(SyncDirection::Push);
    let job = h.engine.run_sync(options).await.unwrap();

    assert_eq!(job.status, SyncStatus::Completed);
    assert_eq!(job.records_succeeded, 1);
    assert_eq!(h.storage.pending_count(), 0);

    let stored = h.storage.list(EntityType::Customer);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id(), customer_id);
    assert_eq!(
        stored[0].external_ids().get(&ConnectorType::Economic).map(String::as_str),
        Some("C-1")
    );
}

#[tokio::test]
async fn test_push_invoice_resolves_customer_and_books() {
    let h = harness(FakeConnector::new());

    let mut customer = Customer::new("Kroen");
    customer
        .external_ids
        .insert(ConnectorType::Economic, "77".to_string());
    let local_customer_id = customer.id;
    h.storage
        .upsert(EntityType::Customer, customer.into())
        .await
        .unwrap();

    let invoice = Invoice::new(
        Some(local_customer_id.to_string()),
        vec![InvoiceLine::new("Julefrokost", dec!(10), dec!(395))],
    );
    h.storage
        .add_pending_change(
            PendingChange::new(COMPANY, ChangeAction::Create, invoice).with_auto_book(),
        )
        .unwrap();

    let options = SyncOptions::new(COMPANY)
        .entity_types(vec![EntityType::Invoice])
        .direction(SyncDirection::Push);
    let job = h.engine.run_sync(options).await.unwrap();

    assert_eq!(job.status, SyncStatus::Completed);
    let created = h.connector.created.lock().unwrap();
    match &created[0] {
        SyncRecord::Invoice(sent) => assert_eq!(sent.customer_id.as_deref(), Some("77")),
        other => panic!("expected invoice, got {:?}", other),
    }
    assert_eq!(*h.connector.booked.lock().unwrap(), vec!["D-1".to_string()]);
}

#[tokio::test]
async fn test_failed_booking_is_retried_without_second_draft() {
    let h = harness(
        FakeConnector::new()
            .with_book_failure(ConnectorError::Api {
                status: 503,
                code: None,
                message: "booking unavailable".to_string(),
            }),
    );
    let invoice = Invoice::new(None, vec![InvoiceLine::new("Frokost", dec!(2), dec!(150))]);
    let invoice_id = invoice.id;
    h.storage
        .add_pending_change(
            PendingChange::new(COMPANY, ChangeAction::Create, invoice).with_auto_book(),
        )
        .unwrap();
    let options = || {
        SyncOptions::new(COMPANY)
            .entity_types(vec![EntityType::Invoice])
            .direction(SyncDirection::Push)
    };

    let first = h.engine.run_sync(options()).await.unwrap();
    assert_eq!(first.status, SyncStatus::Failed);
    assert_eq!(h.storage.pending_count(), 1);
    let stored = h.storage.get(EntityType::Invoice, invoice_id).await.unwrap().unwrap();
    assert_eq!(
        stored.external_ids().get(&ConnectorType::Economic).map(String::as_str),
        Some("D-1")
    );

    let second = h.engine.run_sync(options()).await.unwrap();
    assert_eq!(second.status, SyncStatus::Completed);
    assert_eq!(h.storage.pending_count(), 0);
    assert_eq!(h.connector.created.lock().unwrap().len(), 1);
    assert_eq!(*h.connector.booked.lock().unwrap(), vec!["D-1".to_string()]);
}

#[tokio::test]
async fn test_push_update_requires_external_id() {
    let h = harness(FakeConnector::new());
    h.storage
        .add_pending_change(PendingChange::new(
            COMPANY,
            ChangeAction::Update,
            Customer::new("Uden id"),
        ))
        .unwrap();
    h.storage
        .add_pending_change(
            PendingChange::new(COMPANY, ChangeAction::Update, Customer::new("Med id"))
                .with_external_id("12"),
        )
        .unwrap();

    let job = h
        .engine
        .run_sync(customer_options().direction(SyncDirection::Push))
        .await
        .unwrap();

    assert_eq!(job.status, SyncStatus::Partial);
    assert_eq!(job.errors[0].error_code, "MISSING_EXTERNAL_ID");
    assert_eq!(h.storage.pending_count(), 1);
    let updated = h.connector.updated.lock().unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].0, "12");
}

#[tokio::test]
async fn test_push_unsupported_action() {
    let h = harness(FakeConnector::new());
    h.storage
        .add_pending_change(
            PendingChange::new(
                COMPANY,
                ChangeAction::Delete,
                Invoice::new(None, vec![InvoiceLine::new("Kaffe", dec!(1), dec!(30))]),
            )
            .with_external_id("5"),
        )
        .unwrap();

    let options = SyncOptions::new(COMPANY)
        .entity_types(vec![EntityType::Invoice])
        .direction(SyncDirection::Push);
    let job = h.engine.run_sync(options).await.unwrap();

    assert_eq!(job.status, SyncStatus::Failed);
    assert_eq!(job.errors[0].error_code, "UNSUPPORTED_OPERATION");
}

// ============================================================================
// Against a mock vendor
// ============================================================================

#[tokio::test]
async fn test_pull_all_pages_from_economic() {
    let customers = (1..=5)
        .map(|n| economic_customer(n, &format!("Kunde {}", n)))
        .collect();
    let (url, state) = start_economic(customers, 2).await;
    let mut config = EconomicConfig::new(ECONOMIC_SECRET, ECONOMIC_GRANT);
    config.base_url = url;
    let connector = Arc::new(EconomicClient::new(config).unwrap());
    let storage = Arc::new(MemoryStorage::new());
    let engine = SyncEngine::new(connector, storage.clone(), Arc::new(MemoryAuditLogger::new()));

    let job = engine.run_sync(customer_options()).await.unwrap();

    assert_eq!(job.status, SyncStatus::Completed);
    assert_eq!(job.records_succeeded, 5);
    assert_eq!(storage.list(EntityType::Customer).len(), 5);

    // A second pull matches on vendor ids instead of duplicating.
    engine.run_sync(customer_options()).await.unwrap();
    assert_eq!(storage.list(EntityType::Customer).len(), 5);

    let state = state.read().await;
    assert_eq!(state.count("GET /self"), 1);
    assert_eq!(state.count("GET /customers"), 6);
}

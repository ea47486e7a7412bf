// Sync Engine
// Runs pull/push jobs between one tenant's accounting connector and local
// storage. At most one job per company; per-record failures are collected on
// the job and never abort it.

use chrono::{NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AuditEvent, EntityType, SyncDirection, SyncErrorEntry, SyncJob, SyncRecord, SyncStatus,
};
use crate::services::accounting::connector::{
    self, AccountingConnector, ConnectorError, ListOptions,
};
use crate::services::accounting::retry::RetryPolicy;
use crate::services::accounting::storage::{ChangeAction, PendingChange, StorageError, SyncStorage};
use crate::services::audit_service::AuditLogger;
use crate::utils::log_sanitizer::sanitize_for_log;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Sync job already running for company {0}")]
    JobAlreadyRunning(String),
}

/// A failure that ends one entity type, or one record, inside a job.
#[derive(Debug, Clone)]
struct EntityError {
    code: String,
    message: String,
    retryable: bool,
}

impl EntityError {
    fn new(code: &str, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            retryable,
        }
    }
}

impl From<ConnectorError> for EntityError {
    fn from(error: ConnectorError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

impl From<StorageError> for EntityError {
    fn from(error: StorageError) -> Self {
        Self::new("STORAGE_ERROR", error.to_string(), true)
    }
}

// ============================================================================
// Options & Progress
// ============================================================================

pub fn default_entity_types() -> Vec<EntityType> {
    vec![EntityType::Customer, EntityType::Invoice]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    EntityStart,
    EntityComplete,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncProgress {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    pub entity_type: EntityType,
    pub job: SyncJob,
}

pub type ProgressCallback = Arc<dyn Fn(SyncProgress) + Send + Sync>;

#[derive(Clone)]
pub struct SyncOptions {
    pub company_id: String,
    /// Processed in this order. Empty means customers then invoices.
    pub entity_types: Vec<EntityType>,
    pub direction: SyncDirection,
    pub full_sync: bool,
    pub since: Option<NaiveDate>,
    pub triggered_by: Option<String>,
    pub on_progress: Option<ProgressCallback>,
}

impl SyncOptions {
    pub fn new(company_id: &str) -> Self {
        Self {
            company_id: company_id.to_string(),
            entity_types: default_entity_types(),
            direction: SyncDirection::Pull,
            full_sync: false,
            since: None,
            triggered_by: None,
            on_progress: None,
        }
    }

    pub fn entity_types(mut self, entity_types: Vec<EntityType>) -> Self {
        self.entity_types = entity_types;
        self
    }

    pub fn direction(mut self, direction: SyncDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn full_sync(mut self, full_sync: bool) -> Self {
        self.full_sync = full_sync;
        self
    }

    pub fn since(mut self, since: Option<NaiveDate>) -> Self {
        self.since = since;
        self
    }

    pub fn triggered_by(mut self, triggered_by: &str) -> Self {
        self.triggered_by = Some(triggered_by.to_string());
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("company_id", &self.company_id)
            .field("entity_types", &self.entity_types)
            .field("direction", &self.direction)
            .field("full_sync", &self.full_sync)
            .field("since", &self.since)
            .field("triggered_by", &self.triggered_by)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

// ============================================================================
// Running Jobs
// ============================================================================

/// Shared view of a running job. Once the job is terminal every further
/// mutation is dropped.
struct JobHandle {
    job: Mutex<SyncJob>,
    cancelled: AtomicBool,
}

impl JobHandle {
    fn new(job: SyncJob) -> Self {
        Self {
            job: Mutex::new(job),
            cancelled: AtomicBool::new(false),
        }
    }

    fn id(&self) -> Option<Uuid> {
        self.job.lock().ok().map(|job| job.id)
    }

    fn update(&self, f: impl FnOnce(&mut SyncJob)) {
        if let Ok(mut job) = self.job.lock() {
            if !job.status.is_terminal() {
                f(&mut job);
            }
        }
    }

    fn snapshot(&self) -> Option<SyncJob> {
        self.job.lock().ok().map(|job| job.clone())
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn record_success(&self) {
        self.update(|job| {
            job.records_processed += 1;
            job.records_succeeded += 1;
        });
    }

    fn record_failure(&self, entity_type: EntityType, entity_id: Option<String>, error: EntityError) {
        self.update(|job| {
            job.records_processed += 1;
            job.records_failed += 1;
            job.errors.push(SyncErrorEntry {
                entity_type: Some(entity_type),
                entity_id,
                error_code: error.code,
                error_message: error.message,
                retryable: error.retryable,
            });
        });
    }

    /// Entity-level failure: counted as failed but not as processed.
    fn record_entity_failure(&self, entity_type: EntityType, error: EntityError) {
        self.update(|job| {
            job.records_failed += 1;
            job.errors.push(SyncErrorEntry {
                entity_type: Some(entity_type),
                entity_id: None,
                error_code: error.code,
                error_message: error.message,
                retryable: error.retryable,
            });
        });
    }

    fn fail_fatally(&self, error: &ConnectorError) {
        self.update(|job| {
            job.errors.push(SyncErrorEntry {
                entity_type: None,
                entity_id: None,
                error_code: "FATAL_ERROR".to_string(),
                error_message: error.to_string(),
                retryable: false,
            });
            job.status = SyncStatus::Failed;
            job.completed_at = Some(Utc::now());
        });
    }

    fn cancel(&self) {
        self.update(|job| {
            job.errors.push(SyncErrorEntry {
                entity_type: None,
                entity_id: None,
                error_code: "CANCELLED".to_string(),
                error_message: "Job cancelled by user".to_string(),
                retryable: false,
            });
            job.status = SyncStatus::Failed;
            job.completed_at = Some(Utc::now());
        });
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// The job's future was dropped before it finished.
    fn abandon(&self) {
        self.update(|job| {
            job.errors.push(SyncErrorEntry {
                entity_type: None,
                entity_id: None,
                error_code: "CANCELLED".to_string(),
                error_message: "Job dropped before completion".to_string(),
                retryable: true,
            });
            job.status = SyncStatus::Failed;
            job.completed_at = Some(Utc::now());
        });
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.update(|job| {
            job.status = job.outcome();
            job.completed_at = Some(Utc::now());
        });
    }
}

/// A company's slot in the running registry, held for the lifetime of one
/// `run_sync` call. If the call is dropped before the audit write, the slot
/// is still freed and the job is audited as cancelled from a spawned task.
struct RunningJob<'a> {
    running: &'a DashMap<String, Arc<JobHandle>>,
    company_id: String,
    job_id: Uuid,
    handle: Arc<JobHandle>,
    audit: Arc<dyn AuditLogger>,
    audited: bool,
}

impl RunningJob<'_> {
    /// Frees the slot unless `cancel_job` already handed it to a newer job.
    fn release(&self) {
        let job_id = self.job_id;
        self.running
            .remove_if(&self.company_id, |_, running| running.id() == Some(job_id));
    }
}

impl Drop for RunningJob<'_> {
    fn drop(&mut self) {
        self.release();
        if self.audited {
            return;
        }

        self.handle.abandon();
        let Some(job) = self.handle.snapshot() else {
            return;
        };
        tracing::warn!(
            job_id = %self.job_id,
            company_id = %sanitize_for_log(&self.company_id),
            "Sync job dropped before completion"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let audit = self.audit.clone();
                runtime.spawn(async move {
                    write_audit(audit.as_ref(), &job).await;
                });
            }
            Err(_) => {
                tracing::warn!(job_id = %self.job_id, "No runtime left to audit dropped sync job");
            }
        }
    }
}

async fn write_audit(audit: &dyn AuditLogger, job: &SyncJob) {
    let new_state = match serde_json::to_value(job) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!("Failed to serialize sync job for audit: {}", e);
            serde_json::Value::Null
        }
    };
    let event = AuditEvent::new(
        job.company_id.clone(),
        "sync",
        "sync_job",
        job.connector_type.as_str(),
    )
    .with_entity_id(job.id.to_string())
    .with_new_state(new_state);

    if let Err(e) = audit.log(event).await {
        tracing::warn!(job_id = %job.id, "Failed to write sync audit event: {}", e);
    }
}

// ============================================================================
// Sync Engine
// ============================================================================

pub struct SyncEngine {
    connector: Arc<dyn AccountingConnector>,
    storage: Arc<dyn SyncStorage>,
    audit: Arc<dyn AuditLogger>,
    retry: RetryPolicy,
    running: DashMap<String, Arc<JobHandle>>,
}

impl SyncEngine {
    pub fn new(
        connector: Arc<dyn AccountingConnector>,
        storage: Arc<dyn SyncStorage>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self {
            connector,
            storage,
            audit,
            retry: RetryPolicy::default(),
            running: DashMap::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn connector(&self) -> &Arc<dyn AccountingConnector> {
        &self.connector
    }

    pub fn storage(&self) -> &Arc<dyn SyncStorage> {
        &self.storage
    }

    // ========================================================================
    // Job Control
    // ========================================================================

    /// Runs one job to completion and returns it in its terminal state.
    ///
    /// Connector and storage failures are recorded on the job; the only error
    /// is a job already running for the same company.
    pub async fn run_sync(&self, options: SyncOptions) -> std::result::Result<SyncJob, SyncError> {
        let entity_types = if options.entity_types.is_empty() {
            default_entity_types()
        } else {
            options.entity_types.clone()
        };

        let mut job = SyncJob::start(
            options.company_id.clone(),
            self.connector.connector_type(),
            options.direction,
            entity_types.clone(),
        );
        job.full_sync = options.full_sync;
        job.since = options.since;
        job.triggered_by = Some(
            options
                .triggered_by
                .clone()
                .unwrap_or_else(|| "manual".to_string()),
        );
        let job_id = job.id;

        let handle = match self.running.entry(options.company_id.clone()) {
            Entry::Occupied(_) => {
                return Err(SyncError::JobAlreadyRunning(options.company_id.clone()));
            }
            Entry::Vacant(slot) => {
                let handle = Arc::new(JobHandle::new(job));
                slot.insert(handle.clone());
                handle
            }
        };

        tracing::info!(
            job_id = %job_id,
            company_id = %sanitize_for_log(&options.company_id),
            connector = %self.connector.connector_type(),
            direction = ?options.direction,
            "Sync job started"
        );

        let mut guard = RunningJob {
            running: &self.running,
            company_id: options.company_id.clone(),
            job_id,
            handle: handle.clone(),
            audit: self.audit.clone(),
            audited: false,
        };

        self.execute(&handle, &entity_types, &options).await;
        guard.release();

        let final_job = match handle.snapshot() {
            Some(job) => job,
            None => {
                // Poisoned job lock; report a failed job rather than panic.
                let mut job = SyncJob::start(
                    options.company_id.clone(),
                    self.connector.connector_type(),
                    options.direction,
                    entity_types,
                );
                job.id = job_id;
                job.status = SyncStatus::Failed;
                job.completed_at = Some(Utc::now());
                job
            }
        };

        tracing::info!(
            job_id = %job_id,
            status = ?final_job.status,
            processed = final_job.records_processed,
            succeeded = final_job.records_succeeded,
            failed = final_job.records_failed,
            "Sync job finished"
        );

        write_audit(self.audit.as_ref(), &final_job).await;
        guard.audited = true;
        Ok(final_job)
    }

    /// Marks the running job for `company_id` as cancelled. The job stops at
    /// its next checkpoint.
    pub fn cancel_job(&self, company_id: &str) -> bool {
        match self.running.remove(company_id) {
            Some((_, handle)) => {
                handle.cancel();
                tracing::info!(
                    company_id = %sanitize_for_log(company_id),
                    "Sync job cancelled"
                );
                true
            }
            None => false,
        }
    }

    pub fn get_job_status(&self, company_id: &str) -> Option<SyncJob> {
        self.running
            .get(company_id)
            .and_then(|handle| handle.snapshot())
    }

    pub fn is_job_running(&self, company_id: &str) -> bool {
        self.running.contains_key(company_id)
    }

    // ========================================================================
    // Job Execution
    // ========================================================================

    async fn execute(&self, handle: &JobHandle, entity_types: &[EntityType], options: &SyncOptions) {
        if !self.connector.is_connected() {
            if let Err(e) = self.connector.connect().await {
                tracing::error!("Sync aborted, connect failed: {}", e);
                handle.fail_fatally(&e);
                return;
            }
        }

        for &entity_type in entity_types {
            if handle.is_cancelled() {
                return;
            }
            self.notify(options, handle, ProgressKind::EntityStart, entity_type);

            let result = self.sync_entity(handle, entity_type, options).await;
            match result {
                Ok(()) => self.notify(options, handle, ProgressKind::EntityComplete, entity_type),
                Err(e) => {
                    tracing::warn!(
                        entity_type = %entity_type,
                        code = %e.code,
                        "Entity sync failed: {}",
                        sanitize_for_log(&e.message)
                    );
                    handle.record_entity_failure(entity_type, e);
                }
            }
        }

        handle.finish();
    }

    async fn sync_entity(
        &self,
        handle: &JobHandle,
        entity_type: EntityType,
        options: &SyncOptions,
    ) -> std::result::Result<(), EntityError> {
        if options.direction.includes_pull() {
            self.pull_entity(handle, entity_type, options).await?;
        }
        if options.direction.includes_push() && !handle.is_cancelled() {
            self.push_entity(handle, entity_type, &options.company_id).await?;
        }
        Ok(())
    }

    fn notify(&self, options: &SyncOptions, handle: &JobHandle, kind: ProgressKind, entity_type: EntityType) {
        if let (Some(callback), Some(job)) = (&options.on_progress, handle.snapshot()) {
            callback(SyncProgress {
                kind,
                entity_type,
                job,
            });
        }
    }

    // ========================================================================
    // Pull
    // ========================================================================

    async fn pull_entity(
        &self,
        handle: &JobHandle,
        entity_type: EntityType,
        options: &SyncOptions,
    ) -> std::result::Result<(), EntityError> {
        let since = if options.full_sync { None } else { options.since };
        let label = format!("list {}", entity_type);
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();

        loop {
            if handle.is_cancelled() {
                return Ok(());
            }

            let list_options = ListOptions {
                cursor: cursor.clone(),
                since,
                page_size: None,
            };
            let page = self
                .retry
                .run(&label, || {
                    connector::list_records(self.connector.as_ref(), entity_type, &list_options)
                })
                .await?;

            for record in page.data {
                if handle.is_cancelled() {
                    return Ok(());
                }
                self.pull_record(handle, entity_type, record).await;
            }

            if !page.has_more {
                return Ok(());
            }

            match page.cursor {
                Some(next) if seen_cursors.insert(next.clone()) => {
                    handle.update(|job| job.next_cursor = Some(next.clone()));
                    cursor = Some(next);
                }
                Some(repeated) => {
                    return Err(EntityError::new(
                        "PAGINATION_LOOP",
                        format!("{} returned cursor {} twice", entity_type, sanitize_for_log(&repeated)),
                        false,
                    ));
                }
                None => {
                    return Err(EntityError::new(
                        "PAGINATION_LOOP",
                        format!("{} reported more pages without a cursor", entity_type),
                        false,
                    ));
                }
            }
        }
    }

    async fn pull_record(&self, handle: &JobHandle, entity_type: EntityType, record: SyncRecord) {
        let entity_id = self.record_label(&record);

        if let Err(errors) = record.validate_record() {
            handle.record_failure(
                entity_type,
                Some(entity_id),
                EntityError::new("VALIDATION_ERROR", errors.to_string(), false),
            );
            return;
        }

        match self.storage.upsert(entity_type, record).await {
            Ok(_) => handle.record_success(),
            Err(e) => handle.record_failure(entity_type, Some(entity_id), e.into()),
        }
    }

    /// Vendor id for error entries, falling back to the canonical id.
    fn record_label(&self, record: &SyncRecord) -> String {
        record
            .external_ids()
            .get(&self.connector.connector_type())
            .cloned()
            .unwrap_or_else(|| record.id().to_string())
    }

    // ========================================================================
    // Push
    // ========================================================================

    async fn push_entity(
        &self,
        handle: &JobHandle,
        entity_type: EntityType,
        company_id: &str,
    ) -> std::result::Result<(), EntityError> {
        let pending = self.storage.get_pending_changes(entity_type, company_id).await?;

        for change in pending {
            if handle.is_cancelled() {
                return Ok(());
            }

            let outcome = match self.push_change(&change).await {
                Ok(()) => self
                    .storage
                    .mark_synced(entity_type, change.id)
                    .await
                    .map_err(EntityError::from),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => handle.record_success(),
                Err(e) => {
                    tracing::warn!(
                        change_id = %change.id,
                        code = %e.code,
                        "Push failed: {}",
                        sanitize_for_log(&e.message)
                    );
                    handle.record_failure(entity_type, Some(change.id.to_string()), e);
                }
            }
        }
        Ok(())
    }

    async fn push_change(&self, change: &PendingChange) -> std::result::Result<(), EntityError> {
        let connector = self.connector.as_ref();
        let entity_type = change.entity_type();

        match (entity_type, change.action) {
            (
                EntityType::Customer | EntityType::Product | EntityType::Invoice | EntityType::Payment,
                ChangeAction::Create,
            ) => self.push_create(change).await,
            (EntityType::Customer | EntityType::Product | EntityType::Invoice, ChangeAction::Update) => {
                let external_id = Self::require_external_id(change)?;
                connector::update_record(connector, external_id, &change.data).await?;
                Ok(())
            }
            (EntityType::Customer | EntityType::Product, ChangeAction::Delete) => {
                let external_id = Self::require_external_id(change)?;
                connector::delete_record(connector, entity_type, external_id).await?;
                Ok(())
            }
            (_, action) => Err(ConnectorError::unsupported(
                connector.connector_type(),
                &format!("push {} {}", action.as_str(), entity_type),
            )
            .into()),
        }
    }

    fn require_external_id(change: &PendingChange) -> std::result::Result<&str, EntityError> {
        change
            .external_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                EntityError::new(
                    "MISSING_EXTERNAL_ID",
                    format!(
                        "{} {} requires the vendor id of the record",
                        change.action.as_str(),
                        change.entity_type()
                    ),
                    false,
                )
            })
    }

    async fn push_create(&self, change: &PendingChange) -> std::result::Result<(), EntityError> {
        let vendor = self.connector.connector_type();
        let entity_type = change.entity_type();

        // A previous attempt may have created the record and failed later on.
        let existing = self
            .storage
            .get(entity_type, change.data.id())
            .await?
            .and_then(|stored| stored.external_ids().get(&vendor).cloned())
            .filter(|id| !id.is_empty());

        let external_id = match existing {
            Some(external_id) => {
                tracing::info!(
                    change_id = %change.id,
                    external_id = %sanitize_for_log(&external_id),
                    "Record already created, skipping create"
                );
                external_id
            }
            None => {
                let mut record = change.data.clone();
                self.resolve_customer_reference(&mut record).await?;
                let created = connector::create_record(self.connector.as_ref(), &record).await?;

                // Store the local record with its new vendor id.
                let mut local = change.data.clone();
                if !created.external_id.is_empty() {
                    local
                        .external_ids_mut()
                        .insert(vendor, created.external_id.clone());
                }
                self.storage.upsert(entity_type, local).await?;
                created.external_id
            }
        };

        if change.auto_book && entity_type == EntityType::Invoice {
            self.connector.book_invoice(&external_id).await?;
        }
        Ok(())
    }

    /// Swaps a local customer id on invoices and payments for the vendor's
    /// customer id. Unknown ids are passed through unchanged.
    async fn resolve_customer_reference(&self, record: &mut SyncRecord) -> std::result::Result<(), EntityError> {
        let customer_id = match record {
            SyncRecord::Invoice(invoice) => &mut invoice.customer_id,
            SyncRecord::Payment(payment) => &mut payment.customer_id,
            _ => return Ok(()),
        };
        let Some(local_id) = customer_id.as_deref().and_then(|id| Uuid::parse_str(id).ok()) else {
            return Ok(());
        };

        if let Some(stored) = self.storage.get(EntityType::Customer, local_id).await? {
            if let Some(vendor_id) = stored.external_ids().get(&self.connector.connector_type()) {
                *customer_id = Some(vendor_id.clone());
            }
        }
        Ok(())
    }
}

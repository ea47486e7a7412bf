/// Audit logging for integration state changes
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::models::AuditEvent;
use crate::utils::log_sanitizer::sanitize_for_log;

/// Events kept by [`MemoryAuditLogger`] before the oldest are dropped.
pub const DEFAULT_MEMORY_CAPACITY: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("Audit event could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Sink for audit events. Callers log failures and carry on.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Writes each event as a structured `info` line on the `audit` target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditLogger;

#[async_trait]
impl AuditLogger for TracingAuditLogger {
    async fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        let new_state = serde_json::to_string(&event.new_state)?;
        tracing::info!(
            target: "audit",
            event_id = %event.id,
            company_id = %sanitize_for_log(&event.company_id),
            event_type = %event.event_type,
            entity_type = %event.entity_type,
            entity_id = event.entity_id.as_deref().unwrap_or(""),
            actor = %event.system_actor,
            new_state = %new_state,
            "Audit event"
        );
        Ok(())
    }
}

/// Keeps the most recent events in memory.
#[derive(Debug)]
pub struct MemoryAuditLogger {
    capacity: usize,
    events: Mutex<VecDeque<AuditEvent>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Newest first, at most `limit`.
    pub fn recent_for_company(&self, company_id: &str, limit: usize) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| {
                events
                    .iter()
                    .rev()
                    .filter(|event| event.company_id == company_id)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryAuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditLogger for MemoryAuditLogger {
    async fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| AuditError::Unavailable("memory audit log poisoned".to_string()))?;
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

/// Forwards each event to every sink. The first failure is returned after
/// all sinks have been tried.
#[derive(Default, Clone)]
pub struct CompositeAuditLogger {
    sinks: Vec<Arc<dyn AuditLogger>>,
}

impl CompositeAuditLogger {
    pub fn new(sinks: Vec<Arc<dyn AuditLogger>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AuditLogger for CompositeAuditLogger {
    async fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.log(event.clone()).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::common::{ConnectorType, EntityType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncDirection {
    Pull,
    Push,
    Bidirectional,
}

impl SyncDirection {
    pub fn includes_pull(&self) -> bool {
        matches!(self, SyncDirection::Pull | SyncDirection::Bidirectional)
    }

    pub fn includes_push(&self) -> bool {
        matches!(self, SyncDirection::Push | SyncDirection::Bidirectional)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Running,
    Completed,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncStatus::Running)
    }
}

/// One failure recorded against a job. `entity_type` is `None` for job-level
/// failures such as a failed connect or a cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncErrorEntry {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    pub error_code: String,
    pub error_message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: Uuid,
    pub company_id: String,
    pub connector_type: ConnectorType,
    pub direction: SyncDirection,
    pub entity_types: Vec<EntityType>,
    pub full_sync: bool,
    pub since: Option<NaiveDate>,
    pub status: SyncStatus,
    pub records_processed: u64,
    pub records_succeeded: u64,
    pub records_failed: u64,
    pub errors: Vec<SyncErrorEntry>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub next_cursor: Option<String>,
    pub triggered_by: Option<String>,
}

impl SyncJob {
    pub fn start(
        company_id: impl Into<String>,
        connector_type: ConnectorType,
        direction: SyncDirection,
        entity_types: Vec<EntityType>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id: company_id.into(),
            connector_type,
            direction,
            entity_types,
            full_sync: false,
            since: None,
            status: SyncStatus::Running,
            records_processed: 0,
            records_succeeded: 0,
            records_failed: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            next_cursor: None,
            triggered_by: None,
        }
    }

    /// Terminal status from the counters. COMPLETED needs zero errors, PARTIAL
    /// at least one success next to the errors.
    pub fn outcome(&self) -> SyncStatus {
        if self.errors.is_empty() {
            SyncStatus::Completed
        } else if self.records_succeeded > 0 {
            SyncStatus::Partial
        } else {
            SyncStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_entry() -> SyncErrorEntry {
        SyncErrorEntry {
            entity_type: Some(EntityType::Customer),
            entity_id: Some("3".to_string()),
            error_code: "STORAGE_ERROR".to_string(),
            error_message: "disk full".to_string(),
            retryable: true,
        }
    }

    #[test]
    fn test_outcome_from_counters() {
        let mut job = SyncJob::start(
            "company-1",
            ConnectorType::Economic,
            SyncDirection::Pull,
            vec![EntityType::Customer],
        );
        assert_eq!(job.status, SyncStatus::Running);
        assert_eq!(job.outcome(), SyncStatus::Completed);

        job.errors.push(error_entry());
        assert_eq!(job.outcome(), SyncStatus::Failed);

        job.records_succeeded = 9;
        assert_eq!(job.outcome(), SyncStatus::Partial);
    }

    #[test]
    fn test_direction_flags() {
        assert!(SyncDirection::Bidirectional.includes_pull());
        assert!(SyncDirection::Bidirectional.includes_push());
        assert!(!SyncDirection::Pull.includes_push());
        assert!(!SyncDirection::Push.includes_pull());
        assert!(!SyncStatus::Running.is_terminal());
        assert!(SyncStatus::Partial.is_terminal());
    }
}

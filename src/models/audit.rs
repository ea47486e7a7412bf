use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only record of a state change made by the integration service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub company_id: String,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub system_actor: String,
    pub new_state: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        company_id: impl Into<String>,
        event_type: impl Into<String>,
        entity_type: impl Into<String>,
        system_actor: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id: company_id.into(),
            event_type: event_type.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            system_actor: system_actor.into(),
            new_state: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_new_state(mut self, new_state: serde_json::Value) -> Self {
        self.new_state = new_state;
        self
    }
}

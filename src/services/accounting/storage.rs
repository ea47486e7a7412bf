// Local persistence seam for the sync engine
// The engine only sees SyncStorage. MemoryStorage is the in-process adapter
// used by the service binary and the tests.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{ConnectorType, EntityType, SyncRecord};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record does not match entity type {expected}")]
    EntityMismatch { expected: EntityType },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

/// A local change waiting to be pushed to the accounting system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: Uuid,
    pub company_id: String,
    pub action: ChangeAction,
    pub data: SyncRecord,
    /// Vendor id of the record, required for update and delete.
    pub external_id: Option<String>,
    /// Book an invoice straight after it is created.
    #[serde(default)]
    pub auto_book: bool,
}

impl PendingChange {
    pub fn new(company_id: &str, action: ChangeAction, data: impl Into<SyncRecord>) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id: company_id.to_string(),
            action,
            data: data.into(),
            external_id: None,
            auto_book: false,
        }
    }

    pub fn with_external_id(mut self, external_id: &str) -> Self {
        self.external_id = Some(external_id.to_string());
        self
    }

    pub fn with_auto_book(mut self) -> Self {
        self.auto_book = true;
        self
    }

    pub fn entity_type(&self) -> EntityType {
        self.data.entity_type()
    }
}

#[async_trait]
pub trait SyncStorage: Send + Sync {
    /// Inserts or replaces a record and returns it as stored.
    async fn upsert(&self, entity_type: EntityType, record: SyncRecord) -> Result<SyncRecord>;

    async fn get(&self, entity_type: EntityType, id: Uuid) -> Result<Option<SyncRecord>>;

    async fn get_by_external_id(
        &self,
        entity_type: EntityType,
        connector: ConnectorType,
        external_id: &str,
    ) -> Result<Option<SyncRecord>>;

    async fn get_pending_changes(
        &self,
        entity_type: EntityType,
        company_id: &str,
    ) -> Result<Vec<PendingChange>>;

    async fn mark_synced(&self, entity_type: EntityType, change_id: Uuid) -> Result<()>;
}

// ============================================================================
// In-memory adapter
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: DashMap<(EntityType, Uuid), SyncRecord>,
    pending: Mutex<Vec<PendingChange>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pending_change(&self, change: PendingChange) -> Result<()> {
        self.pending
            .lock()
            .map_err(|_| StorageError::Unavailable("pending queue poisoned".to_string()))?
            .push(change);
        Ok(())
    }

    pub fn list(&self, entity_type: EntityType) -> Vec<SyncRecord> {
        self.records
            .iter()
            .filter(|entry| entry.key().0 == entity_type)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        self.records.clear();
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }

    /// Id of a stored record sharing any (vendor, external id) pair with `record`.
    fn find_existing(&self, entity_type: EntityType, record: &SyncRecord) -> Option<Uuid> {
        let wanted = record.external_ids();
        if wanted.is_empty() {
            return None;
        }
        self.records
            .iter()
            .filter(|entry| entry.key().0 == entity_type)
            .find(|entry| {
                entry
                    .value()
                    .external_ids()
                    .iter()
                    .any(|(vendor, id)| wanted.get(vendor) == Some(id))
            })
            .map(|entry| entry.key().1)
    }
}

#[async_trait]
impl SyncStorage for MemoryStorage {
    async fn upsert(&self, entity_type: EntityType, mut record: SyncRecord) -> Result<SyncRecord> {
        if record.entity_type() != entity_type {
            return Err(StorageError::EntityMismatch {
                expected: entity_type,
            });
        }

        if let Some(existing_id) = self.find_existing(entity_type, &record) {
            if existing_id != record.id() {
                // Keep the local id and any vendor ids the incoming copy lacks.
                if let Some(existing) = self.records.get(&(entity_type, existing_id)) {
                    for (vendor, id) in existing.external_ids() {
                        record
                            .external_ids_mut()
                            .entry(*vendor)
                            .or_insert_with(|| id.clone());
                    }
                }
                record.set_id(existing_id);
            }
        }

        self.records
            .insert((entity_type, record.id()), record.clone());
        Ok(record)
    }

    async fn get(&self, entity_type: EntityType, id: Uuid) -> Result<Option<SyncRecord>> {
        Ok(self
            .records
            .get(&(entity_type, id))
            .map(|entry| entry.value().clone()))
    }

    async fn get_by_external_id(
        &self,
        entity_type: EntityType,
        connector: ConnectorType,
        external_id: &str,
    ) -> Result<Option<SyncRecord>> {
        Ok(self
            .records
            .iter()
            .find(|entry| {
                entry.key().0 == entity_type
                    && entry.value().external_ids().get(&connector).map(String::as_str)
                        == Some(external_id)
            })
            .map(|entry| entry.value().clone()))
    }

    async fn get_pending_changes(
        &self,
        entity_type: EntityType,
        company_id: &str,
    ) -> Result<Vec<PendingChange>> {
        let pending = self
            .pending
            .lock()
            .map_err(|_| StorageError::Unavailable("pending queue poisoned".to_string()))?;
        Ok(pending
            .iter()
            .filter(|change| change.entity_type() == entity_type && change.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn mark_synced(&self, entity_type: EntityType, change_id: Uuid) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| StorageError::Unavailable("pending queue poisoned".to_string()))?;
        let before = pending.len();
        pending.retain(|change| !(change.id == change_id && change.entity_type() == entity_type));

        if pending.len() == before {
            return Err(StorageError::NotFound(change_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{external_ids_for, Customer, Product};
    use rust_decimal_macros::dec;

    fn economic_customer(name: &str, number: &str) -> Customer {
        let mut customer = Customer::new(name);
        customer.external_ids = external_ids_for(ConnectorType::Economic, Some(number.to_string()));
        customer
    }

    #[tokio::test]
    async fn test_upsert_dedupes_by_external_id() {
        let storage = MemoryStorage::new();
        let first = storage
            .upsert(EntityType::Customer, economic_customer("Kroen", "101").into())
            .await
            .unwrap();
        let second = storage
            .upsert(EntityType::Customer, economic_customer("Kroen ApS", "101").into())
            .await
            .unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(storage.list(EntityType::Customer).len(), 1);

        let found = storage
            .get_by_external_id(EntityType::Customer, ConnectorType::Economic, "101")
            .await
            .unwrap();
        match found {
            Some(SyncRecord::Customer(c)) => assert_eq!(c.name, "Kroen ApS"),
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_entity() {
        let storage = MemoryStorage::new();
        let result = storage
            .upsert(EntityType::Customer, Product::new("Pizza", dec!(95)).into())
            .await;
        assert!(matches!(result, Err(StorageError::EntityMismatch { .. })));
    }

    #[tokio::test]
    async fn test_pending_changes_lifecycle() {
        let storage = MemoryStorage::new();
        let change = PendingChange::new("kro-1", ChangeAction::Create, Customer::new("Ny kunde"));
        let change_id = change.id;
        storage.add_pending_change(change).unwrap();
        storage
            .add_pending_change(PendingChange::new("other", ChangeAction::Create, Customer::new("X")))
            .unwrap();

        let pending = storage
            .get_pending_changes(EntityType::Customer, "kro-1")
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        storage.mark_synced(EntityType::Customer, change_id).await.unwrap();
        assert!(storage
            .get_pending_changes(EntityType::Customer, "kro-1")
            .await
            .unwrap()
            .is_empty());
        assert!(storage.mark_synced(EntityType::Customer, change_id).await.is_err());
    }
}

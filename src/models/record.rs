use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::models::common::{EntityType, ExternalIds};
use crate::models::customer::Customer;
use crate::models::invoice::Invoice;
use crate::models::ledger::{Account, VatCode};
use crate::models::payment::Payment;
use crate::models::product::Product;

/// A canonical entity of any syncable type, as handed between connectors,
/// the sync engine and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "data", rename_all = "snake_case")]
pub enum SyncRecord {
    Customer(Customer),
    Product(Product),
    Invoice(Invoice),
    Payment(Payment),
    Account(Account),
    VatCode(VatCode),
}

impl SyncRecord {
    pub fn entity_type(&self) -> EntityType {
        match self {
            SyncRecord::Customer(_) => EntityType::Customer,
            SyncRecord::Product(_) => EntityType::Product,
            SyncRecord::Invoice(_) => EntityType::Invoice,
            SyncRecord::Payment(_) => EntityType::Payment,
            SyncRecord::Account(_) => EntityType::Account,
            SyncRecord::VatCode(_) => EntityType::VatCode,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            SyncRecord::Customer(c) => c.id,
            SyncRecord::Product(p) => p.id,
            SyncRecord::Invoice(i) => i.id,
            SyncRecord::Payment(p) => p.id,
            SyncRecord::Account(a) => a.id,
            SyncRecord::VatCode(v) => v.id,
        }
    }

    pub fn set_id(&mut self, id: Uuid) {
        match self {
            SyncRecord::Customer(c) => c.id = id,
            SyncRecord::Product(p) => p.id = id,
            SyncRecord::Invoice(i) => i.id = id,
            SyncRecord::Payment(p) => p.id = id,
            SyncRecord::Account(a) => a.id = id,
            SyncRecord::VatCode(v) => v.id = id,
        }
    }

    pub fn external_ids(&self) -> &ExternalIds {
        match self {
            SyncRecord::Customer(c) => &c.external_ids,
            SyncRecord::Product(p) => &p.external_ids,
            SyncRecord::Invoice(i) => &i.external_ids,
            SyncRecord::Payment(p) => &p.external_ids,
            SyncRecord::Account(a) => &a.external_ids,
            SyncRecord::VatCode(v) => &v.external_ids,
        }
    }

    pub fn external_ids_mut(&mut self) -> &mut ExternalIds {
        match self {
            SyncRecord::Customer(c) => &mut c.external_ids,
            SyncRecord::Product(p) => &mut p.external_ids,
            SyncRecord::Invoice(i) => &mut i.external_ids,
            SyncRecord::Payment(p) => &mut p.external_ids,
            SyncRecord::Account(a) => &mut a.external_ids,
            SyncRecord::VatCode(v) => &mut v.external_ids,
        }
    }

    /// Checks applied before a pulled record is stored.
    pub fn validate_record(&self) -> Result<(), ValidationErrors> {
        match self {
            SyncRecord::Customer(c) => c.validate(),
            SyncRecord::Product(p) => p.validate(),
            SyncRecord::Invoice(i) => i.validate_record(),
            SyncRecord::Payment(_) | SyncRecord::Account(_) | SyncRecord::VatCode(_) => Ok(()),
        }
    }
}

impl From<Customer> for SyncRecord {
    fn from(value: Customer) -> Self {
        SyncRecord::Customer(value)
    }
}

impl From<Product> for SyncRecord {
    fn from(value: Product) -> Self {
        SyncRecord::Product(value)
    }
}

impl From<Invoice> for SyncRecord {
    fn from(value: Invoice) -> Self {
        SyncRecord::Invoice(value)
    }
}

impl From<Payment> for SyncRecord {
    fn from(value: Payment) -> Self {
        SyncRecord::Payment(value)
    }
}

impl From<Account> for SyncRecord {
    fn from(value: Account) -> Self {
        SyncRecord::Account(value)
    }
}

impl From<VatCode> for SyncRecord {
    fn from(value: VatCode) -> Self {
        SyncRecord::VatCode(value)
    }
}

pub mod audit;
pub mod common;
pub mod customer;
pub mod invoice;
pub mod ledger;
pub mod payment;
pub mod product;
pub mod record;
pub mod sync_job;
pub mod validation;

pub use audit::AuditEvent;
pub use common::{external_ids_for, Address, ConnectorType, EntityType, ExternalIds};
pub use customer::Customer;
pub use invoice::{Invoice, InvoiceLine, InvoiceStatus};
pub use ledger::{Account, AccountType, JournalEntry, JournalLine, VatCode, VatType};
pub use payment::{Payment, PaymentAllocation};
pub use product::Product;
pub use record::SyncRecord;
pub use sync_job::{SyncDirection, SyncErrorEntry, SyncJob, SyncStatus};

// Accounting Integration Module
// Vendor connectors (e-conomic, Dinero, Billy, Visma.net), the shared HTTP
// plumbing they sit on, the sync engine and the per-tenant manager.

pub mod api_client;
pub mod billy_client;
pub mod connector;
pub mod dinero_client;
pub mod economic_client;
pub mod integration_manager;
pub mod mappers;
pub mod rate_limiter;
pub mod retry;
pub mod storage;
pub mod sync_engine;
pub mod visma_client;

pub use billy_client::{BillyClient, BillyConfig};
pub use connector::{
    AccountingConnector, CompanyInfo, ConnectionTest, ConnectorError, ConnectorSettings, Created,
    ListOptions, Page,
};
pub use dinero_client::{DineroClient, DineroConfig};
pub use economic_client::{EconomicClient, EconomicConfig, InvoicePdf};
pub use integration_manager::{
    AvailabilityStatus, ConnectorDescriptor, IntegrationError, IntegrationManager, Registration,
    StorageFactory,
};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use storage::{ChangeAction, MemoryStorage, PendingChange, StorageError, SyncStorage};
pub use sync_engine::{
    ProgressCallback, ProgressKind, SyncEngine, SyncError, SyncOptions, SyncProgress,
};
pub use visma_client::{VismaClient, VismaConfig};

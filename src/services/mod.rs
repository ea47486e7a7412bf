pub mod accounting;
pub mod audit_service;

pub use audit_service::{
    AuditError, AuditLogger, CompositeAuditLogger, MemoryAuditLogger, TracingAuditLogger,
};

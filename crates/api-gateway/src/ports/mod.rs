//! Collaborator traits the gateway consumes.

pub mod outbound;

pub use outbound::{
    AuditRecord, Auditer, EventPusher, HealthCheck, PermissiveSessionsHandler, Processor,
    ProcessorFinder, ProcessorRegistry, SessionsHandler,
};

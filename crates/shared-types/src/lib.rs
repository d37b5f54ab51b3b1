//! # Shared Types Crate
//!
//! The resource model contract shared by the gateway, the bus and the test
//! suite: identities, operations, change events and the relationship
//! registry that decides which operation is allowed where.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every crate that talks about resources uses
//!   these types.
//! - **Read-only registry**: relationships are declared once at startup and
//!   injected; nothing in this crate holds process-wide state.

pub mod event;
pub mod identity;
pub mod operation;
pub mod relationships;

pub use event::Event;
pub use identity::{Identity, ROOT_NAME};
pub use operation::{EventType, Operation, UnknownOperation};
pub use relationships::{
    Relationship, RelationshipError, RelationshipsBuilder, RelationshipsRegistry,
    VersionedRelationships,
};

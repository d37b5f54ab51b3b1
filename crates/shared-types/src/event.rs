//! # Events
//!
//! An event records a successful write. It is produced during dispatch,
//! handed to the push pipeline and then dropped; events are never persisted.

use crate::identity::Identity;
use crate::operation::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable record of a change to a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Kind of change.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Encoded resource as it looked after the change.
    pub entity: serde_json::Value,
    /// Name of the identity of the changed resource.
    pub identity: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Build an event from any serializable entity.
    pub fn new<T: Serialize>(
        event_type: EventType,
        identity: &Identity,
        entity: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_type,
            entity: serde_json::to_value(entity)?,
            identity: identity.name.clone(),
            timestamp: Utc::now(),
        })
    }

    /// Build an event from an already encoded entity.
    pub fn from_value(event_type: EventType, identity: &Identity, entity: serde_json::Value) -> Self {
        Self {
            event_type,
            entity,
            identity: identity.name.clone(),
            timestamp: Utc::now(),
        }
    }
}

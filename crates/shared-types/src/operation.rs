//! # Operations
//!
//! The seven operations a resource can be addressed with, and the subset of
//! them that produce change events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An operation addressed at a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Create,
    Retrieve,
    RetrieveMany,
    Update,
    Delete,
    Patch,
    Info,
}

impl Operation {
    /// All operations, in declaration order.
    pub const ALL: [Operation; 7] = [
        Operation::Create,
        Operation::Retrieve,
        Operation::RetrieveMany,
        Operation::Update,
        Operation::Delete,
        Operation::Patch,
        Operation::Info,
    ];

    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Retrieve => "retrieve",
            Operation::RetrieveMany => "retrieve-many",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Patch => "patch",
            Operation::Info => "info",
        }
    }

    /// Human label used in error descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Create => "Create",
            Operation::Retrieve => "Retrieve",
            Operation::RetrieveMany => "RetrieveMany",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
            Operation::Patch => "Patch",
            Operation::Info => "Info",
        }
    }

    /// Operations that modify state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::Update | Operation::Delete | Operation::Patch
        )
    }

    /// Operations addressed at a collection under a parent.
    pub fn is_parent_scoped(&self) -> bool {
        matches!(
            self,
            Operation::Create | Operation::RetrieveMany | Operation::Info | Operation::Patch
        )
    }

    /// Event type emitted by a successful operation, if any.
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            Operation::Create => Some(EventType::Create),
            Operation::Update | Operation::Patch => Some(EventType::Update),
            Operation::Delete => Some(EventType::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown operation name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

/// Kind of change carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Create => f.write_str("create"),
            EventType::Update => f.write_str("update"),
            EventType::Delete => f.write_str("delete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_operations() {
        let writes: Vec<_> = Operation::ALL.into_iter().filter(|o| o.is_write()).collect();
        assert_eq!(
            writes,
            vec![
                Operation::Create,
                Operation::Update,
                Operation::Delete,
                Operation::Patch
            ]
        );
    }

    #[test]
    fn test_parent_scoped_operations() {
        assert!(Operation::Create.is_parent_scoped());
        assert!(Operation::RetrieveMany.is_parent_scoped());
        assert!(Operation::Info.is_parent_scoped());
        assert!(Operation::Patch.is_parent_scoped());
        assert!(!Operation::Retrieve.is_parent_scoped());
        assert!(!Operation::Update.is_parent_scoped());
        assert!(!Operation::Delete.is_parent_scoped());
    }

    #[test]
    fn test_parse_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>(), Ok(op));
        }
        assert!("explode".parse::<Operation>().is_err());
    }

    #[test]
    fn test_event_type_mapping() {
        assert_eq!(Operation::Create.event_type(), Some(EventType::Create));
        assert_eq!(Operation::Patch.event_type(), Some(EventType::Update));
        assert_eq!(Operation::Info.event_type(), None);
    }
}

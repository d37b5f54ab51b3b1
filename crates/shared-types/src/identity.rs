//! # Identities
//!
//! An identity names a kind of resource. The `name` is the singular form used
//! in messages and events, the `category` is the plural form used in paths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the implicit parent of every top-level resource.
pub const ROOT_NAME: &str = "root";

/// A `(name, category)` pair identifying a resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Singular name, e.g. `list`.
    pub name: String,
    /// Plural category as it appears in paths, e.g. `lists`.
    pub category: String,
}

impl Identity {
    /// Create a new identity.
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
        }
    }

    /// The root identity every unscoped collection hangs from.
    pub fn root() -> Self {
        Self::new(ROOT_NAME, ROOT_NAME)
    }

    /// True for the identity produced when nothing was resolved.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// True for the root identity.
    pub fn is_root(&self) -> bool {
        self.name == ROOT_NAME
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Identity {}|{}>", self.name, self.category)
    }
}

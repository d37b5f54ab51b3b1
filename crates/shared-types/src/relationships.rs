//! # Relationships
//!
//! The relationship registry declares, per identity, which operations are
//! permitted and under which parents. It is built once at startup through
//! [`RelationshipsBuilder`] and only queried afterwards.
//!
//! ```rust,ignore
//! let registry = RelationshipsRegistry::builder()
//!     .identity(list.clone(), Relationship::new().retrieve().update().delete()
//!         .create_under(&Identity::root())
//!         .retrieve_many_under(&Identity::root()))
//!     .build()?;
//! ```

use crate::identity::Identity;
use crate::operation::Operation;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors raised while building a registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelationshipError {
    /// The same identity name was declared twice.
    #[error("identity {0} declared twice")]
    DuplicateIdentity(String),

    /// Two identities share a category.
    #[error("category {0} declared twice")]
    DuplicateCategory(String),
}

/// Operations permitted on one identity.
///
/// Operations addressed at a single object are plain flags. Collection
/// operations are keyed by the name of the allowed parent identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationship {
    allows_retrieve: bool,
    allows_update: bool,
    allows_delete: bool,
    allows_create: HashSet<String>,
    allows_retrieve_many: HashSet<String>,
    allows_info: HashSet<String>,
    allows_patch: HashSet<String>,
}

impl Relationship {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retrieve(mut self) -> Self {
        self.allows_retrieve = true;
        self
    }

    pub fn update(mut self) -> Self {
        self.allows_update = true;
        self
    }

    pub fn delete(mut self) -> Self {
        self.allows_delete = true;
        self
    }

    pub fn create_under(mut self, parent: &Identity) -> Self {
        self.allows_create.insert(parent.name.clone());
        self
    }

    pub fn retrieve_many_under(mut self, parent: &Identity) -> Self {
        self.allows_retrieve_many.insert(parent.name.clone());
        self
    }

    pub fn info_under(mut self, parent: &Identity) -> Self {
        self.allows_info.insert(parent.name.clone());
        self
    }

    pub fn patch_under(mut self, parent: &Identity) -> Self {
        self.allows_patch.insert(parent.name.clone());
        self
    }

    /// Check whether `operation` is permitted, under `parent` for scoped
    /// operations. A scoped operation without a parent is never permitted.
    pub fn allows(&self, operation: Operation, parent: Option<&Identity>) -> bool {
        let scoped = |set: &HashSet<String>| parent.is_some_and(|p| set.contains(&p.name));

        match operation {
            Operation::Retrieve => self.allows_retrieve,
            Operation::Update => self.allows_update,
            Operation::Delete => self.allows_delete,
            Operation::Create => scoped(&self.allows_create),
            Operation::RetrieveMany => scoped(&self.allows_retrieve_many),
            Operation::Info => scoped(&self.allows_info),
            Operation::Patch => scoped(&self.allows_patch),
        }
    }
}

/// Read-only registry of identities and their relationships.
#[derive(Debug, Clone, Default)]
pub struct RelationshipsRegistry {
    relationships: HashMap<String, Relationship>,
    by_category: HashMap<String, Identity>,
}

impl RelationshipsRegistry {
    pub fn builder() -> RelationshipsBuilder {
        RelationshipsBuilder::default()
    }

    /// Resolve a path category to its identity. The root category always
    /// resolves.
    pub fn identity_from_category(&self, category: &str) -> Option<Identity> {
        if category == crate::identity::ROOT_NAME {
            return Some(Identity::root());
        }
        self.by_category.get(category).cloned()
    }

    /// Relationship declared for `identity`, if any.
    pub fn relationship(&self, identity: &Identity) -> Option<&Relationship> {
        self.relationships.get(&identity.name)
    }

    /// Query the registry. Unknown identities permit nothing.
    pub fn is_allowed(
        &self,
        identity: &Identity,
        parent: Option<&Identity>,
        operation: Operation,
    ) -> bool {
        self.relationship(identity)
            .is_some_and(|r| r.allows(operation, parent))
    }

    /// Number of declared identities.
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }
}

/// Builder for [`RelationshipsRegistry`].
#[derive(Debug, Default)]
pub struct RelationshipsBuilder {
    entries: Vec<(Identity, Relationship)>,
}

impl RelationshipsBuilder {
    /// Declare an identity and what it allows.
    pub fn identity(mut self, identity: Identity, relationship: Relationship) -> Self {
        self.entries.push((identity, relationship));
        self
    }

    pub fn build(self) -> Result<RelationshipsRegistry, RelationshipError> {
        let mut registry = RelationshipsRegistry::default();

        for (identity, relationship) in self.entries {
            if registry.relationships.contains_key(&identity.name) {
                return Err(RelationshipError::DuplicateIdentity(identity.name));
            }
            if registry.by_category.contains_key(&identity.category) {
                return Err(RelationshipError::DuplicateCategory(identity.category));
            }
            registry
                .by_category
                .insert(identity.category.clone(), identity.clone());
            registry.relationships.insert(identity.name, relationship);
        }

        Ok(registry)
    }
}

/// Registries keyed by API version.
///
/// Unversioned requests use version `0`.
#[derive(Debug, Clone, Default)]
pub struct VersionedRelationships {
    versions: HashMap<u32, RelationshipsRegistry>,
}

impl VersionedRelationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single registry served for version `0`.
    pub fn single(registry: RelationshipsRegistry) -> Self {
        Self::new().with_version(0, registry)
    }

    pub fn with_version(mut self, version: u32, registry: RelationshipsRegistry) -> Self {
        self.versions.insert(version, registry);
        self
    }

    pub fn get(&self, version: u32) -> Option<&RelationshipsRegistry> {
        self.versions.get(&version)
    }

    /// Query a version. Unknown versions permit nothing.
    pub fn is_allowed(
        &self,
        version: u32,
        identity: &Identity,
        parent: Option<&Identity>,
        operation: Operation,
    ) -> bool {
        self.get(version)
            .is_some_and(|r| r.is_allowed(identity, parent, operation))
    }

    /// Configured versions, ascending.
    pub fn versions(&self) -> Vec<u32> {
        let mut versions: Vec<u32> = self.versions.keys().copied().collect();
        versions.sort_unstable();
        versions
    }
}

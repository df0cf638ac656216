//! XMPP addresses (JIDs).
//!
//! An [`Entity`] is the structured form of `local@domain/resource`. The
//! bare form (`local@domain`) identifies an account; the full form
//! (with a resource) identifies one specific live connection. A
//! resource-qualified address is only meaningful while that resource is
//! bound in the [`ResourceRegistry`](crate::registry::ResourceRegistry).

use crate::error::AddrError;
use std::fmt;
use std::str::FromStr;

/// A structured XMPP address of the form `local@domain/resource`.
///
/// `local` and `resource` are optional; `domain` is always present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    local: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Entity {
    /// Build an entity from its parts. Parts must be non-empty when given.
    pub fn new(
        local: Option<&str>,
        domain: &str,
        resource: Option<&str>,
    ) -> Result<Self, AddrError> {
        if domain.is_empty() {
            return Err(AddrError::EmptyPart("domain"));
        }
        if local.is_some_and(str::is_empty) {
            return Err(AddrError::EmptyPart("local"));
        }
        if resource.is_some_and(str::is_empty) {
            return Err(AddrError::EmptyPart("resource"));
        }
        Ok(Self {
            local: local.map(str::to_string),
            domain: domain.to_string(),
            resource: resource.map(str::to_string),
        })
    }

    /// Parse `local@domain/resource` text. The local and resource parts
    /// are optional; a bare domain is a valid server address.
    pub fn parse(text: &str) -> Result<Self, AddrError> {
        if text.is_empty() {
            return Err(AddrError::Empty);
        }
        let (before, resource) = match text.split_once('/') {
            Some((before, resource)) => (before, Some(resource)),
            None => (text, None),
        };
        let (local, domain) = match before.split_once('@') {
            Some((local, domain)) => (Some(local), domain),
            None => (None, before),
        };
        // '@' in the domain part means a second separator slipped through
        if domain.contains('@') {
            return Err(AddrError::Malformed(text.to_string()));
        }
        Self::new(local, domain, resource).map_err(|_| AddrError::Malformed(text.to_string()))
    }

    /// The account-local part, if any.
    pub fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    /// The domain part.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The resource part, if any.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Whether this address carries a resource part.
    pub fn is_full(&self) -> bool {
        self.resource.is_some()
    }

    /// The bare projection (`local@domain`) of this address.
    pub fn bare(&self) -> Entity {
        Entity {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    /// A copy of this address qualified with the given resource.
    pub fn with_resource(&self, resource: &str) -> Result<Entity, AddrError> {
        Entity::new(self.local.as_deref(), &self.domain, Some(resource))
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(local) = &self.local {
            write!(f, "{local}@")?;
        }
        write!(f, "{}", self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}

impl FromStr for Entity {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Entity::parse(s)
    }
}

//! Protocol addresses (`node@domain/resource`).
//!
//! Parts are normalized with the stringprep profiles from the `jid` crate,
//! so `Juliet@Capulet.LIT` and `juliet@capulet.lit` are the same entity.
//! Resources keep their case.

use crate::error::JidError;
use std::fmt;
use std::str::FromStr;

/// Maximum byte length of each address part
pub const MAX_PART_LEN: usize = 1023;

/// A protocol address.
///
/// `node` and `resource` are optional; `domain` is always present. The
/// stored parts are already normalized, so derived equality and hashing
/// compare addresses the way routing needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    node: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Entity {
    /// Create an entity from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`JidError`] if a part is empty or too long, contains a
    /// separator character, or fails normalization.
    pub fn new(node: Option<&str>, domain: &str, resource: Option<&str>) -> Result<Self, JidError> {
        if let Some(node) = node {
            check_part("node", node)?;
            if node.contains(['@', '/']) {
                return Err(JidError::InvalidCharacter("node"));
            }
        }
        check_part("domain", domain)?;
        if domain.contains(['@', '/']) {
            return Err(JidError::InvalidCharacter("domain"));
        }
        if let Some(resource) = resource {
            check_part("resource", resource)?;
        }

        let mut raw = String::with_capacity(
            domain.len() + node.map_or(0, |n| n.len() + 1) + resource.map_or(0, |r| r.len() + 1),
        );
        if let Some(node) = node {
            raw.push_str(node);
            raw.push('@');
        }
        raw.push_str(domain);
        if let Some(resource) = resource {
            raw.push('/');
            raw.push_str(resource);
        }

        let prepared = ::jid::Jid::new(&raw).map_err(|e| JidError::Invalid(e.to_string()))?;
        Ok(Self {
            node: prepared.node().map(|n| n.to_string()),
            domain: prepared.domain().to_string(),
            resource: prepared.resource().map(|r| r.to_string()),
        })
    }

    /// Create a domain-only entity
    ///
    /// # Errors
    ///
    /// See [`Entity::new`].
    pub fn domain_only(domain: &str) -> Result<Self, JidError> {
        Self::new(None, domain, None)
    }

    /// Local part
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Domain part
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Resource part
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Whether the entity has no resource
    #[must_use]
    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }

    /// The entity without its resource
    #[must_use]
    pub fn bare(&self) -> Self {
        Self {
            node: self.node.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    /// The same bare entity with a different resource
    ///
    /// # Errors
    ///
    /// Returns [`JidError`] if `resource` is not a valid resource part.
    pub fn with_resource(&self, resource: &str) -> Result<Self, JidError> {
        Self::new(self.node.as_deref(), &self.domain, Some(resource))
    }

    /// The domain of this entity as an entity of its own
    #[must_use]
    pub fn domain_entity(&self) -> Self {
        Self {
            node: None,
            domain: self.domain.clone(),
            resource: None,
        }
    }
}

fn check_part(part: &'static str, value: &str) -> Result<(), JidError> {
    if value.is_empty() {
        return Err(JidError::EmptyPart(part));
    }
    if value.len() > MAX_PART_LEN {
        return Err(JidError::TooLong(part));
    }
    if value.chars().any(char::is_control) {
        return Err(JidError::InvalidCharacter(part));
    }
    Ok(())
}

impl FromStr for Entity {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (without_resource, resource) = match s.split_once('/') {
            Some((head, resource)) => (head, Some(resource)),
            None => (s, None),
        };
        let (node, domain) = match without_resource.split_once('@') {
            Some((node, domain)) => (Some(node), domain),
            None => (None, without_resource),
        };
        Self::new(node, domain, resource)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(node) = &self.node {
            write!(f, "{node}@")?;
        }
        f.write_str(&self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}

//! User credential storage seams.
//!
//! Storage itself is outside the protocol core; the server plugs in a
//! backend through [`UserAuthentication`] and [`AccountManagement`].
//! [`InMemoryAccounts`] backs tests and the default server configuration.

use crate::jid::Entity;
use corvid_crypto::constant_time::ct_eq_str;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use zeroize::Zeroizing;

/// Account backend errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    /// An account with this address already exists
    #[error("account {0} already exists")]
    AlreadyExists(String),

    /// Address or password not acceptable
    #[error("invalid account: {0}")]
    Invalid(&'static str),
}

/// Checks credentials presented during SASL
pub trait UserAuthentication: Send + Sync {
    /// Whether `password` is correct for the bare entity `user`
    fn verify_credentials(&self, user: &Entity, password: &str) -> bool;
}

/// Creates accounts for in-band registration
pub trait AccountManagement: Send + Sync {
    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::AlreadyExists`] if the address is taken.
    fn add_user(&self, user: &Entity, password: &str) -> Result<(), AccountError>;

    /// Whether an account exists
    fn exists(&self, user: &Entity) -> bool;
}

/// Accounts held in process memory
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    users: DashMap<Entity, Zeroizing<String>>,
}

impl InMemoryAccounts {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account.
    ///
    /// # Errors
    ///
    /// See [`AccountManagement::add_user`].
    pub fn add(&self, user: Entity, password: &str) -> Result<(), AccountError> {
        if user.node().is_none() {
            return Err(AccountError::Invalid("address has no node part"));
        }
        if password.is_empty() {
            return Err(AccountError::Invalid("empty password"));
        }
        match self.users.entry(user.bare()) {
            Entry::Occupied(e) => Err(AccountError::AlreadyExists(e.key().to_string())),
            Entry::Vacant(e) => {
                tracing::info!(user = %e.key(), "Account created");
                e.insert(Zeroizing::new(password.to_string()));
                Ok(())
            }
        }
    }

    /// Number of accounts
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserAuthentication for InMemoryAccounts {
    fn verify_credentials(&self, user: &Entity, password: &str) -> bool {
        self.users
            .get(&user.bare())
            .is_some_and(|stored| ct_eq_str(stored.as_str(), password))
    }
}

impl AccountManagement for InMemoryAccounts {
    fn add_user(&self, user: &Entity, password: &str) -> Result<(), AccountError> {
        self.add(user.clone(), password)
    }

    fn exists(&self, user: &Entity) -> bool {
        self.users.contains_key(&user.bare())
    }
}

//! Bound sessions by full address, used to route stanzas between sessions.

use corvid_core::{Entity, RelayError, StanzaRelay};
use corvid_xml::Element;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Stanzas queued for one session before delivery starts failing
pub const DELIVERY_QUEUE_DEPTH: usize = 256;

/// Sender half of a session's delivery queue
pub type DeliverySender = mpsc::Sender<Element>;

/// Registry of bound sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Entity, DeliverySender>,
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route stanzas for `entity` to `sender`.
    ///
    /// Returns `false` without changing anything if another live session
    /// already holds `entity`. A binding whose session has gone away is
    /// replaced.
    pub fn register(&self, entity: Entity, sender: DeliverySender) -> bool {
        match self.sessions.entry(entity) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_closed() {
                    tracing::debug!(entity = %occupied.key(), "Address already bound by a live session");
                    return false;
                }
                tracing::debug!(entity = %occupied.key(), "Replacing stale session binding");
                occupied.insert(sender);
                true
            }
            Entry::Vacant(vacant) => {
                tracing::debug!(entity = %vacant.key(), "Session registered");
                vacant.insert(sender);
                true
            }
        }
    }

    /// Stop routing to `entity` if it is still bound to `sender`
    pub fn unregister(&self, entity: &Entity, sender: &DeliverySender) {
        if self
            .sessions
            .remove_if(entity, |_, bound| bound.same_channel(sender))
            .is_some()
        {
            tracing::debug!(%entity, "Session unregistered");
        }
    }

    /// Number of bound sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn send(&self, to: &Entity, sender: &DeliverySender, stanza: Element) -> Result<(), RelayError> {
        sender.try_send(stanza).map_err(|e| match e {
            TrySendError::Full(_) => {
                tracing::warn!(%to, "Delivery queue full");
                RelayError::NotFound(to.to_string())
            }
            TrySendError::Closed(_) => RelayError::Closed(to.to_string()),
        })
    }
}

impl StanzaRelay for SessionRegistry {
    /// Full addresses go to that resource; bare addresses go to every
    /// resource of the account.
    fn relay(&self, to: &Entity, stanza: Element) -> Result<(), RelayError> {
        if !to.is_bare() {
            let Some(sender) = self.sessions.get(to).map(|s| s.value().clone()) else {
                return Err(RelayError::NotFound(to.to_string()));
            };
            return self.send(to, &sender, stanza);
        }

        let targets: Vec<(Entity, DeliverySender)> = self
            .sessions
            .iter()
            .filter(|entry| &entry.key().bare() == to)
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        if targets.is_empty() {
            return Err(RelayError::NotFound(to.to_string()));
        }

        let mut delivered = false;
        for (entity, sender) in &targets {
            delivered |= self.send(entity, sender, stanza.clone()).is_ok();
        }
        if delivered {
            Ok(())
        } else {
            Err(RelayError::Closed(to.to_string()))
        }
    }

    fn is_bound(&self, entity: &Entity) -> bool {
        self.sessions.contains_key(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(s: &str) -> Entity {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_full_address_delivery() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        assert!(registry.register(entity("juliet@capulet.lit/balcony"), tx));
        assert!(registry.is_bound(&entity("juliet@capulet.lit/balcony")));

        registry
            .relay(&entity("juliet@capulet.lit/balcony"), Element::new("message"))
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().name(), "message");

        assert_eq!(
            registry.relay(&entity("juliet@capulet.lit/tomb"), Element::new("message")),
            Err(RelayError::NotFound("juliet@capulet.lit/tomb".to_string()))
        );
    }

    #[tokio::test]
    async fn test_bare_address_fans_out() {
        let registry = SessionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        assert!(registry.register(entity("juliet@capulet.lit/balcony"), tx1));
        assert!(registry.register(entity("juliet@capulet.lit/chamber"), tx2));

        registry
            .relay(&entity("juliet@capulet.lit"), Element::new("message"))
            .unwrap();
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[test]
    fn test_closed_session() {
        let registry = SessionRegistry::new();
        let (tx, rx) = mpsc::channel(4);
        assert!(registry.register(entity("romeo@montague.lit/orchard"), tx.clone()));
        drop(rx);
        assert_eq!(
            registry.relay(&entity("romeo@montague.lit/orchard"), Element::new("message")),
            Err(RelayError::Closed("romeo@montague.lit/orchard".to_string()))
        );

        registry.unregister(&entity("romeo@montague.lit/orchard"), &tx);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_second_live_session_cannot_take_address() {
        let registry = SessionRegistry::new();
        let address = entity("juliet@capulet.lit/x");
        let (first_tx, mut first_rx) = mpsc::channel(4);
        let (second_tx, _second_rx) = mpsc::channel(4);

        assert!(registry.register(address.clone(), first_tx.clone()));
        assert!(!registry.register(address.clone(), second_tx.clone()));

        // The loser going away must not drop the winner's route
        registry.unregister(&address, &second_tx);
        registry.relay(&address, Element::new("message")).unwrap();
        assert!(first_rx.recv().await.is_some());

        registry.unregister(&address, &first_tx);
        assert!(!registry.is_bound(&address));
    }

    #[tokio::test]
    async fn test_stale_binding_is_replaced() {
        let registry = SessionRegistry::new();
        let address = entity("juliet@capulet.lit/x");
        let (old_tx, old_rx) = mpsc::channel(4);
        let (new_tx, mut new_rx) = mpsc::channel(4);

        assert!(registry.register(address.clone(), old_tx.clone()));
        drop(old_rx);
        assert!(registry.register(address.clone(), new_tx));

        registry.unregister(&address, &old_tx);
        registry.relay(&address, Element::new("message")).unwrap();
        assert!(new_rx.recv().await.is_some());
    }
}

//! Seams to the rest of the server: stanza delivery and outbound
//! dialback verification.

use crate::jid::Entity;
use corvid_crypto::DialbackKey;
use corvid_xml::Element;
use thiserror::Error;
use tokio::sync::oneshot;

/// Delivery failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// No session is available for the recipient
    #[error("recipient {0} not available")]
    NotFound(String),

    /// The recipient's session is shutting down
    #[error("recipient {0} is closing")]
    Closed(String),
}

/// Delivers stanzas to other sessions
pub trait StanzaRelay: Send + Sync {
    /// Deliver `stanza` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] if no session can take the stanza.
    fn relay(&self, to: &Entity, stanza: Element) -> Result<(), RelayError>;

    /// Whether a session is bound to the full entity `entity`
    fn is_bound(&self, entity: &Entity) -> bool;
}

/// Relay that delivers nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRelay;

impl StanzaRelay for NullRelay {
    fn relay(&self, to: &Entity, _stanza: Element) -> Result<(), RelayError> {
        Err(RelayError::NotFound(to.to_string()))
    }

    fn is_bound(&self, _entity: &Entity) -> bool {
        false
    }
}

/// A `db:verify` the receiving server sends to the authoritative server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialbackRequest {
    /// This server's domain
    pub receiving: String,
    /// Domain the peer claims to speak for
    pub originating: String,
    /// Id of the stream the key was presented on
    pub stream_id: String,
    /// Key presented in `db:result`
    pub key: String,
}

impl DialbackRequest {
    /// The `db:verify` element sent to the authoritative server
    #[must_use]
    pub fn to_element(&self) -> Element {
        crate::responses::dialback_verify_request(
            &self.receiving,
            &self.originating,
            &self.stream_id,
            &self.key,
        )
    }
}

/// Answer from the authoritative server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialbackVerdict {
    /// Key verified
    Valid,
    /// Key rejected
    Invalid,
}

/// Verification failures before a verdict was obtained
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    /// Could not reach the authoritative server
    #[error("cannot reach {0}")]
    Unreachable(String),

    /// The authoritative server answered with something unexpected
    #[error("protocol error from {domain}: {reason}")]
    Protocol {
        /// Authoritative domain
        domain: String,
        /// What went wrong
        reason: String,
    },

    /// The verification task went away without answering
    #[error("verification cancelled")]
    Cancelled,
}

/// Pending verification result
pub type VerdictReceiver = oneshot::Receiver<Result<DialbackVerdict, ConnectorError>>;

/// Opens outbound connections to authoritative servers
pub trait ServerConnector: Send + Sync {
    /// Start verifying `request`; the verdict arrives on the returned channel
    fn verify(&self, request: DialbackRequest) -> VerdictReceiver;
}

/// Connector that answers from a local key, as if every peer were
/// authoritative with the same secret.
///
/// Used for single-process deployments and tests.
#[derive(Debug)]
pub struct LoopbackConnector {
    key: DialbackKey,
}

impl LoopbackConnector {
    /// Verify against `key`
    #[must_use]
    pub fn new(key: DialbackKey) -> Self {
        Self { key }
    }
}

impl ServerConnector for LoopbackConnector {
    fn verify(&self, request: DialbackRequest) -> VerdictReceiver {
        let (tx, rx) = oneshot::channel();
        let valid = self.key.verify(
            &request.key,
            &request.receiving,
            &request.originating,
            &request.stream_id,
        );
        let verdict = if valid {
            DialbackVerdict::Valid
        } else {
            DialbackVerdict::Invalid
        };
        let _ = tx.send(Ok(verdict));
        rx
    }
}

/// Connector with no outbound capability; every verification fails
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConnector;

impl ServerConnector for NoConnector {
    fn verify(&self, request: DialbackRequest) -> VerdictReceiver {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(ConnectorError::Unreachable(request.originating)));
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(token_key: &str) -> DialbackRequest {
        DialbackRequest {
            receiving: "capulet.lit".to_string(),
            originating: "montague.lit".to_string(),
            stream_id: "s1".to_string(),
            key: token_key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_loopback_connector() {
        let key = DialbackKey::from_secret(b"shared").unwrap();
        let token = key.token("capulet.lit", "montague.lit", "s1");
        let connector = LoopbackConnector::new(DialbackKey::from_secret(b"shared").unwrap());

        let verdict = connector.verify(request(token.as_str())).await.unwrap();
        assert_eq!(verdict, Ok(DialbackVerdict::Valid));

        let verdict = connector.verify(request("00")).await.unwrap();
        assert_eq!(verdict, Ok(DialbackVerdict::Invalid));
    }

    #[tokio::test]
    async fn test_no_connector() {
        let verdict = NoConnector.verify(request("00")).await.unwrap();
        assert_eq!(verdict, Err(ConnectorError::Unreachable("montague.lit".to_string())));
    }

    #[test]
    fn test_request_element() {
        let req = DialbackRequest {
            receiving: "capulet.lit".to_string(),
            originating: "montague.lit".to_string(),
            stream_id: "s1".to_string(),
            key: "abcd".to_string(),
        };
        let el = req.to_element();
        assert_eq!(el.qualified_name(), "db:verify");
        assert_eq!(el.attribute("from"), Some("capulet.lit"));
        assert_eq!(el.attribute("to"), Some("montague.lit"));
        assert_eq!(el.attribute("id"), Some("s1"));
        assert_eq!(el.text(), "abcd");
    }
}

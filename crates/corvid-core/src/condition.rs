//! Defined error conditions for streams, stanzas, and SASL.

use std::fmt;

/// Stream-level error conditions (`urn:ietf:params:xml:ns:xmpp-streams`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamErrorCondition {
    /// Malformed XML that still parsed
    BadFormat,
    /// Idle peer
    ConnectionTimeout,
    /// Another session took over this address
    Conflict,
    /// `to` names a domain this server does not serve
    HostUnknown,
    /// Unexpected server fault
    InternalServerError,
    /// `from` on the stream header is not acceptable
    InvalidFrom,
    /// Stream or content namespace is wrong
    InvalidNamespace,
    /// Stanza sent before authentication
    NotAuthorized,
    /// XML is not well-formed
    NotWellFormed,
    /// Local policy violated (e.g. too many failed logins)
    PolicyViolation,
    /// Resource limit reached
    ResourceConstraint,
    /// Server is going down
    SystemShutdown,
    /// Top-level element the server cannot handle here
    UnsupportedStanzaType,
    /// Stream `version` not supported
    UnsupportedVersion,
}

impl StreamErrorCondition {
    /// Element name of the condition
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadFormat => "bad-format",
            Self::ConnectionTimeout => "connection-timeout",
            Self::Conflict => "conflict",
            Self::HostUnknown => "host-unknown",
            Self::InternalServerError => "internal-server-error",
            Self::InvalidFrom => "invalid-from",
            Self::InvalidNamespace => "invalid-namespace",
            Self::NotAuthorized => "not-authorized",
            Self::NotWellFormed => "not-well-formed",
            Self::PolicyViolation => "policy-violation",
            Self::ResourceConstraint => "resource-constraint",
            Self::SystemShutdown => "system-shutdown",
            Self::UnsupportedStanzaType => "unsupported-stanza-type",
            Self::UnsupportedVersion => "unsupported-version",
        }
    }
}

impl fmt::Display for StreamErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stanza-level error conditions (`urn:ietf:params:xml:ns:xmpp-stanzas`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StanzaErrorCondition {
    /// Malformed or incomplete request
    BadRequest,
    /// Resource or account already exists
    Conflict,
    /// Feature not implemented by the server
    FeatureNotImplemented,
    /// Unexpected server fault
    InternalServerError,
    /// Addressed entity does not exist
    ItemNotFound,
    /// Request is not acceptable
    NotAcceptable,
    /// Action not permitted for anyone
    NotAllowed,
    /// Sender must authenticate first
    NotAuthorized,
    /// Recipient or service unavailable
    ServiceUnavailable,
    /// Sender address is not the one the stream authenticated
    UnknownSender,
    /// Request makes no sense at this point
    UnexpectedRequest,
}

impl StanzaErrorCondition {
    /// Element name of the condition
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::Conflict => "conflict",
            Self::FeatureNotImplemented => "feature-not-implemented",
            Self::InternalServerError => "internal-server-error",
            Self::ItemNotFound => "item-not-found",
            Self::NotAcceptable => "not-acceptable",
            Self::NotAllowed => "not-allowed",
            Self::NotAuthorized => "not-authorized",
            Self::ServiceUnavailable => "service-unavailable",
            Self::UnknownSender => "unknown-sender",
            Self::UnexpectedRequest => "unexpected-request",
        }
    }

    /// Error type paired with the condition when none is given explicitly
    #[must_use]
    pub fn default_type(self) -> StanzaErrorType {
        match self {
            Self::BadRequest | Self::NotAcceptable | Self::UnknownSender => StanzaErrorType::Modify,
            Self::NotAuthorized => StanzaErrorType::Auth,
            Self::InternalServerError | Self::UnexpectedRequest => StanzaErrorType::Wait,
            Self::Conflict
            | Self::FeatureNotImplemented
            | Self::ItemNotFound
            | Self::NotAllowed
            | Self::ServiceUnavailable => StanzaErrorType::Cancel,
        }
    }
}

impl fmt::Display for StanzaErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `type` attribute of a stanza `<error/>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StanzaErrorType {
    /// Retry after providing credentials
    Auth,
    /// Do not retry
    Cancel,
    /// Proceed, warning only
    Continue,
    /// Retry after changing the data sent
    Modify,
    /// Retry after waiting
    Wait,
}

impl StanzaErrorType {
    /// Attribute value
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Cancel => "cancel",
            Self::Continue => "continue",
            Self::Modify => "modify",
            Self::Wait => "wait",
        }
    }
}

/// SASL `<failure/>` conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaslCondition {
    /// Client aborted the exchange
    Aborted,
    /// Stream must be encrypted before authenticating
    EncryptionRequired,
    /// Mechanism not offered
    InvalidMechanism,
    /// Payload could not be processed
    MalformedRequest,
    /// Credentials rejected
    NotAuthorized,
    /// Server-side fault
    TemporaryAuthFailure,
}

impl SaslCondition {
    /// Element name of the condition
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aborted => "aborted",
            Self::EncryptionRequired => "encryption-required",
            Self::InvalidMechanism => "invalid-mechanism",
            Self::MalformedRequest => "malformed-request",
            Self::NotAuthorized => "not-authorized",
            Self::TemporaryAuthFailure => "temporary-auth-failure",
        }
    }
}

impl fmt::Display for SaslCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

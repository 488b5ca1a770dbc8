//! Error types for XML stream decoding.

use thiserror::Error;

/// Framing errors raised while tokenizing or assembling an XML stream.
///
/// Every variant is fatal for the stream it was raised on: the session
/// driver answers with a stream error and closes the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XmlError {
    /// Close tag with no open element
    #[error("unexpected close tag </{0}>")]
    UnexpectedClose(String),

    /// Close tag not matching the innermost open element
    #[error("mismatched close tag: expected </{expected}>, found </{found}>")]
    MismatchedClose {
        /// Qualified name of the innermost open element
        expected: String,
        /// Qualified name carried by the close tag
        found: String,
    },

    /// Tag that cannot be parsed (missing name, broken attribute syntax)
    #[error("malformed tag: {0}")]
    MalformedTag(String),

    /// Element or attribute name that is not permitted
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Namespace prefix used without a declaration in scope
    #[error("unbound namespace prefix: {0}")]
    UnboundPrefix(String),

    /// Particle bytes are not valid UTF-8
    #[error("invalid UTF-8 in stream")]
    InvalidUtf8,

    /// Unknown or malformed entity reference
    #[error("invalid entity reference: &{0};")]
    InvalidEntity(String),

    /// Unconsumed input grew past the configured limit
    #[error("buffer overflow: {size} bytes pending, limit is {limit}")]
    BufferOverflow {
        /// Bytes currently buffered
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Constructs the stream protocol forbids (DTDs, entity declarations)
    #[error("unsupported XML construct: {0}")]
    Unsupported(&'static str),
}

impl XmlError {
    /// Whether the error stems from malformed syntax rather than a policy limit.
    #[must_use]
    pub fn is_syntax(&self) -> bool {
        !matches!(self, Self::BufferOverflow { .. } | Self::Unsupported(_))
    }
}

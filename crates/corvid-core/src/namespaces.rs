//! Namespace URIs used by the stream protocol.

/// Client-to-server stanza namespace
pub const JABBER_CLIENT: &str = "jabber:client";
/// Server-to-server stanza namespace
pub const JABBER_SERVER: &str = "jabber:server";
/// Server dialback
pub const JABBER_SERVER_DIALBACK: &str = "jabber:server:dialback";
/// Stream element namespace
pub const STREAMS: &str = "http://etherx.jabber.org/streams";
/// Stream error conditions
pub const XMPP_STREAMS: &str = "urn:ietf:params:xml:ns:xmpp-streams";
/// Stanza error conditions
pub const XMPP_STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
/// SASL negotiation
pub const XMPP_SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
/// STARTTLS negotiation
pub const XMPP_TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";
/// Resource binding
pub const XMPP_BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
/// Session establishment
pub const XMPP_SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
/// XMPP ping
pub const XMPP_PING: &str = "urn:xmpp:ping";
/// Dialback stream feature
pub const FEATURES_DIALBACK: &str = "urn:xmpp:features:dialback";
/// In-band registration
pub const JABBER_IQ_REGISTER: &str = "jabber:iq:register";
/// In-band registration stream feature
pub const FEATURES_REGISTER: &str = "http://jabber.org/features/iq-register";

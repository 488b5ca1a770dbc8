//! Per-stanza processing: lookup, state admission, sender checks, execution.

use crate::condition::{StanzaErrorCondition, StanzaErrorType};
use crate::context::ServerContext;
use crate::error::ProtocolError;
use crate::handler::{Action, HandlerContext};
use crate::session::Session;
use crate::stanza;
use crate::state::{HandlerKind, StreamMode};
use corvid_xml::Element;
use std::borrow::Cow;

/// Run `stanza` through the handler the dispatcher selects for it.
///
/// # Errors
///
/// - [`ProtocolError::SessionEnded`] if the session is no longer live
/// - [`ProtocolError::NoHandler`] if nothing handles the element
/// - [`ProtocolError::UnsupportedInState`] if the state forbids the handler
/// - whatever the sender checks or the handler report
pub fn process(
    stanza: &Element,
    session: &mut Session,
    server: &ServerContext,
) -> Result<Vec<Action>, ProtocolError> {
    if !session.state().is_live() {
        return Err(ProtocolError::SessionEnded);
    }

    let Some(handler) = server.dispatcher().lookup(stanza) else {
        return Err(ProtocolError::NoHandler {
            name: stanza.name().to_string(),
            namespace: stanza.namespace_uri().map(str::to_string),
        });
    };

    if !session.state().admits(handler.kind(), session.mode()) {
        session.stats_mut().stanzas_rejected += 1;
        tracing::debug!(
            session = %session.id(),
            state = ?session.state(),
            handler = handler.name(),
            "Handler not admitted in current state"
        );
        return Err(ProtocolError::UnsupportedInState {
            state: session.state(),
            handler: handler.name(),
        });
    }

    let stanza = if handler.kind() == HandlerKind::Stanza {
        match check_sender(stanza, session, server.domain().domain()) {
            Ok(stanza) => stanza,
            Err(e) => {
                session.stats_mut().stanzas_rejected += 1;
                return Err(e);
            }
        }
    } else {
        Cow::Borrowed(stanza)
    };

    tracing::trace!(session = %session.id(), handler = handler.name(), "Executing handler");
    let mut ctx = HandlerContext::new(session, server);
    handler.execute(&stanza, &mut ctx)
}

/// Validate the sender of a core stanza and stamp `from` where the server
/// is responsible for it.
///
/// # Errors
///
/// `unknown-sender` when `from` names someone else; `bad-request` for
/// server-to-server stanzas without both addresses or addressed to a domain
/// other than `domain`.
pub fn check_sender<'a>(
    stanza: &'a Element,
    session: &Session,
    domain: &str,
) -> Result<Cow<'a, Element>, ProtocolError> {
    match session.mode() {
        StreamMode::Client => {
            let Some(bare) = session.authenticated_entity() else {
                return Err(ProtocolError::stanza(StanzaErrorCondition::NotAuthorized));
            };
            let own = session.bound_entity().unwrap_or(bare);
            if let Some(from) = stanza::address(stanza, "from")? {
                if &from != own && &from != bare {
                    return Err(ProtocolError::stanza(StanzaErrorCondition::UnknownSender));
                }
            }
            if stanza.attribute("from") == Some(own.to_string().as_str()) {
                return Ok(Cow::Borrowed(stanza));
            }
            let mut stamped = stanza.clone();
            stamped.set_attribute("from", own.to_string());
            Ok(Cow::Owned(stamped))
        }
        StreamMode::Server => {
            let (Some(from), Some(to)) = (
                stanza::address(stanza, "from")?,
                stanza::address(stanza, "to")?,
            ) else {
                return Err(ProtocolError::stanza(StanzaErrorCondition::BadRequest));
            };
            if !to.domain().eq_ignore_ascii_case(domain) {
                return Err(ProtocolError::stanza_with_text(
                    StanzaErrorCondition::BadRequest,
                    StanzaErrorType::Modify,
                    "invalid to attribute",
                ));
            }
            if !session.is_verified_domain(from.domain()) {
                return Err(ProtocolError::stanza(StanzaErrorCondition::UnknownSender));
            }
            Ok(Cow::Borrowed(stanza))
        }
    }
}

//! Fallback handlers for the core stanza kinds.
//!
//! Stanzas addressed to another entity are routed. Stanzas addressed to the
//! server that no payload handler claimed are answered with
//! `service-unavailable`, except `result`/`error` iqs and presence, which
//! need no answer.

use super::remote_recipient;
use crate::condition::StanzaErrorCondition;
use crate::error::ProtocolError;
use crate::handler::{Action, HandlerContext, StanzaHandler};
use crate::stanza::{self, StanzaKind};
use crate::state::HandlerKind;
use corvid_xml::Element;

fn route(stanza: &Element, ctx: &HandlerContext<'_>) -> Result<Option<Action>, ProtocolError> {
    Ok(remote_recipient(stanza, ctx)?.map(|to| Action::Route {
        to,
        stanza: stanza.clone(),
    }))
}

fn is_kind(stanza: &Element, kind: StanzaKind) -> bool {
    StanzaKind::of(stanza) == Some(kind)
}

/// `iq` with zero or several payloads
#[derive(Debug, Default, Clone, Copy)]
pub struct IqHandler;

impl StanzaHandler for IqHandler {
    fn name(&self) -> &'static str {
        "iq"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Stanza
    }

    fn verify(&self, stanza: &Element) -> bool {
        is_kind(stanza, StanzaKind::Iq)
    }

    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        if let Some(action) = route(stanza, ctx)? {
            return Ok(vec![action]);
        }
        if stanza::is_request(stanza) {
            return Err(ProtocolError::stanza(StanzaErrorCondition::ServiceUnavailable));
        }
        tracing::trace!(session = %ctx.session.id(), id = ?stanza.attribute("id"), "Swallowing iq response");
        Ok(Vec::new())
    }
}

/// `iq` whose payload namespace has no handler
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceUnavailableHandler;

impl StanzaHandler for ServiceUnavailableHandler {
    fn name(&self) -> &'static str {
        "service-unavailable"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Stanza
    }

    fn verify(&self, stanza: &Element) -> bool {
        is_kind(stanza, StanzaKind::Iq)
    }

    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        if let Some(action) = route(stanza, ctx)? {
            return Ok(vec![action]);
        }
        if stanza::is_request(stanza) {
            return Err(ProtocolError::stanza(StanzaErrorCondition::ServiceUnavailable));
        }
        Ok(Vec::new())
    }
}

/// Every `message`
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageHandler;

impl StanzaHandler for MessageHandler {
    fn name(&self) -> &'static str {
        "message"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Stanza
    }

    fn verify(&self, stanza: &Element) -> bool {
        is_kind(stanza, StanzaKind::Message)
    }

    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        if let Some(action) = route(stanza, ctx)? {
            return Ok(vec![action]);
        }
        if stanza.attribute("to").is_none() {
            tracing::debug!(session = %ctx.session.id(), "Dropping message without recipient");
            return Ok(Vec::new());
        }
        Err(ProtocolError::stanza(StanzaErrorCondition::ServiceUnavailable))
    }
}

/// Every `presence`
#[derive(Debug, Default, Clone, Copy)]
pub struct PresenceHandler;

impl StanzaHandler for PresenceHandler {
    fn name(&self) -> &'static str {
        "presence"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Stanza
    }

    fn verify(&self, stanza: &Element) -> bool {
        is_kind(stanza, StanzaKind::Presence)
    }

    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        if let Some(action) = route(stanza, ctx)? {
            return Ok(vec![action]);
        }
        tracing::trace!(
            session = %ctx.session.id(),
            kind = ?stanza.attribute("type"),
            "Presence accepted"
        );
        Ok(Vec::new())
    }
}

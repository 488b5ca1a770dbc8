//! Resource binding.

use super::{internal_error, iq_payload, is_iq_payload};
use crate::condition::StanzaErrorCondition;
use crate::error::ProtocolError;
use crate::handler::{Action, HandlerContext, StanzaHandler};
use crate::namespaces::XMPP_BIND;
use crate::responses;
use crate::state::{HandlerKind, StreamMode};
use corvid_xml::Element;

/// Handles `<iq type='set'><bind/></iq>`
#[derive(Debug, Default, Clone, Copy)]
pub struct BindHandler;

impl StanzaHandler for BindHandler {
    fn name(&self) -> &'static str {
        "bind"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Stanza
    }

    fn verify(&self, stanza: &Element) -> bool {
        is_iq_payload(stanza, "set", "bind", XMPP_BIND)
    }

    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        if ctx.session.mode() != StreamMode::Client {
            return Err(ProtocolError::stanza(StanzaErrorCondition::NotAllowed));
        }
        let Some(user) = ctx.session.authenticated_entity().cloned() else {
            return Err(ProtocolError::stanza(StanzaErrorCondition::NotAllowed));
        };
        if ctx.session.bound_entity().is_some() {
            return Err(ProtocolError::stanza(StanzaErrorCondition::NotAllowed));
        }

        let requested = iq_payload(stanza, "bind", XMPP_BIND)
            .and_then(|bind| bind.child("resource"))
            .map(|resource| resource.text().trim().to_string())
            .filter(|resource| !resource.is_empty());
        let resource = match requested {
            Some(resource) => resource,
            None => corvid_crypto::random::resource_id().map_err(internal_error)?,
        };

        let full = user
            .with_resource(&resource)
            .map_err(|_| ProtocolError::stanza(StanzaErrorCondition::BadRequest))?;
        if ctx.server.relay().is_bound(&full) {
            tracing::debug!(session = %ctx.session.id(), %full, "Resource already bound");
            return Err(ProtocolError::stanza(StanzaErrorCondition::Conflict));
        }

        ctx.session.bind(full.clone()).map_err(internal_error)?;
        tracing::info!(session = %ctx.session.id(), %full, "Resource bound");

        let payload = Element::builder("bind")
            .namespace(XMPP_BIND)
            .child(Element::builder("jid").text(&full.to_string()).build())
            .build();
        let mut reply = responses::iq_result(stanza, Some(payload));
        reply.remove_attribute("to");
        Ok(vec![Action::Send(reply), Action::Bound(full)])
    }
}

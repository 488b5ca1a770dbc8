//! In-band registration (XEP-0077), account creation only.

use super::iq_payload;
use crate::accounts::AccountError;
use crate::condition::{StanzaErrorCondition, StanzaErrorType};
use crate::error::ProtocolError;
use crate::handler::{Action, HandlerContext, StanzaHandler};
use crate::jid::Entity;
use crate::namespaces::JABBER_IQ_REGISTER;
use crate::responses;
use crate::state::{HandlerKind, StreamMode};
use corvid_xml::Element;

const INSTRUCTIONS: &str = "Choose a username and password for use with this service.";

/// Handles `<iq><query xmlns='jabber:iq:register'/></iq>`
#[derive(Debug, Default, Clone, Copy)]
pub struct RegisterHandler;

impl RegisterHandler {
    fn form(ctx: &HandlerContext<'_>) -> Element {
        let mut query = Element::builder("query").namespace(JABBER_IQ_REGISTER);
        match ctx.session.authenticated_entity().and_then(Entity::node) {
            Some(username) => {
                query = query
                    .child(Element::new("registered"))
                    .child(Element::builder("username").text(username).build());
            }
            None => {
                query = query
                    .child(Element::builder("instructions").text(INSTRUCTIONS).build())
                    .child(Element::new("username"));
            }
        }
        query.child(Element::new("password")).build()
    }

    fn create(query: &Element, ctx: &HandlerContext<'_>) -> Result<(), ProtocolError> {
        if query.child("remove").is_some() {
            return Err(ProtocolError::stanza(StanzaErrorCondition::FeatureNotImplemented));
        }
        if ctx.session.authenticated_entity().is_some() {
            return Err(ProtocolError::stanza(StanzaErrorCondition::NotAllowed));
        }
        let Some(accounts) = ctx.server.accounts() else {
            return Err(ProtocolError::stanza(StanzaErrorCondition::ServiceUnavailable));
        };

        let field = |name: &str| {
            query
                .child(name)
                .map(|el| el.text().trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let (Some(username), Some(password)) = (field("username"), field("password")) else {
            return Err(ProtocolError::stanza_with_text(
                StanzaErrorCondition::NotAcceptable,
                StanzaErrorType::Modify,
                "username and password are required",
            ));
        };

        let user = Entity::new(Some(&username), ctx.server.domain().domain(), None)
            .map_err(|_| ProtocolError::stanza(StanzaErrorCondition::NotAcceptable))?;
        accounts.add_user(&user, &password).map_err(|e| match e {
            AccountError::AlreadyExists(_) => ProtocolError::stanza(StanzaErrorCondition::Conflict),
            AccountError::Invalid(_) => ProtocolError::stanza(StanzaErrorCondition::NotAcceptable),
        })?;
        tracing::info!(session = %ctx.session.id(), %user, "Registered account");
        Ok(())
    }
}

impl StanzaHandler for RegisterHandler {
    fn name(&self) -> &'static str {
        "register"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Registration
    }

    fn verify(&self, stanza: &Element) -> bool {
        stanza.name() == "iq"
            && crate::stanza::is_request(stanza)
            && iq_payload(stanza, "query", JABBER_IQ_REGISTER).is_some()
    }

    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        if ctx.session.mode() != StreamMode::Client || ctx.server.accounts().is_none() {
            return Err(ProtocolError::stanza(StanzaErrorCondition::ServiceUnavailable));
        }
        let Some(query) = iq_payload(stanza, "query", JABBER_IQ_REGISTER) else {
            return Err(ProtocolError::stanza(StanzaErrorCondition::BadRequest));
        };

        match stanza.attribute("type") {
            Some("get") => Ok(vec![Action::Send(responses::iq_result(
                stanza,
                Some(Self::form(ctx)),
            ))]),
            _ => {
                Self::create(query, ctx)?;
                Ok(vec![Action::Send(responses::iq_result(stanza, None))])
            }
        }
    }
}

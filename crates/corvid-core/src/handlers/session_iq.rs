//! Session establishment (RFC 3921). Kept for older clients; always succeeds.

use super::is_iq_payload;
use crate::error::ProtocolError;
use crate::handler::{Action, HandlerContext, StanzaHandler};
use crate::namespaces::XMPP_SESSION;
use crate::responses;
use crate::state::HandlerKind;
use corvid_xml::Element;

/// Handles `<iq type='set'><session/></iq>`
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionIqHandler;

impl StanzaHandler for SessionIqHandler {
    fn name(&self) -> &'static str {
        "session"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Stanza
    }

    fn verify(&self, stanza: &Element) -> bool {
        is_iq_payload(stanza, "set", "session", XMPP_SESSION)
    }

    fn execute(
        &self,
        stanza: &Element,
        _ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        Ok(vec![Action::Send(responses::iq_result(stanza, None))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{server, session_in};
    use crate::state::{SessionState, StreamMode};

    #[test]
    fn test_session_result() {
        let server = server();
        let mut session = session_in(&server, SessionState::Authenticated, StreamMode::Client);
        let mut ctx = HandlerContext::new(&mut session, &server);
        let iq = Element::builder("iq")
            .attribute("type", "set")
            .attribute("id", "s1")
            .attribute("from", "juliet@capulet.lit/balcony")
            .child(Element::builder("session").namespace(XMPP_SESSION).build())
            .build();
        let actions = SessionIqHandler.execute(&iq, &mut ctx).unwrap();
        let Action::Send(reply) = &actions[0] else {
            panic!("expected reply");
        };
        assert_eq!(reply.attribute("type"), Some("result"));
        assert_eq!(reply.attribute("id"), Some("s1"));
        assert_eq!(reply.attribute("to"), Some("juliet@capulet.lit/balcony"));
        assert!(reply.children().is_empty());
    }
}

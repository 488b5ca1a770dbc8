//! XMPP ping (XEP-0199).

use super::{is_iq_payload, remote_recipient};
use crate::error::ProtocolError;
use crate::handler::{Action, HandlerContext, StanzaHandler};
use crate::namespaces::XMPP_PING;
use crate::responses;
use crate::state::HandlerKind;
use corvid_xml::Element;

/// Answers pings addressed to the server; relays the rest
#[derive(Debug, Default, Clone, Copy)]
pub struct PingHandler;

impl StanzaHandler for PingHandler {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Stanza
    }

    fn verify(&self, stanza: &Element) -> bool {
        is_iq_payload(stanza, "get", "ping", XMPP_PING)
    }

    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        if let Some(to) = remote_recipient(stanza, ctx)? {
            return Ok(vec![Action::Route {
                to,
                stanza: stanza.clone(),
            }]);
        }
        Ok(vec![Action::Send(responses::iq_result(stanza, None))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{server, session_in, DOMAIN};
    use crate::state::{SessionState, StreamMode};

    fn ping(to: Option<&str>) -> Element {
        Element::builder("iq")
            .attribute("type", "get")
            .attribute("id", "p1")
            .attribute("from", "juliet@capulet.lit/balcony")
            .attribute_opt("to", to)
            .child(Element::builder("ping").namespace(XMPP_PING).build())
            .build()
    }

    #[test]
    fn test_ping_server() {
        let server = server();
        let mut session = session_in(&server, SessionState::Authenticated, StreamMode::Client);
        let mut ctx = HandlerContext::new(&mut session, &server);
        for to in [None, Some(DOMAIN)] {
            let actions = PingHandler.execute(&ping(to), &mut ctx).unwrap();
            let Action::Send(reply) = &actions[0] else {
                panic!("expected reply");
            };
            assert_eq!(reply.attribute("type"), Some("result"));
            assert_eq!(reply.attribute("id"), Some("p1"));
            assert!(reply.child("ping").is_none());
        }
    }

    #[test]
    fn test_ping_other_entity_is_routed() {
        let server = server();
        let mut session = session_in(&server, SessionState::Authenticated, StreamMode::Client);
        let mut ctx = HandlerContext::new(&mut session, &server);
        let actions = PingHandler
            .execute(&ping(Some("romeo@montague.lit/orchard")), &mut ctx)
            .unwrap();
        assert!(matches!(
            &actions[0],
            Action::Route { to, .. } if to.to_string() == "romeo@montague.lit/orchard"
        ));
    }
}

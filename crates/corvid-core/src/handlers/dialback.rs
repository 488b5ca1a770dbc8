//! Server dialback (XEP-0220).
//!
//! Three roles share these elements:
//!
//! - receiving: a peer presents a key in `<db:result>`; we ask its
//!   authoritative server with `<db:verify>` and answer `valid`/`invalid`.
//! - authoritative: a receiving server asks us with `<db:verify>`; we check
//!   the key against our own secret.
//! - originating: the peer answers our `<db:result>` with a `type`. Only
//!   meaningful on a stream this server opened; on an inbound stream a
//!   typed result is ignored.

use super::internal_error;
use crate::condition::StreamErrorCondition;
use crate::context::ServerContext;
use crate::error::ProtocolError;
use crate::handler::{Action, HandlerContext, StanzaHandler};
use crate::jid::Entity;
use crate::relay::{ConnectorError, DialbackRequest, DialbackVerdict};
use crate::responses;
use crate::session::Session;
use crate::state::{HandlerKind, SessionState, StreamDirection};
use corvid_xml::Element;

fn required<'a>(
    stanza: &'a Element,
    attribute: &str,
    condition: StreamErrorCondition,
) -> Result<&'a str, ProtocolError> {
    stanza
        .attribute(attribute)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ProtocolError::stream_with_text(condition, format!("dialback element lacks '{attribute}'"))
        })
}

/// Handles `<db:result>`
#[derive(Debug, Default, Clone, Copy)]
pub struct DbResultHandler;

impl DbResultHandler {
    fn receive_key(stanza: &Element, ctx: &HandlerContext<'_>) -> Result<Vec<Action>, ProtocolError> {
        let originating = required(stanza, "from", StreamErrorCondition::InvalidFrom)?;
        let receiving = required(stanza, "to", StreamErrorCondition::HostUnknown)?;
        let domain = ctx.server.domain().domain();
        if !receiving.eq_ignore_ascii_case(domain) {
            return Err(ProtocolError::stream(StreamErrorCondition::HostUnknown));
        }
        let Some(stream_id) = ctx.session.stream_id() else {
            return Err(internal_error("dialback key received before stream id was assigned"));
        };

        let key = stanza.text();
        let key = key.trim();
        if key.is_empty() {
            tracing::debug!(originating, "Empty dialback key");
            return Ok(vec![Action::Send(responses::dialback_reply(
                "result", domain, originating, None, false,
            ))]);
        }

        tracing::debug!(session = %ctx.session.id(), originating, "Verifying dialback key");
        Ok(vec![Action::VerifyDialback(DialbackRequest {
            receiving: domain.to_string(),
            originating: originating.to_string(),
            stream_id: stream_id.to_string(),
            key: key.to_string(),
        })])
    }

    fn receive_verdict(
        stanza: &Element,
        kind: &str,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        let peer = stanza.attribute("from").unwrap_or_default();
        if ctx.session.direction() == StreamDirection::Inbound {
            tracing::warn!(session = %ctx.session.id(), peer, kind, "Ignoring typed db:result on inbound stream");
            return Ok(Vec::new());
        }
        match kind {
            "valid" => {
                let peer_entity = Entity::domain_only(peer)
                    .map_err(|_| ProtocolError::stream(StreamErrorCondition::InvalidFrom))?;
                ctx.session.add_verified_domain(peer);
                if ctx.session.state() != SessionState::Authenticated {
                    ctx.session
                        .authenticate(peer_entity)
                        .map_err(internal_error)?;
                }
                Ok(Vec::new())
            }
            "invalid" => {
                tracing::warn!(session = %ctx.session.id(), peer, "Peer rejected our dialback key");
                Ok(vec![Action::Close])
            }
            other => {
                tracing::debug!(session = %ctx.session.id(), kind = other, "Ignoring dialback result");
                Ok(Vec::new())
            }
        }
    }
}

impl StanzaHandler for DbResultHandler {
    fn name(&self) -> &'static str {
        "db-result"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Dialback
    }

    fn verify(&self, stanza: &Element) -> bool {
        stanza.name() == "result"
    }

    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        match stanza.attribute("type") {
            None => Self::receive_key(stanza, ctx),
            Some(kind) => Self::receive_verdict(stanza, kind, ctx),
        }
    }
}

/// Handles `<db:verify>` as the authoritative server
#[derive(Debug, Default, Clone, Copy)]
pub struct DbVerifyHandler;

impl StanzaHandler for DbVerifyHandler {
    fn name(&self) -> &'static str {
        "db-verify"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Dialback
    }

    fn verify(&self, stanza: &Element) -> bool {
        stanza.name() == "verify"
    }

    fn execute(
        &self,
        stanza: &Element,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<Vec<Action>, ProtocolError> {
        if let Some(kind) = stanza.attribute("type") {
            tracing::debug!(session = %ctx.session.id(), kind, "Ignoring typed db:verify on inbound stream");
            return Ok(Vec::new());
        }

        let receiving = required(stanza, "from", StreamErrorCondition::InvalidFrom)?;
        let originating = required(stanza, "to", StreamErrorCondition::HostUnknown)?;
        let id = required(stanza, "id", StreamErrorCondition::BadFormat)?;
        let key = stanza.text();

        let ours = originating.eq_ignore_ascii_case(ctx.server.domain().domain());
        let valid = ours
            && ctx
                .server
                .dialback_key()
                .verify(key.trim(), receiving, originating, id);

        tracing::debug!(receiving, originating, valid, "Answered dialback verification");
        Ok(vec![Action::Send(responses::dialback_reply(
            "verify",
            originating,
            receiving,
            Some(id),
            valid,
        ))])
    }
}

/// Apply the authoritative server's answer to a pending `db:result`.
///
/// A valid verdict records the peer domain and authenticates the stream if
/// it was not already; anything else answers `invalid` and leaves the
/// session as it was.
pub fn complete_verification(
    session: &mut Session,
    server: &ServerContext,
    request: &DialbackRequest,
    verdict: Result<DialbackVerdict, ConnectorError>,
) -> Vec<Action> {
    let mut valid = match verdict {
        Ok(DialbackVerdict::Valid) => true,
        Ok(DialbackVerdict::Invalid) => false,
        Err(err) => {
            tracing::warn!(
                session = %session.id(),
                originating = %request.originating,
                "Dialback verification failed: {}",
                err
            );
            false
        }
    };

    if valid {
        session.add_verified_domain(&request.originating);
        if session.state() != SessionState::Authenticated {
            let authenticated = Entity::domain_only(&request.originating)
                .map_err(|e| e.to_string())
                .and_then(|peer| session.authenticate(peer).map_err(|e| e.to_string()));
            if let Err(err) = authenticated {
                tracing::warn!(session = %session.id(), "Cannot authenticate dialback peer: {}", err);
                valid = false;
            }
        }
    }

    tracing::info!(
        session = %session.id(),
        originating = %request.originating,
        valid,
        "Dialback completed"
    );
    vec![Action::Send(responses::dialback_reply(
        "result",
        server.domain().domain(),
        &request.originating,
        None,
        valid,
    ))]
}

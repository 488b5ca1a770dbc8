//! Session driver: bytes in, protocol output out.
//!
//! One driver owns one connection's decoder and session. Events decoded
//! from a delivery are processed strictly in arrival order; a dialback
//! verification is awaited before the next event is looked at, so replies
//! never overtake each other.
//!
//! ```text
//! bytes ─▶ StreamDecoder ─▶ AssemblerEvent ─▶ worker::process ─▶ Action ─▶ Output
//!                                                   │
//!                                                   └─▶ ProtocolError ─▶ error reply
//! ```

use crate::condition::{StanzaErrorCondition, StanzaErrorType, StreamErrorCondition};
use crate::context::ServerContext;
use crate::error::{Error, ProtocolError};
use crate::handler::Action;
use crate::handlers::dialback::complete_verification;
use crate::jid::Entity;
use crate::relay::ConnectorError;
use crate::responses::{self, STREAM_ELEMENT};
use crate::session::Session;
use crate::state::SessionState;
use crate::stanza::StanzaKind;
use crate::worker;
use corvid_xml::{AssemblerEvent, Element, StreamDecoder, XmlError, render_close, render_in, render_open};
use std::collections::VecDeque;
use std::sync::Arc;

/// What the transport must do after a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Write this text to the peer
    Write(String),
    /// Start the TLS handshake; report back with
    /// [`SessionDriver::tls_established`]
    StartTls,
    /// The session bound a resource; route stanzas for it here
    Bound(Entity),
    /// Flush pending writes and close the connection
    Close,
}

/// Drives one session from raw bytes
pub struct SessionDriver {
    server: Arc<ServerContext>,
    session: Session,
    decoder: StreamDecoder,
    /// Our stream header has been written for the current stream
    opened: bool,
    /// Waiting for the transport to finish the TLS handshake
    awaiting_tls: bool,
    closed: bool,
}

impl SessionDriver {
    /// Driver for a freshly accepted connection
    #[must_use]
    pub fn new(server: Arc<ServerContext>) -> Self {
        let session = server.new_session();
        let decoder = StreamDecoder::with_limit(server.config().max_pending_bytes);
        tracing::debug!(session = %session.id(), "Session created");
        Self {
            server,
            session,
            decoder,
            opened: false,
            awaiting_tls: false,
            closed: false,
        }
    }

    /// The session state
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Whether the stream has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Feed bytes from the peer and collect what to do about them.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::SessionEnded`] when called after the stream
    /// was closed. Every other problem is answered on the wire and reflected
    /// in the returned outputs.
    pub async fn receive(&mut self, bytes: &[u8]) -> Result<Vec<Output>, Error> {
        if self.closed {
            return Err(ProtocolError::SessionEnded.into());
        }

        let mut out = Vec::new();
        if let Err(e) = self.decoder.feed(bytes) {
            self.framing_error(&e, &mut out);
            return Ok(out);
        }

        while !self.closed && !self.awaiting_tls {
            let event = match self.decoder.next_event() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(e) => {
                    self.framing_error(&e, &mut out);
                    break;
                }
            };
            self.handle_event(event, &mut out).await?;
        }
        Ok(out)
    }

    /// The transport finished the TLS handshake.
    ///
    /// # Errors
    ///
    /// Returns a session error unless STARTTLS was negotiated first.
    pub fn tls_established(&mut self) -> Result<(), Error> {
        self.session.encryption_established()?;
        self.decoder.clear();
        self.awaiting_tls = false;
        self.opened = false;
        Ok(())
    }

    /// Render a stanza delivered to this session by another one.
    ///
    /// Delivery is server-initiated and bypasses state admission. Returns
    /// `None` once the stream is closed.
    pub fn deliver(&mut self, stanza: &Element) -> Option<String> {
        if self.closed {
            return None;
        }
        self.session.stats_mut().stanzas_sent += 1;
        let ns = self.session.mode().namespace();
        if let Some(from) = stanza.namespace_uri().filter(|from| *from != ns) {
            if StanzaKind::of(stanza).is_some() {
                // Stanzas crossing between client and server streams change namespace
                let mut stanza = stanza.clone();
                let from = from.to_string();
                stanza.rename_namespace(&from, ns);
                return Some(render_in(&stanza, Some(ns)));
            }
        }
        Some(render_in(stanza, Some(ns)))
    }

    /// Close the stream from the server side with `condition`
    pub fn shutdown(&mut self, condition: StreamErrorCondition) -> Vec<Output> {
        let mut out = Vec::new();
        if !self.closed {
            self.stream_failure(condition, None, &mut out);
        }
        out
    }

    /// Release the session after the connection is gone
    pub fn close(&mut self) {
        self.closed = true;
        self.session.close();
        let stats = self.session.stats();
        tracing::debug!(
            session = %self.session.id(),
            received = stats.stanzas_received,
            sent = stats.stanzas_sent,
            rejected = stats.stanzas_rejected,
            "Session closed"
        );
    }

    async fn handle_event(&mut self, event: AssemblerEvent, out: &mut Vec<Output>) -> Result<(), Error> {
        let element = match event {
            // Peers repeat the declaration on every restart; only the first counts
            AssemblerEvent::Prolog(_) if self.session.state() != SessionState::Initiated => {
                tracing::trace!(session = %self.session.id(), "Ignoring repeated XML declaration");
                return Ok(());
            }
            AssemblerEvent::Prolog(element) | AssemblerEvent::StreamOpened(element) => element,
            AssemblerEvent::Stanza(element) => {
                self.session.stats_mut().stanzas_received += 1;
                element
            }
            AssemblerEvent::StreamClosed => {
                tracing::debug!(session = %self.session.id(), "Peer closed the stream");
                self.close_stream(out);
                return Ok(());
            }
        };

        let server = Arc::clone(&self.server);
        match worker::process(&element, &mut self.session, &server) {
            Ok(actions) => {
                self.apply(actions, out).await;
                Ok(())
            }
            Err(e) => self.report(e, &element, out),
        }
    }

    async fn apply(&mut self, actions: Vec<Action>, out: &mut Vec<Output>) {
        let server = Arc::clone(&self.server);
        let mut queue: VecDeque<Action> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                Action::Send(element) => self.send(&element, out),
                Action::OpenStream(opener) => {
                    out.push(Output::Write(render_open(&opener)));
                    self.opened = true;
                }
                Action::Route { to, stanza } => self.route(&server, to, stanza, out),
                Action::RestartStream => {
                    tracing::debug!(session = %self.session.id(), "Stream restart");
                    self.decoder.restart();
                    self.opened = false;
                }
                Action::StartTls => {
                    self.awaiting_tls = true;
                    out.push(Output::StartTls);
                }
                Action::VerifyDialback(request) => {
                    let verdict = server
                        .connector()
                        .verify(request.clone())
                        .await
                        .unwrap_or(Err(ConnectorError::Cancelled));
                    let follow = complete_verification(&mut self.session, &server, &request, verdict);
                    for action in follow.into_iter().rev() {
                        queue.push_front(action);
                    }
                }
                Action::Bound(entity) => out.push(Output::Bound(entity)),
                Action::Close => {
                    self.close_stream(out);
                    return;
                }
            }
        }
    }

    fn route(&mut self, server: &ServerContext, to: Entity, stanza: Element, out: &mut Vec<Output>) {
        let Err(e) = server.relay().relay(&to, stanza.clone()) else {
            return;
        };
        tracing::debug!(session = %self.session.id(), %to, "Delivery failed: {}", e);
        if StanzaKind::of(&stanza) == Some(StanzaKind::Presence) {
            return;
        }
        if let Some(reply) = responses::stanza_error(
            &stanza,
            StanzaErrorCondition::ServiceUnavailable,
            StanzaErrorType::Cancel,
            None,
        ) {
            self.send(&reply, out);
        }
    }

    fn report(&mut self, error: ProtocolError, stanza: &Element, out: &mut Vec<Output>) -> Result<(), Error> {
        tracing::debug!(session = %self.session.id(), element = stanza.name(), "{}", error);
        match error {
            ProtocolError::SessionEnded => return Err(ProtocolError::SessionEnded.into()),
            ProtocolError::Framing(e) => self.framing_error(&e, out),
            ProtocolError::UnsupportedInState { .. } => {
                if StanzaKind::of(stanza).is_some() {
                    self.stanza_error(
                        stanza,
                        StanzaErrorCondition::ServiceUnavailable,
                        StanzaErrorType::Cancel,
                        None,
                        out,
                    );
                } else {
                    self.ensure_opened(out);
                    self.send(
                        &responses::stream_error(
                            StreamErrorCondition::UnsupportedStanzaType,
                            Some("service unavailable at this session state"),
                        ),
                        out,
                    );
                }
            }
            ProtocolError::NoHandler { .. } => {
                self.stream_failure(StreamErrorCondition::UnsupportedStanzaType, None, out);
            }
            ProtocolError::SaslFailure(condition) => {
                self.send(&responses::sasl_failure(condition), out);
            }
            ProtocolError::Stream { condition, text } => {
                self.stream_failure(condition, text.as_deref(), out);
            }
            ProtocolError::Stanza {
                condition,
                kind,
                text,
            } => self.stanza_error(stanza, condition, kind, text.as_deref(), out),
        }
        Ok(())
    }

    fn stanza_error(
        &mut self,
        stanza: &Element,
        condition: StanzaErrorCondition,
        kind: StanzaErrorType,
        text: Option<&str>,
        out: &mut Vec<Output>,
    ) {
        if let Some(reply) = responses::stanza_error(stanza, condition, kind, text) {
            self.send(&reply, out);
        }
    }

    fn framing_error(&mut self, error: &XmlError, out: &mut Vec<Output>) {
        tracing::warn!(session = %self.session.id(), "Framing error: {}", error);
        let (condition, text) = match error {
            XmlError::BufferOverflow { .. } => (StreamErrorCondition::PolicyViolation, Some("stanza too large")),
            XmlError::Unsupported(_) => (StreamErrorCondition::BadFormat, None),
            _ => (StreamErrorCondition::NotWellFormed, None),
        };
        self.stream_failure(condition, text, out);
    }

    /// Write a stream error, close the stream, and end the session
    fn stream_failure(&mut self, condition: StreamErrorCondition, text: Option<&str>, out: &mut Vec<Output>) {
        tracing::info!(session = %self.session.id(), %condition, "Closing stream with error");
        self.ensure_opened(out);
        self.send(&responses::stream_error(condition, text), out);
        self.close_stream(out);
    }

    fn close_stream(&mut self, out: &mut Vec<Output>) {
        if self.closed {
            return;
        }
        if self.opened {
            out.push(Output::Write(render_close(STREAM_ELEMENT)));
        }
        self.session.end();
        self.closed = true;
        out.push(Output::Close);
    }

    /// Errors must follow a stream header, so write one if the peer never
    /// got ours
    fn ensure_opened(&mut self, out: &mut Vec<Output>) {
        if self.opened {
            return;
        }
        let opener = responses::stream_opener(
            self.session.mode(),
            self.server.domain().domain(),
            None,
            self.session.stream_id(),
            None,
        );
        out.push(Output::Write(render_open(&opener)));
        self.opened = true;
    }

    fn send(&mut self, element: &Element, out: &mut Vec<Output>) {
        self.session.stats_mut().stanzas_sent += 1;
        out.push(Output::Write(render_in(element, Some(self.session.mode().namespace()))));
    }
}

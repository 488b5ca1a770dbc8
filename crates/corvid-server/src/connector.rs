//! Outbound dialback verification over TCP.
//!
//! For every `db:result` a peer presents, the receiving server opens a
//! short-lived stream to the authoritative server and asks it to check the
//! key with `db:verify`.

use corvid_core::responses::{STREAM_ELEMENT, stream_opener};
use corvid_core::{
    ConnectorError, DialbackRequest, DialbackVerdict, ServerConnector, StreamMode, VerdictReceiver,
};
use corvid_core::namespaces::JABBER_SERVER_DIALBACK;
use corvid_xml::{AssemblerEvent, StreamDecoder, render, render_close, render_open};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

/// Verifies dialback keys by asking the authoritative server
#[derive(Debug, Clone)]
pub struct TcpConnector {
    port: u16,
    timeout: Duration,
    routes: Arc<DashMap<String, SocketAddr>>,
}

impl TcpConnector {
    /// Dial peers on `port`, giving up on each verification after `timeout`
    #[must_use]
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            port,
            timeout,
            routes: Arc::new(DashMap::new()),
        }
    }

    /// Reach `domain` at a fixed address instead of resolving it
    #[must_use]
    pub fn with_route(self, domain: &str, addr: SocketAddr) -> Self {
        self.routes.insert(domain.to_ascii_lowercase(), addr);
        self
    }

    /// Fixed address configured for `domain`, if any
    fn route(&self, domain: &str) -> Option<SocketAddr> {
        self.routes
            .get(&domain.to_ascii_lowercase())
            .map(|addr| *addr.value())
    }

    async fn connect(&self, domain: &str) -> Result<TcpStream, ConnectorError> {
        let connected = match self.route(domain) {
            Some(addr) => TcpStream::connect(addr).await,
            None => TcpStream::connect((domain, self.port)).await,
        };
        connected.map_err(|e| {
            tracing::debug!(domain, "Connect failed: {}", e);
            ConnectorError::Unreachable(domain.to_string())
        })
    }

    async fn run(&self, request: &DialbackRequest) -> Result<DialbackVerdict, ConnectorError> {
        let domain = request.originating.as_str();
        let protocol = |reason: String| ConnectorError::Protocol {
            domain: domain.to_string(),
            reason,
        };

        let mut stream = self.connect(domain).await?;
        let opener = stream_opener(
            StreamMode::Server,
            &request.receiving,
            Some(domain),
            None,
            None,
        );
        stream
            .write_all(render_open(&opener).as_bytes())
            .await
            .map_err(|e| protocol(e.to_string()))?;

        let mut decoder = StreamDecoder::new();
        let mut buf = vec![0u8; 4096];
        loop {
            let n = stream
                .read(&mut buf)
                .await
                .map_err(|e| protocol(e.to_string()))?;
            if n == 0 {
                return Err(protocol("connection closed before verdict".to_string()));
            }
            decoder
                .feed(&buf[..n])
                .map_err(|e| protocol(e.to_string()))?;

            while let Some(event) = decoder.next_event().map_err(|e| protocol(e.to_string()))? {
                match event {
                    AssemblerEvent::StreamOpened(_) => {
                        let verify = request.to_element();
                        stream
                            .write_all(render(&verify).as_bytes())
                            .await
                            .map_err(|e| protocol(e.to_string()))?;
                    }
                    AssemblerEvent::Stanza(stanza)
                        if stanza.is("verify", JABBER_SERVER_DIALBACK)
                            && stanza.attribute("id") == Some(request.stream_id.as_str()) =>
                    {
                        let verdict = match stanza.attribute("type") {
                            Some("valid") => DialbackVerdict::Valid,
                            _ => DialbackVerdict::Invalid,
                        };
                        let _ = stream.write_all(render_close(STREAM_ELEMENT).as_bytes()).await;
                        return Ok(verdict);
                    }
                    AssemblerEvent::Stanza(stanza) if stanza.name() == "error" => {
                        return Err(protocol("stream error from authoritative server".to_string()));
                    }
                    AssemblerEvent::StreamClosed => {
                        return Err(protocol("stream closed before verdict".to_string()));
                    }
                    AssemblerEvent::Prolog(_) | AssemblerEvent::Stanza(_) => {}
                }
            }
        }
    }
}

impl ServerConnector for TcpConnector {
    fn verify(&self, request: DialbackRequest) -> VerdictReceiver {
        let (tx, rx) = oneshot::channel();
        let connector = self.clone();
        tokio::spawn(async move {
            let verdict = match tokio::time::timeout(connector.timeout, connector.run(&request)).await {
                Ok(result) => result,
                Err(_) => Err(ConnectorError::Unreachable(request.originating.clone())),
            };
            tracing::debug!(originating = %request.originating, ?verdict, "Dialback verification finished");
            let _ = tx.send(verdict);
        });
        rx
    }
}

//! TCP front end: accept loop, one task per connection.
//!
//! ```text
//!            ┌──────────────┐  bytes   ┌───────────────┐  Output::Write  ┌────────┐
//! socket ───▶│  read half   │─────────▶│ SessionDriver │────────────────▶│ writer │──▶ socket
//!            └──────────────┘          └───────────────┘      mpsc        └────────┘
//!                                             ▲
//!                    SessionRegistry ─────────┘ routed stanzas (mpsc)
//! ```

use crate::config::Config;
use crate::connector::TcpConnector;
use crate::registry::{DELIVERY_QUEUE_DEPTH, SessionRegistry};
use anyhow::Context;
use corvid_core::{
    Entity, InMemoryAccounts, Output, ServerContext, SessionDriver, StreamErrorCondition,
};
use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tracing::Instrument;

/// Read buffer size per connection
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Outbound writes queued per connection
const WRITE_QUEUE_DEPTH: usize = 64;

/// Upper bound on one outbound dialback verification
const DIALBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Time given to open connections to say goodbye on shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared {
    context: Arc<ServerContext>,
    registry: Arc<SessionRegistry>,
    limit: Arc<Semaphore>,
    idle_timeout: Duration,
}

/// The listening server
pub struct StreamServer {
    shared: Arc<Shared>,
    max_sessions: usize,
    c2s_addr: SocketAddr,
    s2s_addr: Option<SocketAddr>,
}

impl StreamServer {
    /// Build the server state from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration holds an invalid domain,
    /// address, or account.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let domain = config.domain()?;
        let session_config = config.session_config();

        let accounts = Arc::new(InMemoryAccounts::new());
        for user in &config.accounts.users {
            let entity = Entity::new(Some(&user.username), domain.domain(), None)
                .with_context(|| format!("invalid username '{}'", user.username))?;
            accounts
                .add(entity, &user.password)
                .with_context(|| format!("adding account '{}'", user.username))?;
        }

        let registry = Arc::new(SessionRegistry::new());
        let mut builder = ServerContext::builder(domain)
            .config(session_config.clone())
            .users(accounts.clone())
            .relay(registry.clone());
        if session_config.registration_enabled {
            builder = builder.accounts(accounts);
        }
        if session_config.dialback_enabled {
            builder = builder.connector(Arc::new(TcpConnector::new(
                config.server.s2s_port,
                DIALBACK_TIMEOUT,
            )));
        }
        let context = Arc::new(builder.build()?);

        Ok(Self {
            shared: Arc::new(Shared {
                context,
                registry,
                limit: Arc::new(Semaphore::new(config.server.max_sessions)),
                idle_timeout: config.idle_timeout(),
            }),
            max_sessions: config.server.max_sessions,
            c2s_addr: config.c2s_addr()?,
            s2s_addr: config.s2s_addr()?,
        })
    }

    /// Shared protocol state
    #[must_use]
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.shared.context
    }

    /// Bound sessions
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.shared.registry
    }

    /// Bind the configured addresses and serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if a listener cannot be bound.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let mut listeners = vec![
            TcpListener::bind(self.c2s_addr)
                .await
                .with_context(|| format!("binding {}", self.c2s_addr))?,
        ];
        if let Some(addr) = self.s2s_addr {
            listeners.push(
                TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("binding {addr}"))?,
            );
        }
        self.serve(listeners, shutdown).await
    }

    /// Serve on already bound listeners until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns an error if a listener address cannot be read.
    pub async fn serve(
        self,
        listeners: Vec<TcpListener>,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        let (stop_tx, stop_rx) = watch::channel(false);

        for listener in listeners {
            let addr = listener.local_addr()?;
            tracing::info!(%addr, domain = %self.shared.context.domain(), "Listening");
            tokio::spawn(accept_loop(listener, Arc::clone(&self.shared), stop_rx.clone()));
        }

        shutdown.await;
        tracing::info!("Shutting down");
        let _ = stop_tx.send(true);

        let permits = u32::try_from(self.max_sessions).unwrap_or(u32::MAX);
        if tokio::time::timeout(DRAIN_TIMEOUT, self.shared.limit.acquire_many(permits))
            .await
            .is_err()
        {
            tracing::warn!("Connections still open after drain timeout");
        }
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, mut stop: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                let Ok(permit) = Arc::clone(&shared.limit).try_acquire_owned() else {
                    tracing::warn!(%peer, "Session limit reached");
                    tokio::spawn(refuse(socket, Arc::clone(&shared)));
                    continue;
                };
                let span = tracing::info_span!("connection", %peer);
                tokio::spawn(
                    handle_connection(socket, Arc::clone(&shared), stop.clone(), permit).instrument(span),
                );
            }
        }
    }
}

/// Answer a connection over the limit with `resource-constraint`
async fn refuse(mut socket: TcpStream, shared: Arc<Shared>) {
    let mut driver = SessionDriver::new(Arc::clone(&shared.context));
    for output in driver.shutdown(StreamErrorCondition::ResourceConstraint) {
        if let Output::Write(text) = output {
            if socket.write_all(text.as_bytes()).await.is_err() {
                break;
            }
        }
    }
    driver.close();
    let _ = socket.shutdown().await;
}

async fn handle_connection(
    socket: TcpStream,
    shared: Arc<Shared>,
    mut stop: watch::Receiver<bool>,
    _permit: OwnedSemaphorePermit,
) {
    let _ = socket.set_nodelay(true);
    let (mut reader, writer) = socket.into_split();
    let (out_tx, out_rx) = mpsc::channel::<String>(WRITE_QUEUE_DEPTH);
    let writer_task = tokio::spawn(write_loop(writer, out_rx));
    let (deliver_tx, mut deliver_rx) = mpsc::channel(DELIVERY_QUEUE_DEPTH);

    let mut driver = SessionDriver::new(Arc::clone(&shared.context));
    tracing::info!(session = %driver.session().id(), "Connection accepted");
    let mut bound: Option<Entity> = None;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let outputs = tokio::select! {
            read = tokio::time::timeout(shared.idle_timeout, reader.read(&mut buf)) => match read {
                Err(_) => {
                    tracing::debug!("Idle timeout");
                    driver.shutdown(StreamErrorCondition::ConnectionTimeout)
                }
                Ok(Ok(0)) => {
                    tracing::debug!("Peer disconnected");
                    break;
                }
                Ok(Ok(n)) => {
                    tracing::trace!(bytes = n, "Read");
                    match driver.receive(&buf[..n]).await {
                        Ok(outputs) => outputs,
                        Err(e) => {
                            tracing::debug!("Input after close: {}", e);
                            break;
                        }
                    }
                }
                Ok(Err(e)) => {
                    tracing::debug!("Read failed: {}", e);
                    break;
                }
            },
            Some(stanza) = deliver_rx.recv() => {
                driver.deliver(&stanza).map(Output::Write).into_iter().collect()
            }
            _ = stop.changed() => driver.shutdown(StreamErrorCondition::SystemShutdown),
        };

        let mut close = false;
        let mut pending: VecDeque<Output> = outputs.into();
        while let Some(output) = pending.pop_front() {
            match output {
                Output::Write(text) => {
                    if out_tx.send(text).await.is_err() {
                        close = true;
                    }
                }
                Output::Bound(entity) => {
                    if shared.registry.register(entity.clone(), deliver_tx.clone()) {
                        bound = Some(entity);
                    } else {
                        tracing::warn!(%entity, "Lost resource binding race");
                        pending.extend(driver.shutdown(StreamErrorCondition::Conflict));
                    }
                }
                Output::StartTls => {
                    tracing::warn!("STARTTLS negotiated without a TLS transport");
                    close = true;
                }
                Output::Close => close = true,
            }
        }
        if close {
            break;
        }
    }

    if let Some(entity) = bound {
        shared.registry.unregister(&entity, &deliver_tx);
    }
    driver.close();
    drop(out_tx);
    let _ = writer_task.await;
    tracing::info!("Connection closed");
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<String>) {
    while let Some(text) = rx.recv().await {
        if let Err(e) = writer.write_all(text.as_bytes()).await {
            tracing::debug!("Write failed: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

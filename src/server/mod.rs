//! Connection supervisor: accept loop, per-connection lifecycle, presence.

mod connection;

use futures_util::future::join_all;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::codec::DEFAULT_MAX_FRAME_BYTES;
use crate::protocol::Message;
use crate::registry::Registry;
use crate::router::Router;
use crate::translation::Translator;

/// Runtime settings for the relay server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub max_frame_bytes: usize,
    /// Time allowed between accept and the `Login` frame.
    pub login_timeout: Option<Duration>,
    /// Idle limit for a logged-in connection; `None` waits forever.
    /// Clients that only listen send nothing, so this is off by default.
    pub read_timeout: Option<Duration>,
    /// Per-frame write limit; a peer that stops reading is dropped.
    pub write_timeout: Option<Duration>,
    /// Consecutive undecodable frames tolerated before disconnecting.
    pub max_codec_errors: u32,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5505)),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            login_timeout: Some(Duration::from_secs(30)),
            read_timeout: None,
            write_timeout: Some(Duration::from_secs(10)),
            max_codec_errors: 3,
            max_connections: 256,
        }
    }
}

/// The relay server. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RelayServer {
    config: Arc<ServerConfig>,
    registry: Arc<Registry>,
    router: Router,
    connections: Arc<AtomicUsize>,
    // Held from snapshot to the end of fan-out so presence lists reach
    // every session in the order they were taken.
    presence_lock: Arc<Mutex<()>>,
}

impl RelayServer {
    pub fn new(config: ServerConfig, translator: Arc<dyn Translator>) -> Self {
        let registry = Arc::new(Registry::new());
        let router = Router::new(Arc::clone(&registry), translator)
            .with_max_frame_bytes(config.max_frame_bytes);
        Self {
            config: Arc::new(config),
            registry,
            router,
            connections: Arc::new(AtomicUsize::new(0)),
            presence_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Open connections, logged in or not.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Accepts connections until `shutdown` resolves.
    pub async fn run<F>(&self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "relay server listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!(
                        live_sessions = self.registry.len(),
                        "shutdown requested, no longer accepting connections"
                    );
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            // Usually a per-connection failure (aborted handshake) or fd exhaustion.
                            tracing::warn!(error = %e, "accept failed");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                    };

                    let current = self.connections.fetch_add(1, Ordering::SeqCst);
                    if current >= self.config.max_connections {
                        self.connections.fetch_sub(1, Ordering::SeqCst);
                        tracing::warn!(
                            %peer,
                            max = self.config.max_connections,
                            "connection refused: limit reached"
                        );
                        continue;
                    }

                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(%peer, error = %e, "could not set TCP_NODELAY");
                    }

                    let server = self.clone();
                    tokio::spawn(async move {
                        connection::serve(&server, stream, peer).await;
                        server.connections.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            }
        }
    }

    /// Runs the full lifecycle of one connection over any byte stream.
    ///
    /// Not counted against `max_connections`; the accept loop does that.
    pub async fn serve_connection<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        connection::serve(self, stream, peer).await;
    }

    /// Sends the current presence list to every live session.
    ///
    /// Broadcasts are serialized, so the last list a session receives
    /// reflects every join and leave before it.
    pub async fn broadcast_presence(&self) {
        let _ordered = self.presence_lock.lock().await;
        let (users, sessions) = self.registry.presence();
        tracing::debug!(live_sessions = users.len(), "broadcasting presence");

        let deliveries = sessions.iter().map(|session| {
            let message = Message::Presence {
                users: users.clone(),
            };
            async move {
                if let Err(e) = session.send(message).await {
                    tracing::debug!(
                        recipient = %session.display_name(),
                        error = %e,
                        "presence delivery failed"
                    );
                }
            }
        });
        join_all(deliveries).await;
    }
}

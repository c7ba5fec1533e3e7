//! TCP server: a listening socket plus a connection registry.
//!
//! The server owns every accepted [`Connection`] and enforces the
//! admission limit: inbound connections beyond `max_connections` are
//! closed before they ever become visible to the application. Per-
//! connection signals are forwarded through aggregate server signals
//! tagged with the originating connection, so one slot can observe the
//! whole registry.

use std::sync::{Arc, Weak};

use emberlink_core::Signal;
use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::connection::{CloseReason, Connection, ConnectionId, InboundData};
use crate::error::{Result, SocketError};
use crate::stack::{AcceptDecision, SocketId, TcpStack};

struct Registry {
    listener: Option<SocketId>,
    connections: Vec<Arc<Connection>>,
    next_id: u64,
    ping_watchdog: bool,
}

struct ServerShared {
    config: ServerConfig,
    stack: Arc<dyn TcpStack>,
    registry: Mutex<Registry>,

    data_received: Signal<(Arc<Connection>, InboundData)>,
    bytes_written: Signal<(Arc<Connection>, usize)>,
    error: Signal<(Arc<Connection>, SocketError)>,
    poll: Signal<Arc<Connection>>,
    new_connection: Signal<(Arc<Connection>, Vec<Arc<Connection>>)>,
    connection_closed: Signal<(Arc<Connection>, Vec<Arc<Connection>>)>,
}

/// A TCP server tracking up to `max_connections` concurrent connections.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use emberlink_net::{ServerConfig, TcpServer, TcpStack};
/// # fn demo(stack: Arc<dyn TcpStack>) -> emberlink_net::Result<()> {
/// let server = TcpServer::new(stack, ServerConfig::new(5000).max_connections(8));
///
/// server.on_new_connection().connect(|(conn, all)| {
///     println!("{} joined, {} connected", conn.id(), all.len());
/// });
/// server.on_data_received().connect(|(conn, inbound)| {
///     println!("{} sent {} bytes", conn.id(), inbound.data.len());
/// });
///
/// server.start()?;
/// # Ok(())
/// # }
/// ```
pub struct TcpServer {
    shared: Arc<ServerShared>,
}

impl TcpServer {
    /// Create a new server. Call [`start`](Self::start) to begin
    /// listening.
    pub fn new(stack: Arc<dyn TcpStack>, config: ServerConfig) -> Self {
        let ping_watchdog = config.socket.ping_watchdog;
        Self {
            shared: Arc::new(ServerShared {
                config,
                stack,
                registry: Mutex::new(Registry {
                    listener: None,
                    connections: Vec::new(),
                    next_id: 0,
                    ping_watchdog,
                }),
                data_received: Signal::new(),
                bytes_written: Signal::new(),
                error: Signal::new(),
                poll: Signal::new(),
                new_connection: Signal::new(),
                connection_closed: Signal::new(),
            }),
        }
    }

    /// Signal emitted when any tracked connection delivers inbound data.
    pub fn on_data_received(&self) -> &Signal<(Arc<Connection>, InboundData)> {
        &self.shared.data_received
    }

    /// Signal emitted when any tracked connection has bytes acknowledged.
    pub fn on_bytes_written(&self) -> &Signal<(Arc<Connection>, usize)> {
        &self.shared.bytes_written
    }

    /// Signal emitted when any tracked connection reports an error.
    pub fn on_error(&self) -> &Signal<(Arc<Connection>, SocketError)> {
        &self.shared.error
    }

    /// Signal emitted when any tracked connection is polled.
    pub fn on_poll(&self) -> &Signal<Arc<Connection>> {
        &self.shared.poll
    }

    /// Signal emitted when an inbound connection is admitted. Carries the
    /// new connection and a snapshot of all tracked connections including
    /// it.
    pub fn on_new_connection(&self) -> &Signal<(Arc<Connection>, Vec<Arc<Connection>>)> {
        &self.shared.new_connection
    }

    /// Signal emitted when a tracked connection closes. Carries the closed
    /// connection and a snapshot of the connections remaining after its
    /// removal.
    pub fn on_connection_closed(&self) -> &Signal<(Arc<Connection>, Vec<Arc<Connection>>)> {
        &self.shared.connection_closed
    }

    /// Start listening on the configured port.
    ///
    /// A running server is stopped first, so `start` doubles as a restart.
    pub fn start(&self) -> Result<()> {
        self.stop();

        let shared = Arc::downgrade(&self.shared);
        let on_accept = Box::new(move |sock: SocketId| match shared.upgrade() {
            Some(shared) => ServerShared::handle_accept(&shared, sock),
            None => AcceptDecision::Refused,
        });

        let listener = self.shared.stack.listen(
            self.shared.config.port,
            self.shared.config.max_connections,
            on_accept,
        )?;
        self.shared.registry.lock().listener = Some(listener);

        tracing::info!(
            target: "emberlink_net::server",
            port = self.shared.config.port,
            max_connections = self.shared.config.max_connections,
            "server listening"
        );
        Ok(())
    }

    /// Stop listening and drop every tracked connection.
    ///
    /// Tracked connections are aborted without firing their `closed`
    /// signals or the server's `connection_closed` signal: shutdown is not
    /// an eviction. No-op if the server is not running.
    pub fn stop(&self) {
        let (listener, connections) = {
            let mut registry = self.shared.registry.lock();
            match registry.listener.take() {
                Some(listener) => (listener, std::mem::take(&mut registry.connections)),
                None => return,
            }
        };

        for conn in &connections {
            conn.abort();
        }
        let _ = self.shared.stack.close(listener);

        tracing::info!(
            target: "emberlink_net::server",
            port = self.shared.config.port,
            dropped = connections.len(),
            "server stopped"
        );
    }

    /// Send `payload` to every tracked connection.
    ///
    /// Per-connection send failures are skipped; a broadcast is
    /// best-effort by design of the underlying buffers.
    pub fn broadcast(&self, payload: &[u8]) {
        let connections = self.connections();
        for conn in &connections {
            if let Err(err) = conn.send(payload) {
                tracing::debug!(
                    target: "emberlink_net::server",
                    id = %conn.id(),
                    error = %err,
                    "broadcast send skipped"
                );
            }
        }
    }

    /// Enable or disable the ping watchdog.
    ///
    /// Applies to every currently tracked connection and to connections
    /// admitted afterwards. Returns the new setting.
    pub fn set_ping_watchdog(&self, enabled: bool) -> bool {
        self.shared.registry.lock().ping_watchdog = enabled;
        for conn in self.connections() {
            conn.set_ping_watchdog(enabled);
        }
        enabled
    }

    /// Check if the server is listening.
    pub fn is_listening(&self) -> bool {
        self.shared.registry.lock().listener.is_some()
    }

    /// The configured listening port.
    pub fn port(&self) -> u16 {
        self.shared.config.port
    }

    /// Number of currently tracked connections.
    pub fn connection_count(&self) -> usize {
        self.shared.registry.lock().connections.len()
    }

    /// Snapshot of the currently tracked connections.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.shared.registry.lock().connections.clone()
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ServerShared {
    fn handle_accept(self: &Arc<Self>, sock: SocketId) -> AcceptDecision {
        // Admission check and ID reservation happen under one lock so two
        // interleaved accepts cannot both squeeze past the limit.
        let (id, watchdog) = {
            let mut registry = self.registry.lock();
            if registry.connections.len() >= self.config.max_connections {
                drop(registry);
                tracing::debug!(
                    target: "emberlink_net::server",
                    limit = self.config.max_connections,
                    "inbound connection refused: registry at capacity"
                );
                let _ = self.stack.close(sock);
                return AcceptDecision::Refused;
            }
            let id = ConnectionId::new(registry.next_id);
            registry.next_id += 1;
            (id, registry.ping_watchdog)
        };

        let mut socket = self.config.socket.clone();
        socket.ping_watchdog = watchdog;
        let conn = Connection::accepted(Arc::clone(&self.stack), sock, id, &socket);
        self.wire_forwarding(&conn);

        let snapshot = {
            let mut registry = self.registry.lock();
            registry.connections.push(Arc::clone(&conn));
            registry.connections.clone()
        };

        tracing::debug!(
            target: "emberlink_net::server",
            id = %conn.id(),
            tracked = snapshot.len(),
            "connection admitted"
        );
        self.new_connection.emit((conn, snapshot));
        AcceptDecision::Accepted
    }

    /// Connect forwarding slots on a freshly admitted connection so its
    /// events re-emit through the aggregate server signals.
    fn wire_forwarding(self: &Arc<Self>, conn: &Arc<Connection>) {
        let shared = Arc::downgrade(self);
        let weak = Arc::downgrade(conn);
        conn.data_received.connect(move |inbound| {
            if let (Some(shared), Some(conn)) = (shared.upgrade(), weak.upgrade()) {
                shared.data_received.emit((conn, inbound.clone()));
            }
        });

        let shared = Arc::downgrade(self);
        let weak = Arc::downgrade(conn);
        conn.bytes_written.connect(move |len| {
            if let (Some(shared), Some(conn)) = (shared.upgrade(), weak.upgrade()) {
                shared.bytes_written.emit((conn, *len));
            }
        });

        let shared = Arc::downgrade(self);
        let weak = Arc::downgrade(conn);
        conn.error.connect(move |err| {
            if let (Some(shared), Some(conn)) = (shared.upgrade(), weak.upgrade()) {
                shared.error.emit((conn, err.clone()));
            }
        });

        let shared = Arc::downgrade(self);
        let weak = Arc::downgrade(conn);
        conn.poll.connect(move |_: &()| {
            if let (Some(shared), Some(conn)) = (shared.upgrade(), weak.upgrade()) {
                shared.poll.emit(conn);
            }
        });

        let shared = Arc::downgrade(self);
        let weak = Arc::downgrade(conn);
        conn.closed.connect(move |_reason: &CloseReason| {
            if let (Some(shared), Some(conn)) = (shared.upgrade(), weak.upgrade()) {
                shared.evict(&conn);
            }
        });
    }

    /// Remove a closed connection from the registry and announce the
    /// post-removal roster.
    fn evict(self: &Arc<Self>, conn: &Arc<Connection>) {
        let snapshot = {
            let mut registry = self.registry.lock();
            let before = registry.connections.len();
            registry.connections.retain(|c| c.id() != conn.id());
            if registry.connections.len() == before {
                // Already evicted; a forced re-close fires the closed
                // signal again.
                return;
            }
            registry.connections.clone()
        };

        tracing::debug!(
            target: "emberlink_net::server",
            id = %conn.id(),
            tracked = snapshot.len(),
            "connection evicted"
        );
        self.connection_closed.emit((Arc::clone(conn), snapshot));
    }
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.shared.registry.lock();
        f.debug_struct("TcpServer")
            .field("port", &self.shared.config.port)
            .field("listener", &registry.listener)
            .field("connections", &registry.connections.len())
            .field("max_connections", &self.shared.config.max_connections)
            .finish()
    }
}

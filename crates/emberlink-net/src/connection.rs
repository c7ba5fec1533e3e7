//! Connection lifecycle and liveness engine.
//!
//! A [`Connection`] wraps one raw socket handle and translates the stack's
//! low-level events (receive/sent/error/poll/connected) into high-level
//! signals, on top of which it runs a tick-counted ping watchdog: every
//! `ping_interval_ticks` poll events it writes a literal `"ping"` probe and
//! watches for a transport-level acknowledgement via the `sent` event. Two
//! consecutive unacknowledged probes (or a failed probe write) mean the
//! remote end is presumed dead and the connection is closed and aborted.
//!
//! Connections are handed around as `Arc<Connection>`; the owning registry
//! (or client) always controls the lifetime. The event hooks installed on
//! the stack hold only `Weak` references, so dropping the last `Arc`
//! releases the connection even if the stack still holds its hooks.

use std::net::Ipv4Addr;
use std::sync::Arc;

use emberlink_core::Signal;
use parking_lot::Mutex;

use crate::config::SocketConfig;
use crate::error::{Result, SocketError};
use crate::stack::{Chunk, EventHooks, HookStatus, SocketId, TcpStack};
use crate::state::ConnectionState;

/// The liveness probe payload. Peers are not required to understand it;
/// only the transport-level acknowledgement of the write is observed.
pub const PING_PROBE: &[u8] = b"ping";

/// Identifier of a connection within its registry.
///
/// Assigned from a per-registry monotonically increasing counter, so IDs
/// are stable and never reused for the registry's lifetime. A standalone
/// client connection carries [`ConnectionId::UNASSIGNED`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// The ID carried by a connection that no registry has admitted.
    pub const UNASSIGNED: ConnectionId = ConnectionId(u64::MAX);

    /// Create a connection ID from a raw value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::UNASSIGNED {
            write!(f, "conn-unassigned")
        } else {
            write!(f, "conn-{}", self.0)
        }
    }
}

/// One delivered piece of inbound payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundData {
    /// The payload after optional line-break filtering. Never empty.
    pub data: Vec<u8>,
    /// Length of the raw chunk this delivery came from, before filtering.
    pub chunk_len: usize,
    /// Total length of the buffered segment the chunk belongs to.
    pub total_len: usize,
}

/// Why a connection's `closed` signal fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The application asked for the close.
    Local,
    /// The remote end closed the connection (EOF).
    Remote,
    /// The liveness watchdog presumed the remote end dead.
    Watchdog,
}

/// What happened when [`Connection::close`] was called.
///
/// The connection never disposes of itself; whoever holds the `Arc` owns
/// the lifetime. The disposition reports whether any `closed` slot
/// observed the close, so the owner knows if cleanup already ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseDisposition {
    /// At least one `closed` slot was notified.
    Notified,
    /// No `closed` slot was registered; nobody observed the close.
    Unobserved,
    /// The connection was already closed and `force` was not set.
    AlreadyClosed,
}

struct ConnInner {
    sock: Option<SocketId>,
    state: ConnectionState,
    ping_watchdog: bool,
    strip_line_breaks: bool,
    poll_ticks: u32,
    missed_acks: u8,
    awaiting_ack: bool,
}

/// One TCP connection, server-accepted or client-initiated.
///
/// # Signals
///
/// - [`data_received`](Self::data_received): inbound payload (after
///   optional line-break filtering; empty deliveries are swallowed)
/// - [`bytes_written`](Self::bytes_written): the remote end acknowledged
///   previously written bytes
/// - [`error`](Self::error): a transport or liveness error occurred (the
///   connection is not closed by this alone)
/// - [`poll`](Self::poll): one scheduler tick elapsed
/// - [`connected`](Self::connected): an outbound connect completed
/// - [`closed`](Self::closed): the connection closed, with the reason
pub struct Connection {
    id: ConnectionId,
    stack: Arc<dyn TcpStack>,
    ping_interval_ticks: u32,
    max_missed_acks: u8,
    poll_interval: u8,
    inner: Mutex<ConnInner>,

    /// Signal emitted when filtered inbound payload is available.
    pub data_received: Signal<InboundData>,
    /// Signal emitted when the remote end acknowledges written bytes.
    pub bytes_written: Signal<usize>,
    /// Signal emitted on a transport or liveness error.
    pub error: Signal<SocketError>,
    /// Signal emitted once per scheduler tick.
    pub poll: Signal<()>,
    /// Signal emitted when an outbound connect completes.
    pub connected: Signal<()>,
    /// Signal emitted when the connection closes (not on abort).
    pub closed: Signal<CloseReason>,
}

impl Connection {
    /// Create an unbound connection for the client role.
    ///
    /// Call [`bind`](Self::bind) to attach a raw socket handle.
    pub fn new(stack: Arc<dyn TcpStack>, config: &SocketConfig) -> Arc<Self> {
        Self::build(stack, ConnectionId::UNASSIGNED, config)
    }

    /// Wrap a freshly accepted raw connection for the server role.
    ///
    /// The connection is `Established` immediately: the peer is confirmed
    /// by the accept itself.
    pub(crate) fn accepted(
        stack: Arc<dyn TcpStack>,
        sock: SocketId,
        id: ConnectionId,
        config: &SocketConfig,
    ) -> Arc<Self> {
        let conn = Self::build(stack, id, config);
        conn.bind(sock);
        conn.inner.lock().state = ConnectionState::Established;
        conn
    }

    fn build(stack: Arc<dyn TcpStack>, id: ConnectionId, config: &SocketConfig) -> Arc<Self> {
        Arc::new(Self {
            id,
            stack,
            ping_interval_ticks: config.ping_interval_ticks,
            max_missed_acks: config.max_missed_acks,
            poll_interval: config.poll_interval,
            inner: Mutex::new(ConnInner {
                sock: None,
                state: ConnectionState::Unbound,
                ping_watchdog: config.ping_watchdog,
                strip_line_breaks: config.strip_line_breaks,
                poll_ticks: 0,
                missed_acks: 0,
                awaiting_ack: false,
            }),
            data_received: Signal::new(),
            bytes_written: Signal::new(),
            error: Signal::new(),
            poll: Signal::new(),
            connected: Signal::new(),
            closed: Signal::new(),
        })
    }

    /// Get the connection's registry ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Check if the connection is established.
    pub fn is_established(&self) -> bool {
        self.inner.lock().state == ConnectionState::Established
    }

    /// The remote endpoint, if the stack knows it.
    pub fn peer_addr(&self) -> Option<(Ipv4Addr, u16)> {
        let sock = self.inner.lock().sock?;
        self.stack.peer_addr(sock)
    }

    /// Enable or disable the ping watchdog. Returns the new setting.
    pub fn set_ping_watchdog(&self, enabled: bool) -> bool {
        self.inner.lock().ping_watchdog = enabled;
        enabled
    }

    /// Attach a raw socket handle and install the event hooks with the
    /// stack, arming the poll timer.
    ///
    /// Safe against re-binding a recycled handle: installing hooks again
    /// simply replaces the previous set.
    pub fn bind(self: &Arc<Self>, sock: SocketId) {
        {
            let mut inner = self.inner.lock();
            inner.sock = Some(sock);
            inner.state = ConnectionState::Bound;
            inner.poll_ticks = 0;
            inner.missed_acks = 0;
            inner.awaiting_ack = false;
        }
        self.stack.install_hooks(sock, self.hooks(), self.poll_interval);
    }

    /// Submit an asynchronous connect request to `addr:port`.
    ///
    /// Valid only when a handle exists. Returns once the request is
    /// submitted; completion is signaled through [`connected`](Self::connected).
    pub fn connect(&self, addr: Ipv4Addr, port: u16) -> Result<()> {
        let sock = match self.inner.lock().sock {
            Some(sock) => sock,
            None => {
                tracing::debug!(
                    target: "emberlink_net::connection",
                    id = %self.id,
                    "connect attempted without a socket handle"
                );
                return Err(SocketError::ConnectionRequestRejected);
            }
        };

        self.stack
            .connect(sock, addr, port)
            .map_err(|_| SocketError::ConnectionRequestRejected)?;
        self.inner.lock().state = ConnectionState::Connecting;
        Ok(())
    }

    /// Write bytes to the outgoing buffer, unframed.
    ///
    /// Returns the number of bytes the stack accepted. Payloads larger
    /// than the stack's send window are not segmented; chunking is the
    /// caller's responsibility.
    pub fn send(&self, payload: &[u8]) -> Result<usize> {
        let sock = self.inner.lock().sock.ok_or(SocketError::SendFailed)?;
        self.stack
            .send(sock, payload)
            .map_err(|_| SocketError::SendFailed)
    }

    /// Issue a graceful close.
    ///
    /// No-op if already closed, unless `force` is set. The raw handle is
    /// retained so a later [`bind`](Self::bind)/reconnect can recycle it.
    /// Fires the [`closed`](Self::closed) signal.
    pub fn close(&self, force: bool) -> CloseDisposition {
        self.close_with_reason(force, CloseReason::Local)
    }

    /// Immediately deregister all stack hooks and discard the handle.
    ///
    /// Terminal action of the watchdog. Does not fire
    /// [`closed`](Self::closed).
    pub fn abort(&self) {
        let sock = {
            let mut inner = self.inner.lock();
            inner.state = ConnectionState::Closed;
            inner.sock.take()
        };
        if let Some(sock) = sock {
            self.stack.remove_hooks(sock);
            self.stack.abort(sock);
        }
    }

    fn close_with_reason(&self, force: bool, reason: CloseReason) -> CloseDisposition {
        let sock = {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Closed && !force {
                return CloseDisposition::AlreadyClosed;
            }
            inner.state = ConnectionState::Closing;
            // The handle is intentionally kept so it can be recycled.
            inner.sock
        };

        if let Some(sock) = sock {
            let _ = self.stack.close(sock);
        }

        let disposition = if self.closed.slot_count() > 0 {
            CloseDisposition::Notified
        } else {
            CloseDisposition::Unobserved
        };
        self.closed.emit(reason);
        self.inner.lock().state = ConnectionState::Closed;
        disposition
    }

    /// Build the event hooks routing raw stack events back to this
    /// connection. The hooks hold only weak references.
    fn hooks(self: &Arc<Self>) -> EventHooks {
        let recv = Arc::downgrade(self);
        let sent = Arc::downgrade(self);
        let err = Arc::downgrade(self);
        let poll = Arc::downgrade(self);
        let connected = Arc::downgrade(self);
        EventHooks {
            receive: Box::new(move |chunk| match recv.upgrade() {
                Some(conn) => conn.handle_receive(chunk),
                None => HookStatus::Closed,
            }),
            sent: Box::new(move |len| {
                if let Some(conn) = sent.upgrade() {
                    conn.handle_sent(len);
                }
            }),
            error: Box::new(move |code| {
                if let Some(conn) = err.upgrade() {
                    conn.handle_error(code);
                }
            }),
            poll: Box::new(move || match poll.upgrade() {
                Some(conn) => conn.handle_poll(),
                None => HookStatus::Closed,
            }),
            connected: Box::new(move || {
                if let Some(conn) = connected.upgrade() {
                    conn.handle_connected();
                }
            }),
        }
    }

    fn handle_receive(&self, chunk: Option<Chunk<'_>>) -> HookStatus {
        let chunk = match chunk {
            Some(chunk) if !chunk.data.is_empty() => chunk,
            // EOF or empty delivery: the remote end closed.
            _ => {
                tracing::debug!(
                    target: "emberlink_net::connection",
                    id = %self.id,
                    "remote end closed the connection"
                );
                self.close_with_reason(true, CloseReason::Remote);
                return HookStatus::Closed;
            }
        };

        let (sock, strip) = {
            let inner = self.inner.lock();
            (inner.sock, inner.strip_line_breaks)
        };

        // Consumed bytes are acknowledged and the stack buffer released
        // whether or not anything is delivered to the application.
        if let Some(sock) = sock {
            self.stack.acknowledge(sock, chunk.total_len);
        }

        let chunk_len = chunk.data.len();
        let mut data = Vec::with_capacity(chunk_len);
        for &byte in chunk.data.iter().take(chunk.total_len) {
            if strip && (byte == b'\r' || byte == b'\n') {
                continue;
            }
            data.push(byte);
        }

        if !data.is_empty() {
            self.data_received.emit(InboundData {
                data,
                chunk_len,
                total_len: chunk.total_len,
            });
        }

        HookStatus::Continue
    }

    fn handle_sent(&self, len: usize) {
        {
            let mut inner = self.inner.lock();
            inner.awaiting_ack = false;
            inner.missed_acks = 0;
        }
        self.bytes_written.emit(len);
    }

    fn handle_error(&self, code: SocketError) {
        tracing::debug!(
            target: "emberlink_net::connection",
            id = %self.id,
            error = %code,
            "socket error"
        );
        // Closing (or not) is left to the application and the watchdog.
        self.error.emit(code);
    }

    fn handle_connected(&self) {
        self.inner.lock().state = ConnectionState::Established;
        self.connected.emit(());
    }

    fn handle_poll(&self) -> HookStatus {
        let probe_sock = {
            let mut inner = self.inner.lock();
            inner.poll_ticks += 1;
            if inner.ping_watchdog && inner.poll_ticks > self.ping_interval_ticks {
                inner.poll_ticks = 0;
                Some(inner.sock)
            } else {
                None
            }
        };

        if let Some(sock) = probe_sock {
            let probe_ok = match sock {
                Some(sock) => {
                    let written = self.stack.send(sock, PING_PROBE);
                    self.stack.flush(sock);
                    written.is_ok()
                }
                None => false,
            };

            let presumed_dead = {
                let mut inner = self.inner.lock();
                // A probe that was never acknowledged via the sent event
                // leaves awaiting_ack set from the previous interval.
                if inner.awaiting_ack {
                    inner.missed_acks += 1;
                }
                let dead = inner.missed_acks >= self.max_missed_acks || !probe_ok;
                if !dead {
                    inner.awaiting_ack = true;
                }
                dead
            };

            if presumed_dead {
                tracing::debug!(
                    target: "emberlink_net::connection",
                    id = %self.id,
                    "ping watchdog tripped, remote end presumed dead"
                );
                self.error.emit(SocketError::RemoteUnresponsive);
                self.close_with_reason(false, CloseReason::Watchdog);
                self.abort();
                return HookStatus::Closed;
            }
        }

        self.poll.emit(());
        HookStatus::Continue
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("sock", &inner.sock)
            .field("state", &inner.state)
            .field("ping_watchdog", &inner.ping_watchdog)
            .finish()
    }
}

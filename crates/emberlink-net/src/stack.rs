//! The transport boundary: an abstract, callback-based raw TCP stack.
//!
//! Everything in this crate sits on top of a [`TcpStack`] implementation
//! supplied by the embedding runtime. The stack owns the actual
//! connections (establishment, buffering, retransmission); this crate only
//! sees opaque [`SocketId`] handles and the event hooks it installs on
//! them.
//!
//! The contract is single-threaded and cooperative: the runtime drives the
//! stack, and the stack invokes installed hooks synchronously, one at a
//! time. Hook invocations may re-enter the stack (a receive hook may close
//! the socket it is being invoked for), so implementations must not hold
//! internal locks across a hook call.

use std::net::Ipv4Addr;

use crate::error::{Result, SocketError};

/// Opaque handle to one raw transport-layer connection.
///
/// Issued and owned by the [`TcpStack`]; this crate never interprets the
/// value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketId(u32);

impl SocketId {
    /// Create a socket ID from a raw value.
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sock-{}", self.0)
    }
}

/// One inbound chunk of data as handed over by the stack.
///
/// `data` is the chunk the stack is delivering right now; `total_len` is
/// the total length of the buffered segment it belongs to (the stack may
/// deliver a segment in chunks).
#[derive(Clone, Copy, Debug)]
pub struct Chunk<'a> {
    /// The bytes of this chunk. Borrowed from the stack-owned buffer; must
    /// not be retained past the hook invocation.
    pub data: &'a [u8],
    /// Total length of the segment this chunk belongs to.
    pub total_len: usize,
}

/// What a receive or poll hook tells the stack about the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookStatus {
    /// The connection stays up; keep delivering events.
    Continue,
    /// The connection was torn down while handling the event; the stack
    /// must stop delivering events for this socket.
    Closed,
}

/// Whether an inbound connection was admitted by the accept hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptDecision {
    /// The connection was wrapped and is now tracked.
    Accepted,
    /// The connection was refused (the hook already closed the handle).
    Refused,
}

/// The event hooks one connection installs on its raw socket.
///
/// Each hook routes the raw event back to the owning connection; the
/// closures capture whatever state they need, replacing the function
/// pointer + untyped context pointer convention of C stacks.
pub struct EventHooks {
    /// Inbound data, or `None` when the remote end closed (EOF).
    pub receive: Box<dyn Fn(Option<Chunk<'_>>) -> HookStatus + Send + Sync>,
    /// The remote end acknowledged `len` previously written bytes.
    pub sent: Box<dyn Fn(usize) + Send + Sync>,
    /// A transport-level error on this socket.
    pub error: Box<dyn Fn(SocketError) + Send + Sync>,
    /// One scheduler tick elapsed for this socket.
    pub poll: Box<dyn Fn() -> HookStatus + Send + Sync>,
    /// An outbound connect request completed.
    pub connected: Box<dyn Fn() + Send + Sync>,
}

/// Hook invoked by the stack for each inbound connection on a listening
/// socket. Receives the freshly allocated handle for the new connection.
pub type AcceptHook = Box<dyn Fn(SocketId) -> AcceptDecision + Send + Sync>;

/// Abstract raw TCP/IP stack.
///
/// Implementations use interior mutability; all methods take `&self` so a
/// single stack can be shared (`Arc<dyn TcpStack>`) between the server,
/// the client and every connection.
pub trait TcpStack: Send + Sync {
    /// Allocate a fresh, unconnected socket handle.
    fn open(&self) -> Result<SocketId>;

    /// Bind a listening socket on `port` and register the accept hook.
    ///
    /// `backlog` bounds the number of not-yet-accepted connections the
    /// stack may queue.
    fn listen(&self, port: u16, backlog: usize, on_accept: AcceptHook) -> Result<SocketId>;

    /// Install the event hooks for `sock` and arm its poll timer so the
    /// poll hook fires every `poll_interval` scheduler ticks.
    ///
    /// Installing hooks on a socket that already has hooks replaces them
    /// (re-binding a recycled handle).
    fn install_hooks(&self, sock: SocketId, hooks: EventHooks, poll_interval: u8);

    /// Remove all event hooks from `sock` and disarm its poll timer.
    fn remove_hooks(&self, sock: SocketId);

    /// Submit an asynchronous connect request for `sock`.
    ///
    /// Returns once the request is submitted; completion is signaled later
    /// through the socket's `connected` hook.
    fn connect(&self, sock: SocketId, addr: Ipv4Addr, port: u16) -> Result<()>;

    /// Write bytes to the socket's outgoing buffer. Returns the number of
    /// bytes accepted. No segmentation is performed.
    fn send(&self, sock: SocketId, data: &[u8]) -> Result<usize>;

    /// Flush the socket's outgoing buffer onto the wire.
    fn flush(&self, sock: SocketId);

    /// Acknowledge `len` consumed inbound bytes back to the stack so it
    /// can open its receive window.
    fn acknowledge(&self, sock: SocketId, len: usize);

    /// Issue a graceful close for `sock`. The handle stays valid until
    /// [`abort`](Self::abort)ed, so it can be recycled for a reconnect.
    fn close(&self, sock: SocketId) -> Result<()>;

    /// Immediately discard `sock`, dropping any buffered data. The handle
    /// is invalid afterwards.
    fn abort(&self, sock: SocketId);

    /// The remote endpoint of `sock`, if connected.
    fn peer_addr(&self, sock: SocketId) -> Option<(Ipv4Addr, u16)>;
}

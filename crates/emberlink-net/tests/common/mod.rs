//! In-memory fake transport stack for integration tests.
//!
//! The fake records every call made against the [`TcpStack`] trait and
//! exposes driver methods (`incoming`, `deliver`, `tick`, `ack`, ...) that
//! fire the installed hooks exactly as a real stack would: synchronously,
//! one at a time, with no stack-internal lock held across the hook call.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;

use emberlink_net::{
    AcceptDecision, AcceptHook, Chunk, EventHooks, HookStatus, Result, SocketError, SocketId,
    TcpStack,
};

#[derive(Default)]
struct FakeSocket {
    hooks: Option<Arc<EventHooks>>,
    poll_interval: u8,
    sent: Vec<Vec<u8>>,
    fail_sends: bool,
    fail_connect: bool,
    acked: usize,
    ack_events: usize,
    flushes: usize,
    closed: bool,
    aborted: bool,
    connect_requests: usize,
    peer: Option<(Ipv4Addr, u16)>,
}

struct Listener {
    port: u16,
    backlog: usize,
    on_accept: Arc<AcceptHook>,
    closed: bool,
}

#[derive(Default)]
struct Inner {
    next_id: u32,
    sockets: HashMap<SocketId, FakeSocket>,
    listeners: HashMap<SocketId, Listener>,
    fail_open: bool,
    fail_listen: bool,
}

/// Scriptable in-memory transport.
#[derive(Default)]
pub struct FakeStack {
    inner: Mutex<Inner>,
}

#[allow(dead_code)]
impl FakeStack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.inner.lock().fail_open = fail;
    }

    pub fn set_fail_listen(&self, fail: bool) {
        self.inner.lock().fail_listen = fail;
    }

    pub fn set_fail_sends(&self, sock: SocketId, fail: bool) {
        if let Some(socket) = self.inner.lock().sockets.get_mut(&sock) {
            socket.fail_sends = fail;
        }
    }

    pub fn set_fail_connect(&self, sock: SocketId, fail: bool) {
        if let Some(socket) = self.inner.lock().sockets.get_mut(&sock) {
            socket.fail_connect = fail;
        }
    }

    pub fn set_peer(&self, sock: SocketId, addr: Ipv4Addr, port: u16) {
        if let Some(socket) = self.inner.lock().sockets.get_mut(&sock) {
            socket.peer = Some((addr, port));
        }
    }

    /// Simulate an inbound connection on `listener`. Returns the handle
    /// allocated for it and the accept hook's decision.
    pub fn incoming(&self, listener: SocketId) -> (SocketId, AcceptDecision) {
        let (sock, hook) = {
            let mut inner = self.inner.lock();
            let sock = inner.alloc();
            inner.sockets.insert(sock, FakeSocket::default());
            let hook = inner
                .listeners
                .get(&listener)
                .map(|l| Arc::clone(&l.on_accept))
                .expect("no such listener");
            (sock, hook)
        };
        let decision = hook(sock);
        (sock, decision)
    }

    /// Deliver an inbound chunk to `sock`'s receive hook.
    pub fn deliver(&self, sock: SocketId, data: &[u8], total_len: usize) -> Option<HookStatus> {
        let hooks = self.hooks_for(sock)?;
        Some((hooks.receive)(Some(Chunk { data, total_len })))
    }

    /// Deliver EOF (remote close) to `sock`'s receive hook.
    pub fn deliver_eof(&self, sock: SocketId) -> Option<HookStatus> {
        let hooks = self.hooks_for(sock)?;
        Some((hooks.receive)(None))
    }

    /// Fire `sock`'s sent hook: the remote end acknowledged `len` bytes.
    pub fn ack(&self, sock: SocketId, len: usize) {
        if let Some(hooks) = self.hooks_for(sock) {
            (hooks.sent)(len);
        }
    }

    /// Fire one poll tick on `sock`.
    pub fn tick(&self, sock: SocketId) -> Option<HookStatus> {
        let hooks = self.hooks_for(sock)?;
        Some((hooks.poll)())
    }

    /// Fire `n` poll ticks, stopping early if a tick reports `Closed`.
    pub fn ticks(&self, sock: SocketId, n: u32) -> Option<HookStatus> {
        let mut last = None;
        for _ in 0..n {
            match self.tick(sock) {
                Some(HookStatus::Closed) => return Some(HookStatus::Closed),
                status => last = status,
            }
        }
        last
    }

    /// Complete a pending connect request on `sock`.
    pub fn finish_connect(&self, sock: SocketId) {
        if let Some(hooks) = self.hooks_for(sock) {
            (hooks.connected)();
        }
    }

    /// Fire `sock`'s error hook.
    pub fn raise_error(&self, sock: SocketId, err: SocketError) {
        if let Some(hooks) = self.hooks_for(sock) {
            (hooks.error)(err);
        }
    }

    pub fn poll_interval(&self, sock: SocketId) -> u8 {
        self.inner
            .lock()
            .sockets
            .get(&sock)
            .map_or(0, |s| s.poll_interval)
    }

    pub fn has_hooks(&self, sock: SocketId) -> bool {
        self.inner
            .lock()
            .sockets
            .get(&sock)
            .map_or(false, |s| s.hooks.is_some())
    }

    pub fn sent_payloads(&self, sock: SocketId) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .sockets
            .get(&sock)
            .map(|s| s.sent.clone())
            .unwrap_or_default()
    }

    pub fn acked_bytes(&self, sock: SocketId) -> usize {
        self.inner.lock().sockets.get(&sock).map_or(0, |s| s.acked)
    }

    pub fn ack_count(&self, sock: SocketId) -> usize {
        self.inner
            .lock()
            .sockets
            .get(&sock)
            .map_or(0, |s| s.ack_events)
    }

    pub fn flush_count(&self, sock: SocketId) -> usize {
        self.inner
            .lock()
            .sockets
            .get(&sock)
            .map_or(0, |s| s.flushes)
    }

    pub fn is_closed(&self, sock: SocketId) -> bool {
        self.inner
            .lock()
            .sockets
            .get(&sock)
            .map_or(false, |s| s.closed)
    }

    pub fn is_aborted(&self, sock: SocketId) -> bool {
        self.inner
            .lock()
            .sockets
            .get(&sock)
            .map_or(false, |s| s.aborted)
    }

    pub fn connect_requests(&self, sock: SocketId) -> usize {
        self.inner
            .lock()
            .sockets
            .get(&sock)
            .map_or(0, |s| s.connect_requests)
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().sockets.len()
    }

    pub fn is_listener_closed(&self, listener: SocketId) -> bool {
        self.inner
            .lock()
            .listeners
            .get(&listener)
            .map_or(false, |l| l.closed)
    }

    /// Handles of all listening sockets, oldest first.
    pub fn listener_ids(&self) -> Vec<SocketId> {
        let inner = self.inner.lock();
        let mut ids: Vec<SocketId> = inner.listeners.keys().copied().collect();
        ids.sort_by_key(|id| id.as_u32());
        ids
    }

    pub fn listener_port(&self, listener: SocketId) -> u16 {
        self.inner
            .lock()
            .listeners
            .get(&listener)
            .map_or(0, |l| l.port)
    }

    pub fn listener_backlog(&self, listener: SocketId) -> usize {
        self.inner
            .lock()
            .listeners
            .get(&listener)
            .map_or(0, |l| l.backlog)
    }

    // Hooks are invoked with no lock held: they re-enter the stack.
    fn hooks_for(&self, sock: SocketId) -> Option<Arc<EventHooks>> {
        self.inner
            .lock()
            .sockets
            .get(&sock)
            .and_then(|s| s.hooks.clone())
    }
}

impl Inner {
    fn alloc(&mut self) -> SocketId {
        let id = SocketId::new(self.next_id);
        self.next_id += 1;
        id
    }
}

impl TcpStack for FakeStack {
    fn open(&self) -> Result<SocketId> {
        let mut inner = self.inner.lock();
        if inner.fail_open {
            return Err(SocketError::AllocationFailed);
        }
        let sock = inner.alloc();
        inner.sockets.insert(sock, FakeSocket::default());
        Ok(sock)
    }

    fn listen(&self, port: u16, backlog: usize, on_accept: AcceptHook) -> Result<SocketId> {
        let mut inner = self.inner.lock();
        if inner.fail_listen {
            return Err(SocketError::ListenFailed(format!(
                "cannot bind port {port}"
            )));
        }
        let sock = inner.alloc();
        inner.listeners.insert(
            sock,
            Listener {
                port,
                backlog,
                on_accept: Arc::new(on_accept),
                closed: false,
            },
        );
        Ok(sock)
    }

    fn install_hooks(&self, sock: SocketId, hooks: EventHooks, poll_interval: u8) {
        if let Some(socket) = self.inner.lock().sockets.get_mut(&sock) {
            socket.hooks = Some(Arc::new(hooks));
            socket.poll_interval = poll_interval;
        }
    }

    fn remove_hooks(&self, sock: SocketId) {
        if let Some(socket) = self.inner.lock().sockets.get_mut(&sock) {
            socket.hooks = None;
        }
    }

    fn connect(&self, sock: SocketId, addr: Ipv4Addr, port: u16) -> Result<()> {
        let mut inner = self.inner.lock();
        let socket = inner
            .sockets
            .get_mut(&sock)
            .ok_or(SocketError::ConnectionRequestRejected)?;
        if socket.fail_connect {
            return Err(SocketError::ConnectionRequestRejected);
        }
        socket.connect_requests += 1;
        socket.peer = Some((addr, port));
        Ok(())
    }

    fn send(&self, sock: SocketId, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let socket = inner.sockets.get_mut(&sock).ok_or(SocketError::SendFailed)?;
        if socket.fail_sends {
            return Err(SocketError::SendFailed);
        }
        socket.sent.push(data.to_vec());
        Ok(data.len())
    }

    fn flush(&self, sock: SocketId) {
        if let Some(socket) = self.inner.lock().sockets.get_mut(&sock) {
            socket.flushes += 1;
        }
    }

    fn acknowledge(&self, sock: SocketId, len: usize) {
        if let Some(socket) = self.inner.lock().sockets.get_mut(&sock) {
            socket.acked += len;
            socket.ack_events += 1;
        }
    }

    fn close(&self, sock: SocketId) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(socket) = inner.sockets.get_mut(&sock) {
            socket.closed = true;
            return Ok(());
        }
        if let Some(listener) = inner.listeners.get_mut(&sock) {
            listener.closed = true;
            return Ok(());
        }
        Ok(())
    }

    fn abort(&self, sock: SocketId) {
        if let Some(socket) = self.inner.lock().sockets.get_mut(&sock) {
            socket.aborted = true;
        }
    }

    fn peer_addr(&self, sock: SocketId) -> Option<(Ipv4Addr, u16)> {
        self.inner.lock().sockets.get(&sock).and_then(|s| s.peer)
    }
}

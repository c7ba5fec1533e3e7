//! Event-driven TCP connections for embedded, callback-based stacks.
//!
//! This crate layers a signal-based connection abstraction on top of a raw
//! TCP/IP stack of the kind found on embedded devices: the stack owns the
//! transport and delivers events (receive, sent, error, poll, connected)
//! through installed hooks, and everything above runs single-threaded and
//! cooperatively.
//!
//! Three entry points:
//!
//! - [`Connection`]: one connection's event state machine, with a
//!   tick-counted ping watchdog that terminates unresponsive peers.
//! - [`TcpServer`]: a listening socket plus a bounded connection registry
//!   with admission control, broadcast and eviction.
//! - [`TcpClient`]: one outbound connection with a setup/connect flow and
//!   a pluggable address [`Resolver`].
//!
//! The transport itself is reached through the [`TcpStack`] trait, so the
//! whole layer can run against a fake stack in tests.

#![warn(missing_docs)]

mod client;
mod config;
mod connection;
mod error;
mod server;
mod stack;
mod state;

pub use client::{IpResolver, Resolver, TcpClient};
pub use config::{
    ClientConfig, ServerConfig, SocketConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_MISSED_ACKS,
    DEFAULT_PING_INTERVAL_TICKS, DEFAULT_SERVER_PORT,
};
pub use connection::{
    CloseDisposition, CloseReason, Connection, ConnectionId, InboundData, PING_PROBE,
};
pub use error::{Result, SocketError};
pub use server::TcpServer;
pub use stack::{AcceptDecision, AcceptHook, Chunk, EventHooks, HookStatus, SocketId, TcpStack};
pub use state::ConnectionState;

//! Outbound TCP client.
//!
//! A [`TcpClient`] owns exactly one [`Connection`] and drives it through
//! the setup → connect → established flow. Setup (handle allocation and
//! address resolution) is separated from the connect request itself so a
//! failed connect can be retried on the same handle.

use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{Result, SocketError};
use crate::stack::TcpStack;
use crate::state::ConnectionState;

/// Resolves a host string to a numeric IPv4 address.
///
/// The default [`IpResolver`] only accepts numeric addresses; embeddings
/// with a DNS-capable stack can supply their own implementation via
/// [`TcpClient::with_resolver`].
pub trait Resolver: Send + Sync {
    /// Resolve `host` to an IPv4 address.
    fn resolve(&self, host: &str) -> Result<Ipv4Addr>;
}

/// Resolver accepting numeric IPv4 addresses only.
#[derive(Debug, Default)]
pub struct IpResolver;

impl Resolver for IpResolver {
    fn resolve(&self, host: &str) -> Result<Ipv4Addr> {
        host.parse()
            .map_err(|_| SocketError::AddressResolutionFailed {
                host: host.to_owned(),
            })
    }
}

/// A TCP client for one outbound connection.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use emberlink_net::{ClientConfig, TcpClient, TcpStack};
/// # fn demo(stack: Arc<dyn TcpStack>) -> emberlink_net::Result<()> {
/// let client = TcpClient::new(stack, ClientConfig::new("192.168.4.10", 5000));
///
/// client.connection().connected.connect(|_| {
///     println!("connected");
/// });
///
/// client.setup()?;
/// client.connect()?;
/// # Ok(())
/// # }
/// ```
pub struct TcpClient {
    config: ClientConfig,
    stack: Arc<dyn TcpStack>,
    resolver: Box<dyn Resolver>,
    connection: Arc<Connection>,
    endpoint: Mutex<Option<(Ipv4Addr, u16)>>,
}

impl TcpClient {
    /// Create a new client with the numeric-only [`IpResolver`].
    pub fn new(stack: Arc<dyn TcpStack>, config: ClientConfig) -> Self {
        Self::with_resolver(stack, config, Box::new(IpResolver))
    }

    /// Create a new client with a custom address resolver.
    pub fn with_resolver(
        stack: Arc<dyn TcpStack>,
        config: ClientConfig,
        resolver: Box<dyn Resolver>,
    ) -> Self {
        let connection = Connection::new(Arc::clone(&stack), &config.socket);
        Self {
            config,
            stack,
            resolver,
            connection,
            endpoint: Mutex::new(None),
        }
    }

    /// Allocate the socket handle and resolve the remote address.
    ///
    /// Must complete before [`connect`](Self::connect). Validates the
    /// configured port, resolves the host and binds the connection's
    /// event hooks.
    pub fn setup(&self) -> Result<()> {
        if self.config.port == 0 {
            tracing::warn!(
                target: "emberlink_net::client",
                host = %self.config.host,
                "client setup rejected: port is zero"
            );
            return Err(SocketError::InvalidPort);
        }

        let addr = self.resolver.resolve(&self.config.host)?;
        let sock = self
            .stack
            .open()
            .map_err(|_| SocketError::AllocationFailed)?;
        self.connection.bind(sock);
        *self.endpoint.lock() = Some((addr, self.config.port));

        tracing::debug!(
            target: "emberlink_net::client",
            addr = %addr,
            port = self.config.port,
            "client setup complete"
        );
        Ok(())
    }

    /// Submit the asynchronous connect request.
    ///
    /// Completion is signaled through the connection's `connected` signal.
    /// Can be called again after a close to reconnect on the recycled
    /// handle.
    pub fn connect(&self) -> Result<()> {
        let (addr, port) = match *self.endpoint.lock() {
            Some(endpoint) => endpoint,
            None => {
                tracing::debug!(
                    target: "emberlink_net::client",
                    host = %self.config.host,
                    "connect attempted before setup has completed"
                );
                return Err(SocketError::ConnectionRequestRejected);
            }
        };
        self.connection.connect(addr, port)
    }

    /// Write bytes to the connection, unframed.
    pub fn send(&self, payload: &[u8]) -> Result<usize> {
        self.connection.send(payload)
    }

    /// Gracefully close the connection. The handle is retained for a
    /// reconnect.
    pub fn close(&self) {
        self.connection.close(false);
    }

    /// Enable or disable the ping watchdog. Returns the new setting.
    pub fn set_ping_watchdog(&self, enabled: bool) -> bool {
        self.connection.set_ping_watchdog(enabled)
    }

    /// The underlying connection, for connecting slots to its signals.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// The configured remote host string.
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// The configured remote port.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// The configured address as a `host:port` string.
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Current state of the underlying connection.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Check if the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connection.state() == ConnectionState::Established
    }
}

impl std::fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.connection.state())
            .finish()
    }
}

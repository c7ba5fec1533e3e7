//! Configuration types for the connection layer.

/// Default listening port for a server.
pub const DEFAULT_SERVER_PORT: u16 = 5000;

/// Default maximum number of concurrently tracked connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;

/// Default number of poll ticks between liveness probes.
pub const DEFAULT_PING_INTERVAL_TICKS: u32 = 10;

/// Default number of consecutive unacknowledged probes before a
/// connection is presumed dead.
pub const DEFAULT_MAX_MISSED_ACKS: u8 = 2;

/// Per-connection options.
///
/// The watchdog interval is counted in scheduler ticks, not wall-clock
/// time: its real-world cadence is however often the embedding runtime
/// drives the stack's poll event (`poll_interval` ticks apart, nominally a
/// fixed short interval).
#[derive(Clone, Debug)]
pub struct SocketConfig {
    /// Terminate the connection when liveness probes go unacknowledged.
    pub ping_watchdog: bool,
    /// Strip `\r`/`\n` bytes from inbound payload before delivery.
    pub strip_line_breaks: bool,
    /// Poll ticks between liveness probes.
    pub ping_interval_ticks: u32,
    /// Consecutive unacknowledged probes tolerated before forced
    /// termination.
    pub max_missed_acks: u8,
    /// Scheduler ticks between poll events, passed to the stack when the
    /// poll timer is armed.
    pub poll_interval: u8,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            ping_watchdog: true,
            strip_line_breaks: true,
            ping_interval_ticks: DEFAULT_PING_INTERVAL_TICKS,
            max_missed_acks: DEFAULT_MAX_MISSED_ACKS,
            poll_interval: 1,
        }
    }
}

impl SocketConfig {
    /// Create a new socket configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the ping watchdog.
    pub fn ping_watchdog(mut self, enabled: bool) -> Self {
        self.ping_watchdog = enabled;
        self
    }

    /// Enable or disable line-break filtering of inbound payload.
    pub fn strip_line_breaks(mut self, enabled: bool) -> Self {
        self.strip_line_breaks = enabled;
        self
    }

    /// Set the number of poll ticks between liveness probes.
    pub fn ping_interval_ticks(mut self, ticks: u32) -> Self {
        self.ping_interval_ticks = ticks;
        self
    }

    /// Set the number of missed probe acknowledgements tolerated.
    pub fn max_missed_acks(mut self, count: u8) -> Self {
        self.max_missed_acks = count;
        self
    }

    /// Set the poll timer interval in scheduler ticks.
    pub fn poll_interval(mut self, ticks: u8) -> Self {
        self.poll_interval = ticks;
        self
    }
}

/// Configuration for a server (connection registry).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// The port to listen on.
    pub port: u16,
    /// Maximum number of concurrently tracked connections. Inbound
    /// connections beyond this are refused before they become visible.
    pub max_connections: usize,
    /// Options applied to every accepted connection.
    pub socket: SocketConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVER_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            socket: SocketConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration listening on `port`.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Set the admission limit.
    pub fn max_connections(mut self, limit: usize) -> Self {
        self.max_connections = limit;
        self
    }

    /// Set socket options for accepted connections.
    pub fn socket_config(mut self, config: SocketConfig) -> Self {
        self.socket = config;
        self
    }

    /// Enable or disable the ping watchdog for accepted connections.
    pub fn ping_watchdog(mut self, enabled: bool) -> Self {
        self.socket.ping_watchdog = enabled;
        self
    }

    /// Enable or disable line-break filtering for accepted connections.
    pub fn strip_line_breaks(mut self, enabled: bool) -> Self {
        self.socket.strip_line_breaks = enabled;
        self
    }
}

/// Configuration for an outbound client connection.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// The host to connect to (numeric IPv4, resolved at setup time).
    pub host: String,
    /// The port to connect to.
    pub port: u16,
    /// Socket-level options.
    pub socket: SocketConfig,
}

impl ClientConfig {
    /// Create a new client configuration.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            socket: SocketConfig::default(),
        }
    }

    /// Set socket options.
    pub fn socket_config(mut self, config: SocketConfig) -> Self {
        self.socket = config;
        self
    }

    /// Enable or disable the ping watchdog.
    pub fn ping_watchdog(mut self, enabled: bool) -> Self {
        self.socket.ping_watchdog = enabled;
        self
    }

    /// Enable or disable line-break filtering of inbound payload.
    pub fn strip_line_breaks(mut self, enabled: bool) -> Self {
        self.socket.strip_line_breaks = enabled;
        self
    }

    /// Get the address string (host:port).
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

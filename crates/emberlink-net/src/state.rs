//! State enum for the connection lifecycle.

/// Current state of a connection.
///
/// `Bound` means a raw socket handle exists but no remote peer is
/// confirmed. `Established` is reached either immediately on accept
/// (server role) or when an active connect completes (client role).
/// `Closed` is terminal for the connection's current life, but a closed
/// connection that retained its handle can be re-bound for a reconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket handle is attached.
    Unbound,
    /// A socket handle is attached but no peer is confirmed.
    Bound,
    /// An outbound connect request is in flight.
    Connecting,
    /// Connected and ready to send/receive data.
    Established,
    /// A graceful close is being issued.
    Closing,
    /// The connection is closed.
    Closed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Unbound
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbound => write!(f, "Unbound"),
            Self::Bound => write!(f, "Bound"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Established => write!(f, "Established"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

//! Error types for the socket layer.

use thiserror::Error;

/// Socket-layer errors.
///
/// Setup-time failures (`AllocationFailed`, `InvalidPort`,
/// `AddressResolutionFailed`, `ListenFailed`) are returned from the
/// operation that triggered them. Per-connection runtime failures
/// (`SendFailed`, `RemoteUnresponsive`, `RemoteClosed`) additionally
/// surface through a connection's `error`/`closed` signals, never as
/// panics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    /// A raw socket handle could not be allocated by the stack.
    #[error("raw socket allocation failed")]
    AllocationFailed,

    /// The configured port is not usable (zero).
    #[error("invalid port")]
    InvalidPort,

    /// The remote address could not be resolved to a numeric endpoint.
    #[error("address resolution failed for '{host}'")]
    AddressResolutionFailed {
        /// The host string that failed to resolve.
        host: String,
    },

    /// The stack refused to submit an outbound connect request.
    #[error("connection request rejected by the stack")]
    ConnectionRequestRejected,

    /// An inbound connection was refused because the registry is full.
    #[error("connection refused: registry at capacity")]
    AdmissionRejected,

    /// The stack refused a write.
    #[error("send rejected by the stack")]
    SendFailed,

    /// The liveness watchdog gave up on the remote end.
    #[error("remote end unresponsive (missed ping acknowledgements)")]
    RemoteUnresponsive,

    /// The remote end closed the connection.
    #[error("remote end closed the connection")]
    RemoteClosed,

    /// The listening socket could not be allocated or bound.
    #[error("listen failed: {0}")]
    ListenFailed(String),
}

/// A specialized Result type for socket operations.
pub type Result<T> = std::result::Result<T, SocketError>;

use thiserror::Error;

/// Error type shared across the socket and pool layers.
#[derive(Debug, Clone, Error)]
pub enum DeepgramError {
    /// A constructor or setter was handed an unusable value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was attempted in a lifecycle state that forbids it.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// No connection became available within the acquire deadline.
    #[error("Acquire timeout: {0}")]
    AcquireTimeout(String),

    /// The WebSocket handshake (or session creation around it) failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport rejected a frame after the connection was established.
    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Result type alias for convenience
pub type DeepgramResult<T> = Result<T, DeepgramError>;

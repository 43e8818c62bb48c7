#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// WebSocket connection was closed
    ConnectionClosed,
    /// Operation did not complete within its bound
    Timeout(Duration),
    /// A liveness probe failed, so the session is considered dead
    HeartbeatFailed,
    /// The lifecycle token was cancelled; shutdown was requested
    Cancelled,
    /// Received a frame larger than the configured maximum
    FrameTooLarge {
        /// Size of the received payload in bytes
        size: usize,
        /// Configured maximum in bytes
        max: usize,
    },
    /// The manager is already running
    AlreadyStarted,
    /// The manager was closed and cannot be started again
    Closed,
}

impl WsError {
    /// Whether this error is the cancellation sentinel rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::Timeout(after) => write!(f, "WebSocket operation timed out after {after:?}"),
            Self::HeartbeatFailed => write!(f, "WebSocket heartbeat failed; peer unresponsive"),
            Self::Cancelled => write!(f, "WebSocket lifecycle cancelled"),
            Self::FrameTooLarge { size, max } => {
                write!(f, "WebSocket frame of {size} bytes exceeds limit of {max} bytes")
            }
            Self::AlreadyStarted => write!(f, "WebSocket connection manager already started"),
            Self::Closed => write!(f, "WebSocket connection manager closed"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}

/// Returns `true` when `error` carries the [`WsError::Cancelled`] sentinel.
pub(crate) fn is_cancellation(error: &crate::error::Error) -> bool {
    error
        .downcast_ref::<WsError>()
        .is_some_and(WsError::is_cancelled)
}

//! Core traits for the connection lifecycle.
//!
//! The manager only ever talks to the transport through [`Connector`] and
//! [`Connection`], so the reconnection policy can be exercised against any
//! transport, including scripted in-memory ones.

use std::time::Duration;

use async_trait::async_trait;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::config::Config;
use crate::Result;

/// Kind of a data frame delivered by [`Connection::read`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

/// A single data frame received from the peer.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl Frame {
    #[must_use]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            kind: FrameKind::Text,
            payload: text.into().into_bytes(),
        }
    }

    #[must_use]
    pub fn binary<B: Into<Vec<u8>>>(payload: B) -> Self {
        Self {
            kind: FrameKind::Binary,
            payload: payload.into(),
        }
    }
}

/// One established transport session.
///
/// Reads, pings and closes may be issued concurrently from different tasks.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Wait for the next data frame. Control frames are handled internally.
    async fn read(&self) -> Result<Frame>;

    /// Send a liveness probe and wait up to `ack_timeout` for the peer's
    /// acknowledgment; a zero `ack_timeout` waits indefinitely.
    ///
    /// A probe that cannot be sent or is not acknowledged in time fails the
    /// session: pending and later [`Connection::read`] calls return an error.
    async fn ping(&self, ack_timeout: Duration) -> Result<()>;

    /// Close the session. Closing an already closed session is a no-op.
    async fn close(&self, code: CloseCode, reason: &str) -> Result<()>;
}

/// Establishes [`Connection`]s.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    /// Dial `endpoint`, attaching whatever `config` asks for (credentials,
    /// subprotocols, frame limits). Timeouts are applied by the caller.
    async fn connect(&self, endpoint: &str, config: &Config) -> Result<Self::Connection>;
}

/// Receives every data frame payload, synchronously and in order.
///
/// The transport is not read again until `handle` returns, so a slow handler
/// throttles intake.
///
/// # Example
///
/// ```ignore
/// let handler = |payload: &[u8]| println!("{} bytes", payload.len());
/// let manager = ConnectionManager::new(endpoint, config, handler);
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, payload: &[u8]);
}

impl<F> Handler for F
where
    F: Fn(&[u8]) + Send + Sync + 'static,
{
    fn handle(&self, payload: &[u8]) {
        self(payload);
    }
}

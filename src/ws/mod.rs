//! Self-healing WebSocket connection.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: owns one connection at a time; dials, runs the read
//!   loop and heartbeat, tears down and reconnects with backoff
//! - [`heartbeat`]: PING/PONG liveness probing, detection only
//! - [`reader`]: frame loop that hands payloads to a [`Handler`]
//! - [`backoff`]: pure retry pacing
//! - [`Connector`] / [`Connection`]: transport seam, implemented over
//!   tokio-tungstenite by [`WsConnector`]
//!
//! # Example
//!
//! ```ignore
//! let manager = ConnectionManager::new(endpoint, Config::default(), |payload: &[u8]| {
//!     // decode and act on payload
//! });
//! manager.start(&shutdown_token)?;
//! ```

pub mod backoff;
pub mod config;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod reader;
pub mod traits;
pub mod transport;

pub use connection::{ConnectionManager, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
pub use transport::{WsConnection, WsConnector};

//! Liveness probing for an established connection.
//!
//! The monitor only detects failure. A failed probe fails the transport
//! itself (see [`Connection::ping`]), the monitor exits, and the read loop
//! surfaces the transport error that drives teardown and reconnection.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use super::traits::Connection;

/// Why the heartbeat monitor stopped.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// A zero interval disables heartbeats
    Disabled,
    /// The governing token was cancelled
    Cancelled,
    /// A probe failed or was not acknowledged in time
    ProbeFailed,
}

/// Send a PING every `period` and wait up to `ack_timeout` for each PONG.
///
/// The first probe goes out one full `period` after the monitor starts.
pub async fn run<C: Connection + ?Sized>(
    token: CancellationToken,
    connection: &C,
    period: Duration,
    ack_timeout: Duration,
) -> Exit {
    if period.is_zero() {
        return Exit::Disabled;
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = token.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::trace!("Heartbeat cancellation requested, terminating...");
                return Exit::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        let probe = tokio::select! {
            () = token.cancelled() => return Exit::Cancelled,
            probe = connection.ping(ack_timeout) => probe,
        };

        match probe {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::trace!("Heartbeat acknowledged");
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, ?ack_timeout, "Heartbeat probe failed");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                return Exit::ProbeFailed;
            }
        }
    }
}

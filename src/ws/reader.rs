//! Inbound frame loop for an established connection.

use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::error::WsError;
use super::traits::{Connection, Handler};
use crate::error::Error;

/// Read frames until the connection fails or `token` is cancelled, handing
/// each payload to `handler` before requesting the next frame.
///
/// An idle `read_timeout` expiry is not an error; liveness is the heartbeat's
/// concern. The returned error is [`WsError::Cancelled`] when shutdown was
/// requested and the transport failure otherwise.
pub async fn run<C: Connection + ?Sized>(
    token: &CancellationToken,
    connection: &C,
    read_timeout: Duration,
    max_message_size: usize,
    handler: &dyn Handler,
) -> Error {
    loop {
        if token.is_cancelled() {
            return WsError::Cancelled.into();
        }

        let read = async {
            if read_timeout.is_zero() {
                Some(connection.read().await)
            } else {
                timeout(read_timeout, connection.read()).await.ok()
            }
        };

        let outcome = tokio::select! {
            () = token.cancelled() => return WsError::Cancelled.into(),
            outcome = read => outcome,
        };

        let frame = match outcome {
            None => {
                #[cfg(feature = "tracing")]
                tracing::trace!(?read_timeout, "Read idle, waiting for next frame");
                continue;
            }
            Some(Err(e)) => return e,
            Some(Ok(frame)) => frame,
        };

        if frame.payload.len() > max_message_size {
            return WsError::FrameTooLarge {
                size: frame.payload.len(),
                max: max_message_size,
            }
            .into();
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(kind = ?frame.kind, len = frame.payload.len(), "Received WebSocket frame");

        handler.handle(&frame.payload);
    }
}

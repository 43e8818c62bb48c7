#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::Instrument as _;

use super::config::Config;
use super::error::{WsError, is_cancellation};
use super::traits::{Connection, Connector, Handler};
use super::transport::WsConnector;
use super::{heartbeat, reader};
use crate::Result;
use crate::error::{Error, Kind};

/// Upper bound on sending our close frame during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started yet
    Idle,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Connected {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting out the backoff after a failed dial
    Reconnecting {
        /// Consecutive failed dials so far
        attempt: u32,
    },
    /// The previous connection was torn down
    Disconnected,
    /// The manager stopped for good
    Terminated,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Check if the manager has stopped and will not reconnect.
    #[must_use]
    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Manages the WebSocket connection lifecycle: dialing, reading, heartbeats,
/// reconnection with backoff and shutdown.
///
/// Exactly one connection is owned at a time. While it is up, a heartbeat
/// task probes it and the read loop hands every payload to the [`Handler`].
/// When the read loop fails (a missed pong makes it fail too) the connection
/// is torn down and, if reconnection is enabled, dialed again. Dial failures are paced by the backoff policy and
/// bounded by the retry budget; a successful dial resets both.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(
///     "ws://127.0.0.1:8081/ws".to_owned(),
///     Config::default(),
///     |payload: &[u8]| println!("{}", String::from_utf8_lossy(payload)),
/// );
///
/// let shutdown = CancellationToken::new();
/// manager.start(&shutdown)?;
/// // ...
/// manager.close().await?;
/// ```
pub struct ConnectionManager<C: Connector = WsConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C: Connector> {
    endpoint: String,
    config: Config,
    connector: C,
    handler: Box<dyn Handler>,
    /// Lifecycle token; set once, by `start` or by an early `close`
    lifecycle: OnceLock<CancellationToken>,
    /// The single active connection. Only assigned or taken under the lock,
    /// never held across I/O
    active: Mutex<Option<Arc<C::Connection>>>,
    /// Watch channel sender for state changes
    state_tx: watch::Sender<ConnectionState>,
    #[cfg(feature = "tracing")]
    span: tracing::Span,
}

impl ConnectionManager<WsConnector> {
    /// Create a connection manager dialing `endpoint` over tokio-tungstenite.
    ///
    /// Nothing happens until [`ConnectionManager::start`] is called.
    pub fn new<H: Handler>(endpoint: String, config: Config, handler: H) -> Self {
        Self::with_connector(endpoint, config, WsConnector, handler)
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a connection manager that dials through `connector`.
    pub fn with_connector<H: Handler>(
        endpoint: String,
        config: Config,
        connector: C,
        handler: H,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);

        #[cfg(feature = "tracing")]
        let span = tracing::info_span!("ws", endpoint = %endpoint);

        Self {
            inner: Arc::new(Inner {
                endpoint,
                config,
                connector,
                handler: Box::new(handler),
                lifecycle: OnceLock::new(),
                active: Mutex::new(None),
                state_tx,
                #[cfg(feature = "tracing")]
                span,
            }),
        }
    }

    /// Replace the span that the lifecycle task logs under.
    #[cfg(feature = "tracing")]
    pub fn with_span(self, span: tracing::Span) -> Result<Self> {
        let inner = Arc::into_inner(self.inner).ok_or(Error::validation(
            "Cannot replace the span while other references to this manager exist",
        ))?;

        Ok(Self {
            inner: Arc::new(Inner { span, ..inner }),
        })
    }

    /// Spawn the lifecycle loop on the current tokio runtime and return.
    ///
    /// The loop runs until [`ConnectionManager::close`] is called, `parent` is
    /// cancelled, reconnection is disabled and the connection fails, or the
    /// retry budget is exhausted. A manager can only be started once.
    pub fn start(&self, parent: &CancellationToken) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::with_source(Kind::Internal, e))?;

        if let Some(existing) = self.inner.lifecycle.get() {
            return Err(if existing.is_cancelled() {
                WsError::Closed
            } else {
                WsError::AlreadyStarted
            }
            .into());
        }

        let token = parent.child_token();
        self.inner
            .lifecycle
            .set(token.clone())
            .map_err(|_e| WsError::AlreadyStarted)?;

        let inner = Arc::clone(&self.inner);
        let task = async move { inner.run(token).await };

        #[cfg(feature = "tracing")]
        let task = task.instrument(self.inner.span.clone());

        runtime.spawn(task);

        Ok(())
    }

    /// Cancel the lifecycle and close the active connection, if any, with a
    /// normal closure.
    ///
    /// Idempotent and safe to call while the lifecycle loop is running; the
    /// connection is closed at most once.
    pub async fn close(&self) -> Result<()> {
        let mut never_started = false;
        let token = self.inner.lifecycle.get_or_init(|| {
            never_started = true;
            CancellationToken::new()
        });
        token.cancel();

        if never_started {
            self.inner.set_state(ConnectionState::Terminated);
        }

        let active = self.inner.active.lock().await.take();
        match active {
            Some(connection) => self.inner.close_connection(&*connection, "app closed").await,
            None => Ok(()),
        }
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until the manager has stopped for good.
    pub async fn terminated(&self) {
        let mut state_rx = self.inner.state_tx.subscribe();
        _ = state_rx.wait_for(|state| state.is_terminated()).await;
    }
}

impl<C: Connector> Inner<C> {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Main connection loop with automatic reconnection.
    async fn run(self: Arc<Self>, token: CancellationToken) {
        let reconnect = &self.config.reconnect;
        let mut retries = 0_u32;

        while !token.is_cancelled() {
            self.set_state(ConnectionState::Connecting);

            let connection = match self.dial(&token).await {
                Ok(connection) => Arc::new(connection),
                Err(e) => {
                    if is_cancellation(&e) {
                        break;
                    }

                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Unable to connect");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;

                    if !reconnect.enabled {
                        break;
                    }

                    retries = retries.saturating_add(1);
                    if reconnect.exhausted(retries) {
                        #[cfg(feature = "tracing")]
                        tracing::error!(retries, "Retry budget exhausted, giving up");
                        break;
                    }

                    let wait = reconnect.delay(retries);
                    self.set_state(ConnectionState::Reconnecting { attempt: retries });

                    #[cfg(feature = "tracing")]
                    tracing::info!(attempt = retries, ?wait, "Retrying connection");

                    tokio::select! {
                        () = token.cancelled() => break,
                        () = sleep(wait) => continue,
                    }
                }
            };

            retries = 0;
            #[cfg(feature = "tracing")]
            tracing::info!("WebSocket connected");

            *self.active.lock().await = Some(Arc::clone(&connection));
            self.set_state(ConnectionState::Connected {
                since: Instant::now(),
            });

            let heartbeat_token = token.child_token();
            let heartbeat_handle = {
                let token = heartbeat_token.clone();
                let connection = Arc::clone(&connection);
                let period = self.config.heartbeat_interval;
                let ack_timeout = self.config.heartbeat_timeout;
                let task =
                    async move { heartbeat::run(token, &*connection, period, ack_timeout).await };

                #[cfg(feature = "tracing")]
                let task = task.in_current_span();

                tokio::spawn(task)
            };

            let error = reader::run(
                &token,
                &*connection,
                self.config.read_timeout,
                self.config.max_message_size,
                &*self.handler,
            )
            .await;

            heartbeat_token.cancel();
            match heartbeat_handle.await {
                Ok(exit) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?exit, "Heartbeat stopped");
                    #[cfg(not(feature = "tracing"))]
                    let _ = exit;
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = %e, "Heartbeat task failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
            }

            let reason = if token.is_cancelled() {
                "app closed"
            } else {
                "reconnect"
            };
            let stored = self.active.lock().await.take();
            if let Some(stored) = stored
                && let Err(e) = self.close_connection(&*stored, reason).await
            {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "Ignoring error while closing connection");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
            }
            self.set_state(ConnectionState::Disconnected);

            if is_cancellation(&error) {
                break;
            }

            #[cfg(feature = "tracing")]
            tracing::warn!(error = %error, "Read loop ended");

            if !reconnect.enabled {
                break;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Connection manager terminated");

        self.set_state(ConnectionState::Terminated);
    }

    /// Dial once, bounded by the dial timeout and interruptible by `token`.
    async fn dial(&self, token: &CancellationToken) -> Result<C::Connection> {
        let bound = self.config.dial_timeout;
        let connect = self.connector.connect(&self.endpoint, &self.config);

        let attempt = async {
            if bound.is_zero() {
                connect.await
            } else {
                match timeout(bound, connect).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(WsError::Timeout(bound).into()),
                }
            }
        };

        tokio::select! {
            () = token.cancelled() => Err(WsError::Cancelled.into()),
            outcome = attempt => outcome,
        }
    }

    async fn close_connection(&self, connection: &C::Connection, reason: &str) -> Result<()> {
        timeout(CLOSE_TIMEOUT, connection.close(CloseCode::Normal, reason))
            .await
            .map_err(|_e| WsError::Timeout(CLOSE_TIMEOUT))?
    }
}

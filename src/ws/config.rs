#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use bon::Builder;
use secrecy::SecretString;

use super::backoff;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_HEARTBEAT_TIMEOUT_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT_DURATION: Duration = Duration::from_secs(30);
const DEFAULT_DIAL_TIMEOUT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
/// 4 MiB
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 << 20;

/// Configuration for WebSocket client behavior.
///
/// A zero `heartbeat_interval` disables heartbeats; a zero `read_timeout` lets a
/// read wait indefinitely for the next frame.
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Sent as `Authorization: Bearer <token>` on the upgrade request
    #[builder(into)]
    pub bearer_token: Option<SecretString>,
    /// Offered in `Sec-WebSocket-Protocol`
    #[builder(default)]
    pub subprotocols: Vec<String>,
    /// Interval for sending PING frames to probe liveness
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub heartbeat_interval: Duration,
    /// Maximum time to wait for a PONG before the probe counts as failed
    #[builder(default = DEFAULT_HEARTBEAT_TIMEOUT_DURATION)]
    pub heartbeat_timeout: Duration,
    /// Idle bound for a single read; expiry is not an error
    #[builder(default = DEFAULT_READ_TIMEOUT_DURATION)]
    pub read_timeout: Duration,
    /// Bound on establishing the connection, handshake included
    #[builder(default = DEFAULT_DIAL_TIMEOUT_DURATION)]
    pub dial_timeout: Duration,
    /// Frames with a larger payload terminate the connection
    #[builder(default = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// When `false`, the first dial failure or disconnection ends the manager
    pub enabled: bool,
    /// Maximum number of consecutive failed dials before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Backoff applied after the first failed dial
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
}

impl ReconnectConfig {
    #[must_use]
    pub fn new(
        enabled: bool,
        max_attempts: Option<u32>,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            enabled,
            max_attempts,
            initial_backoff,
            max_backoff,
        }
    }

    /// Reconnection disabled: the manager stops after the first failure.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Wait before the next dial after `retries` consecutive failures.
    #[must_use]
    pub fn delay(&self, retries: u32) -> Duration {
        backoff::delay(retries, self.initial_backoff, self.max_backoff)
    }

    /// Whether `retries` consecutive failures exhaust the retry budget.
    #[must_use]
    pub fn exhausted(&self, retries: u32) -> bool {
        self.max_attempts.is_some_and(|max| retries > max)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: None, // Infinite reconnection by default
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret as _;

    use super::*;

    #[test]
    fn default_heartbeat_is_five_seconds() {
        let config = Config::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(5));
        assert_eq!(config.dial_timeout, Duration::from_secs(10));
        assert_eq!(config.max_message_size, 4 * 1024 * 1024);
    }

    #[test]
    fn builder_accepts_plain_token() {
        let config = Config::builder().bearer_token("secret-token").build();
        let token = config.bearer_token.expect("token should be set");
        assert_eq!(token.expose_secret(), "secret-token");
    }

    #[test]
    fn delay_sequence_doubles_until_max() {
        let config = ReconnectConfig::new(
            true,
            None,
            Duration::from_secs(1),
            Duration::from_secs(5),
        );

        let delays: Vec<_> = (1..=5).map(|n| config.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn exhausted_only_past_max() {
        let config = ReconnectConfig {
            max_attempts: Some(2),
            ..ReconnectConfig::default()
        };
        assert!(!config.exhausted(2), "two failures are within a budget of two");
        assert!(config.exhausted(3), "third failure exceeds a budget of two");

        let unlimited = ReconnectConfig::default();
        assert!(!unlimited.exhausted(u32::MAX), "no budget means never exhausted");
    }
}

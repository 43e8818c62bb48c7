//! Application configuration loaded from YAML.
//!
//! ```yaml
//! app:
//!   log_level: info
//! ws:
//!   url: ws://127.0.0.1:8081/ws
//!   token: ""
//!   heartbeat_sec: 30
//!   read_timeout_sec: 60
//!   reconnect:
//!     enabled: true
//!     max_retries: 0      # 0 = unlimited
//!     base_seconds: 1
//!     max_seconds: 30
//! store:
//!   path: ./data/events.jsonl
//! ```
//!
//! Missing fields fall back to the values above.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::Result;
use crate::error::{Error, Kind};
use crate::ws::config::{Config, ReconnectConfig};

#[non_exhaustive]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSettings,
    pub ws: WsSettings,
    pub store: StoreSettings,
}

#[non_exhaustive]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WsSettings {
    pub url: String,
    /// Bearer token; empty means none
    pub token: String,
    pub subprotocols: Vec<String>,
    /// 0 disables heartbeats
    pub heartbeat_sec: u64,
    /// 0 waits indefinitely for the next frame
    pub read_timeout_sec: u64,
    pub reconnect: ReconnectSettings,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8081/ws".to_owned(),
            token: String::new(),
            subprotocols: Vec::new(),
            heartbeat_sec: 30,
            read_timeout_sec: 60,
            reconnect: ReconnectSettings::default(),
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub enabled: bool,
    /// 0 = unlimited
    pub max_retries: u32,
    pub base_seconds: u64,
    pub max_seconds: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 0,
            base_seconds: 1,
            max_seconds: 30,
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/events.jsonl"),
        }
    }
}

impl AppConfig {
    /// Read and validate the configuration at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| Error::with_source(Kind::Config, e))?;
        let config = Self::from_yaml(&raw)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), url = %config.ws.url, "Loaded configuration");

        Ok(config)
    }

    /// Parse and validate configuration from a YAML document.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ws.url.trim().is_empty() {
            return Err(Error::validation("ws.url must not be empty"));
        }

        let url = Url::parse(&self.ws.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::validation(format!(
                "ws.url must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }

        if self.store.path.as_os_str().is_empty() {
            return Err(Error::validation("store.path must not be empty"));
        }

        Ok(())
    }

    /// Connection policy for [`crate::ws::ConnectionManager`].
    #[must_use]
    pub fn to_ws_config(&self) -> Config {
        let ws = &self.ws;
        let reconnect = &ws.reconnect;

        let token = (!ws.token.is_empty()).then(|| SecretString::from(ws.token.clone()));

        Config::builder()
            .maybe_bearer_token(token)
            .subprotocols(ws.subprotocols.clone())
            .heartbeat_interval(Duration::from_secs(ws.heartbeat_sec))
            .read_timeout(Duration::from_secs(ws.read_timeout_sec))
            .reconnect(ReconnectConfig::new(
                reconnect.enabled,
                (reconnect.max_retries > 0).then_some(reconnect.max_retries),
                Duration::from_secs(reconnect.base_seconds),
                Duration::from_secs(reconnect.max_seconds),
            ))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret as _;

    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::from_yaml("{}").expect("defaults are valid");

        assert_eq!(config.app.log_level, "info");
        assert_eq!(config.ws.url, "ws://127.0.0.1:8081/ws");
        assert_eq!(config.ws.heartbeat_sec, 30);
        assert!(config.ws.reconnect.enabled, "reconnect defaults on");
        assert_eq!(config.store.path, PathBuf::from("./data/events.jsonl"));
    }

    #[test]
    fn full_document_maps_to_ws_config() {
        let yaml = r"
app:
  log_level: debug
ws:
  url: wss://bot.example.com/onebot
  token: s3cret
  subprotocols: [json]
  heartbeat_sec: 0
  read_timeout_sec: 15
  reconnect:
    enabled: true
    max_retries: 5
    base_seconds: 2
    max_seconds: 20
store:
  path: /var/lib/wsbot/events.jsonl
";
        let config = AppConfig::from_yaml(yaml).expect("valid config");
        let ws = config.to_ws_config();

        assert_eq!(config.app.log_level, "debug");
        assert_eq!(
            ws.bearer_token.as_ref().map(|t| t.expose_secret().to_owned()),
            Some("s3cret".to_owned())
        );
        assert_eq!(ws.subprotocols, vec!["json".to_owned()]);
        assert_eq!(ws.heartbeat_interval, Duration::ZERO);
        assert_eq!(ws.read_timeout, Duration::from_secs(15));
        assert_eq!(ws.reconnect.max_attempts, Some(5));
        assert_eq!(ws.reconnect.initial_backoff, Duration::from_secs(2));
        assert_eq!(ws.reconnect.max_backoff, Duration::from_secs(20));
    }

    #[test]
    fn zero_max_retries_is_unlimited_and_empty_token_is_none() {
        let config = AppConfig::from_yaml("ws:\n  token: ''\n  reconnect:\n    max_retries: 0\n")
            .expect("valid config");
        let ws = config.to_ws_config();

        assert!(ws.bearer_token.is_none(), "empty token is not sent");
        assert_eq!(ws.reconnect.max_attempts, None);
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let error = AppConfig::from_yaml("ws:\n  url: http://example.com\n").unwrap_err();
        assert_eq!(error.kind(), Kind::Validation);
    }

    #[test]
    fn rejects_empty_url() {
        let error = AppConfig::from_yaml("ws:\n  url: ''\n").unwrap_err();
        assert_eq!(error.kind(), Kind::Validation);
    }

    #[test]
    fn malformed_yaml_is_config_error() {
        let error = AppConfig::from_yaml("ws: [unterminated").unwrap_err();
        assert_eq!(error.kind(), Kind::Config);
    }

    #[test]
    fn missing_file_is_config_error() {
        let error = AppConfig::load("/definitely/not/here/config.yaml").unwrap_err();
        assert_eq!(error.kind(), Kind::Config);
    }
}

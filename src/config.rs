use crate::utils::add_ice_url_scheme;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_NEGOTIATION_TIMEOUT_SECS: u64 = 30;

/// Период ожидания перед принудительным отключением
pub const DEFAULT_DISCONNECT_GRACE_SECS: u64 = 10;

/// Upper bound for one outbound signaling request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid signaling url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("invalid ice server {id}: {reason}")]
    InvalidIceServer { id: String, reason: String },
}

/// ICE сервер в том виде, как его задает приложение.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(id: &str, url: &str) -> Self {
        Self {
            id: id.into(),
            r#type: "stun".into(),
            url: url.into(),
            username: None,
            credential: None,
        }
    }

    /// Url with its `stun:` / `turn:` scheme guaranteed.
    pub fn normalized_url(&self) -> String {
        add_ice_url_scheme(self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub directive: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        let directive = "debug";
        #[cfg(not(debug_assertions))]
        let directive = "info";
        Self {
            directive: directive.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Base address of the signaling server.
    pub signaling_url: Url,
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,
    /// Peers announced in the initial `NEW_CONNECTION`.
    #[serde(default)]
    pub known_peers: Vec<String>,
    /// `None` disables the negotiation timeout.
    #[serde(default = "default_negotiation_timeout")]
    pub negotiation_timeout_secs: Option<u64>,
    #[serde(default = "default_disconnect_grace")]
    pub disconnect_grace_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_ice_servers() -> Vec<IceServerConfig> {
    vec![
        IceServerConfig::stun("default-stun", "stun:stun.l.google.com:19302"),
        IceServerConfig::stun("default-stun-1", "stun:stun1.l.google.com:19302"),
    ]
}

fn default_negotiation_timeout() -> Option<u64> {
    Some(DEFAULT_NEGOTIATION_TIMEOUT_SECS)
}

fn default_disconnect_grace() -> u64 {
    DEFAULT_DISCONNECT_GRACE_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Config {
    pub fn new(signaling_url: Url) -> Self {
        Self {
            signaling_url,
            ice_servers: default_ice_servers(),
            known_peers: Vec::new(),
            negotiation_timeout_secs: default_negotiation_timeout(),
            disconnect_grace_secs: DEFAULT_DISCONNECT_GRACE_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            log: LogConfig::default(),
        }
    }

    pub fn parse(signaling_url: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(signaling_url).map_err(|source| ConfigError::InvalidUrl {
            url: signaling_url.to_string(),
            source,
        })?;
        Ok(Self::new(url))
    }

    /// Builds a configuration from `SSC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup("SSC_SIGNALING_URL").ok_or(ConfigError::Missing("SSC_SIGNALING_URL"))?;
        let mut config = Self::parse(&url)?;

        if let Some(raw) = lookup("SSC_ICE_SERVERS") {
            config.ice_servers =
                serde_json::from_str(&raw).map_err(|err| ConfigError::InvalidValue {
                    key: "SSC_ICE_SERVERS",
                    reason: err.to_string(),
                })?;
        }
        if let Some(raw) = lookup("SSC_KNOWN_PEERS") {
            config.known_peers = raw
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(raw) = lookup("SSC_NEGOTIATION_TIMEOUT_SECS") {
            let secs = parse_secs("SSC_NEGOTIATION_TIMEOUT_SECS", &raw)?;
            config.negotiation_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(raw) = lookup("SSC_DISCONNECT_GRACE_SECS") {
            config.disconnect_grace_secs = parse_secs("SSC_DISCONNECT_GRACE_SECS", &raw)?;
        }
        if let Some(raw) = lookup("SSC_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_secs("SSC_REQUEST_TIMEOUT_SECS", &raw)?;
        }
        if let Some(directive) = lookup("SSC_LOG") {
            config.log.directive = directive;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                reason: "must be at least one second".into(),
            });
        }
        for server in &self.ice_servers {
            if server.url.is_empty() {
                return Err(ConfigError::InvalidIceServer {
                    id: server.id.clone(),
                    reason: "url cannot be empty".into(),
                });
            }
            if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none())
            {
                return Err(ConfigError::InvalidIceServer {
                    id: server.id.clone(),
                    reason: "turn servers require username and credential".into(),
                });
            }
        }
        Ok(())
    }

    pub fn negotiation_timeout(&self) -> Option<Duration> {
        self.negotiation_timeout_secs.map(Duration::from_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_secs(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|err: std::num::ParseIntError| ConfigError::InvalidValue {
            key,
            reason: err.to_string(),
        })
}

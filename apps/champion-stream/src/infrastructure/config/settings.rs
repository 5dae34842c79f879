//! Stream Configuration Settings
//!
//! Configuration types for the champion event stream, loaded from
//! environment variables.

use std::time::Duration;

use reqwest::Url;

use crate::application::ports::BackendKind;
use crate::application::services::ReconnectConfig;
use crate::application::services::reconnect::DEFAULT_RECONNECT_INTERVAL;
use crate::domain::stream::Endpoint;
use crate::infrastructure::transport::DEFAULT_CONNECT_TIMEOUT;

const DEFAULT_BASE_URL: &str = "https://champion.mobile-bot.deriv.dev";
const DEFAULT_SSE_PATH: &str = "/champion/v1/sse";
const DEFAULT_API_URL: &str = "http://mobile-backend-service-mock-gray:3000/";

/// Header naming the upstream the stream gateway should route to.
pub const CHAMPION_URL_HEADER: &str = "champion-url";

/// Bearer token for the stream endpoint.
#[derive(Clone)]
pub struct Token(String);

impl Token {
    /// Wrap a token.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// Get the token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Champion API endpoints and credentials.
#[derive(Debug, Clone)]
pub struct ChampionSettings {
    /// Base URL of the stream gateway.
    pub base_url: Url,
    /// Path of the SSE endpoint.
    pub sse_path: String,
    /// Account the stream is scoped to.
    pub account_uuid: String,
    /// Upstream API URL sent in the `champion-url` header.
    pub api_url: String,
    /// Optional bearer token.
    pub token: Option<Token>,
    /// Separate balance stream, if deployed.
    pub balance_stream_url: Option<String>,
}

/// Reconnect and transport settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Backend implementation.
    pub backend: BackendKind,
    /// Delay between reconnect attempts.
    pub interval: Duration,
    /// Jitter as a fraction of the interval.
    pub jitter_factor: f64,
    /// Maximum attempts (0 = unlimited).
    pub max_attempts: u32,
    /// Reconnect after the server ends the stream; `None` keeps the
    /// backend default.
    pub reconnect_on_end: Option<bool>,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            interval: DEFAULT_RECONNECT_INTERVAL,
            jitter_factor: 0.0,
            max_attempts: 0, // Unlimited
            reconnect_on_end: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Champion API settings.
    pub champion: ChampionSettings,
    /// Reconnect and transport settings.
    pub reconnect: ReconnectSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl StreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let raw_base = var("CHAMPION_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&raw_base).map_err(|e| ConfigError::InvalidValue {
            key: "CHAMPION_BASE_URL".to_string(),
            reason: e.to_string(),
        })?;

        let champion = ChampionSettings {
            base_url,
            sse_path: var("CHAMPION_SSE_PATH").unwrap_or_else(|| DEFAULT_SSE_PATH.to_string()),
            account_uuid: var("CHAMPION_ACCOUNT_UUID").unwrap_or_default(),
            api_url: var("CHAMPION_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            token: var("CHAMPION_TOKEN").map(Token::new),
            balance_stream_url: var("CHAMPION_BALANCE_STREAM_URL"),
        };

        let defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            backend: match var("STREAM_BACKEND") {
                Some(raw) => raw
                    .parse::<BackendKind>()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: "STREAM_BACKEND".to_string(),
                        reason: e.to_string(),
                    })?,
                None => defaults.backend,
            },
            interval: parse_duration_millis(&var, "STREAM_RECONNECT_INTERVAL_MS", defaults.interval)?,
            jitter_factor: parse(&var, "STREAM_RECONNECT_JITTER", defaults.jitter_factor)?,
            max_attempts: parse(&var, "STREAM_RECONNECT_MAX_ATTEMPTS", defaults.max_attempts)?,
            reconnect_on_end: var("STREAM_RECONNECT_ON_END")
                .map(|raw| parse_bool("STREAM_RECONNECT_ON_END", &raw))
                .transpose()?,
            connect_timeout: parse_duration_millis(
                &var,
                "STREAM_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout,
            )?,
        };

        let server = ServerSettings {
            health_port: parse(&var, "STREAM_HEALTH_PORT", ServerSettings::default().health_port)?,
        };

        Ok(Self {
            champion,
            reconnect,
            server,
        })
    }

    /// URL of the account-scoped SSE endpoint.
    #[must_use]
    pub fn sse_url(&self) -> Url {
        let mut url = self.champion.base_url.clone();
        url.set_path(&self.champion.sse_path);
        url.query_pairs_mut()
            .clear()
            .append_pair("account_uuid", &self.champion.account_uuid);
        url
    }

    /// Endpoint for the SSE stream, with routing and auth headers.
    #[must_use]
    pub fn sse_endpoint(&self) -> Endpoint {
        let mut endpoint = Endpoint::new(self.sse_url().to_string())
            .with_header(CHAMPION_URL_HEADER, self.champion.api_url.clone())
            .with_header("Accept", "text/event-stream")
            .with_header("Cache-Control", "no-cache")
            .with_header("Connection", "keep-alive");

        if let Some(token) = &self.champion.token {
            endpoint = endpoint.with_header("Authorization", format!("Bearer {}", token.expose()));
        }

        endpoint
    }

    /// Endpoint for the balance stream, if configured.
    #[must_use]
    pub fn balance_endpoint(&self) -> Option<Endpoint> {
        self.champion.balance_stream_url.as_deref().map(Endpoint::new)
    }

    /// Reconnect schedule for stream services.
    #[must_use]
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            jitter_factor: self.reconnect.jitter_factor,
            max_attempts: self.reconnect.max_attempts,
            ..ReconnectConfig::fixed(self.reconnect.interval)
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has a value that cannot be used.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong.
        reason: String,
    },
}

fn parse<T, F>(var: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key).map_or(Ok(default), |raw| {
        raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
    })
}

fn parse_duration_millis<F>(var: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    var(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: e.to_string(),
            })
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

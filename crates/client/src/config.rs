//! Client configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use labpresence_shared::STREAM_PATH;
use url::Url;

use crate::ws::{ReconnectConfig, MIN_RECONNECT_DELAY};

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid API base URL '{url}': {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported URL scheme '{0}' (expected http or https)")]
    Scheme(String),
    #[error("invalid reconnect backoff: {0}")]
    Reconnect(String),
}

/// Everything the client needs to reach one attendance server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API, e.g. `http://lab.example:8080`.
    pub api_base_url: Url,
    /// Timeout applied to each REST request.
    pub request_timeout: Duration,
    /// Backoff applied to presence stream reconnects.
    pub reconnect: ReconnectConfig,
    /// Directory holding the persisted session. `None` = platform config dir.
    pub config_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(api_base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: parse_base_url(api_base_url)?,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            reconnect: ReconnectConfig::default(),
            config_dir: None,
        })
    }

    /// Build configuration from environment variables.
    ///
    /// Environment variables:
    /// - `LABPRESENCE_API_BASE_URL`: REST base URL (default: "http://localhost:8080")
    /// - `LABPRESENCE_REQUEST_TIMEOUT_MS`: per-request timeout (default: 10000)
    /// - `LABPRESENCE_RECONNECT_INITIAL_MS`: first reconnect delay (default: 5000)
    /// - `LABPRESENCE_RECONNECT_MAX_MS`: reconnect delay cap (default: 60000)
    /// - `LABPRESENCE_RECONNECT_MULTIPLIER`: backoff multiplier (default: 2.0)
    /// - `LABPRESENCE_CONFIG_DIR`: where the login session is stored
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = std::env::var("LABPRESENCE_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(&base)?;

        if let Some(ms) = env_parse::<u64>("LABPRESENCE_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("LABPRESENCE_RECONNECT_INITIAL_MS") {
            config.reconnect.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("LABPRESENCE_RECONNECT_MAX_MS") {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = env_parse::<f64>("LABPRESENCE_RECONNECT_MULTIPLIER") {
            config.reconnect.multiplier = multiplier;
        }
        config.config_dir = std::env::var_os("LABPRESENCE_CONFIG_DIR").map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    /// Reject reconnect settings that would retry without backing off.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reconnect = &self.reconnect;
        if reconnect.initial_delay < MIN_RECONNECT_DELAY {
            return Err(ConfigError::Reconnect(format!(
                "initial delay {:?} is below the {:?} minimum",
                reconnect.initial_delay, MIN_RECONNECT_DELAY
            )));
        }
        if reconnect.max_delay < reconnect.initial_delay {
            return Err(ConfigError::Reconnect(format!(
                "max delay {:?} is shorter than the initial delay {:?}",
                reconnect.max_delay, reconnect.initial_delay
            )));
        }
        if !reconnect.multiplier.is_finite() || reconnect.multiplier < 1.0 {
            return Err(ConfigError::Reconnect(format!(
                "multiplier {} must be a finite number >= 1",
                reconnect.multiplier
            )));
        }
        Ok(())
    }

    pub fn with_base_url(mut self, api_base_url: &str) -> Result<Self, ConfigError> {
        self.api_base_url = parse_base_url(api_base_url)?;
        Ok(self)
    }

    /// The presence stream endpoint: the base URL with `ws`/`wss` and the stream path.
    pub fn stream_url(&self) -> String {
        let mut url = self.api_base_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // http -> ws and https -> wss are always permitted scheme changes.
        let _ = url.set_scheme(scheme);
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}{STREAM_PATH}"));
        url.to_string()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::BaseUrl {
        url: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Scheme(other.to_string())),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            crate::log_warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}

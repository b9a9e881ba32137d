use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:1234";
pub const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 10;
pub const USER_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Delay between reconnection attempts. Grows exponentially from `min` up to `max`, with
/// `randomization` (0..=1) worth of jitter applied to each delay.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffConfig {
    pub min: Duration,
    pub max: Duration,
    pub factor: u32,
    pub randomization: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(1000),
            max: Duration::from_millis(5000),
            factor: 2,
            randomization: 0.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base url for both the REST api and the realtime connection.
    pub endpoint: Url,
    pub reconnection_attempts: u32,
    /// `None` disables the periodic user list refresh.
    pub user_poll_interval: Option<Duration>,
    pub backoff: BackoffConfig,
}

impl ClientConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            user_poll_interval: None,
            backoff: BackoffConfig::default(),
        }
    }

    /// Reads `PARLEY_API_URL` and `PARLEY_ENV`, after loading a `.env` file if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        // a missing .env file is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let endpoint = lookup("PARLEY_API_URL")
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = Url::parse(&endpoint).map_err(|source| ConfigError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            source,
        })?;

        let production = lookup("PARLEY_ENV").as_deref() == Some("production");

        Ok(Self {
            user_poll_interval: production.then_some(USER_POLL_INTERVAL),
            ..Self::new(endpoint)
        })
    }
}

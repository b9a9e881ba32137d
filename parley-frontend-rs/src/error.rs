use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid server endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never got a response (server down, offline, DNS, ...).
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("server responded with {0}")]
    Status(reqwest::StatusCode),
    #[error("could not decode response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl FetchError {
    pub fn is_network(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            FetchError::Status(status)
        } else if error.is_decode() {
            FetchError::Decode(error)
        } else {
            FetchError::Network(error)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("transport closed")]
    TransportClosed,
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The server refused the socket connection, typically because of the token.
    #[error("connection refused by server: {0}")]
    Refused(String),
    #[error("gave up after {attempts} reconnection attempts")]
    ReconnectExhausted { attempts: u32 },
}

impl ConnectionError {
    /// Whether automatic reconnection has stopped for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionError::ReconnectExhausted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet type {0:?}")]
    UnknownPacket(char),
    #[error("binary packets are not supported")]
    Binary,
    #[error("malformed packet payload: {0}")]
    Payload(String),
    #[error("event {name:?} has unexpected arguments: {reason}")]
    Arguments { name: String, reason: String },
}

impl From<serde_json::Error> for WireError {
    fn from(error: serde_json::Error) -> Self {
        WireError::Payload(error.to_string())
    }
}

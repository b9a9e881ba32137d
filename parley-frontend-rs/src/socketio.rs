//! Text packets of the realtime protocol: Engine.IO v4 framing with Socket.IO v5 packets inside
//! Engine.IO `message`s. Only the default namespace and text packets are supported.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   engine open
//! 2 / 3                                                   engine ping / pong
//! 40{"sid":".."}                                          socket connect
//! 41                                                      socket disconnect
//! 42["chat message","c1",{"text":"hi"}]                   socket event
//! 44{"message":"not authorized"}                          socket connect error
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::WireError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}

impl OpenHandshake {
    /// How long we wait for the server's next ping before giving up on the connection.
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Open(OpenHandshake),
    Close,
    Ping,
    Pong,
    Noop,
    Connect { sid: Option<String> },
    Disconnect,
    Event { name: String, args: Vec<Value> },
    Ack,
    ConnectError { message: String },
}

impl Packet {
    pub fn event(name: &str, args: Vec<Value>) -> Self {
        Packet::Event {
            name: name.to_string(),
            args,
        }
    }

    pub fn decode(text: &str) -> Result<Self, WireError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(WireError::Empty)?;
        let rest = chars.as_str();
        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '4' => decode_socket_packet(rest),
            '6' => Ok(Packet::Noop),
            other => Err(WireError::UnknownPacket(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!("0{}", json_or_empty(handshake)),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect { sid: None } => "40".to_string(),
            Packet::Connect { sid: Some(sid) } => {
                format!("40{}", serde_json::json!({ "sid": sid }))
            }
            Packet::Disconnect => "41".to_string(),
            Packet::Event { name, args } => {
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                format!("42{}", Value::Array(array))
            }
            Packet::Ack => "43[]".to_string(),
            Packet::ConnectError { message } => {
                format!("44{}", serde_json::json!({ "message": message }))
            }
        }
    }
}

fn json_or_empty(value: &impl Serialize) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn decode_socket_packet(text: &str) -> Result<Packet, WireError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(WireError::Empty)?;
    let body = strip_ack_id(strip_namespace(chars.as_str()));

    match kind {
        '0' => {
            // the sid is optional (older servers don't send a payload at all)
            let sid = if body.is_empty() {
                None
            } else {
                let payload: Value = serde_json::from_str(body)?;
                payload.get("sid").and_then(Value::as_str).map(str::to_string)
            };
            Ok(Packet::Connect { sid })
        }
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let array: Vec<Value> = serde_json::from_str(body)?;
            let mut array = array.into_iter();
            let Some(Value::String(name)) = array.next() else {
                return Err(WireError::Payload("event without a name".to_string()));
            };
            Ok(Packet::Event {
                name,
                args: array.collect(),
            })
        }
        '3' => Ok(Packet::Ack),
        '4' => {
            let payload: Value = serde_json::from_str(body)?;
            let message = match payload {
                Value::String(message) => message,
                Value::Object(ref object) => object
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                other => other.to_string(),
            };
            Ok(Packet::ConnectError { message })
        }
        '5' | '6' => Err(WireError::Binary),
        other => Err(WireError::UnknownPacket(other)),
    }
}

/// `/admin,["x"]` -> `["x"]`
fn strip_namespace(text: &str) -> &str {
    if text.starts_with('/') {
        text.split_once(',').map(|(_, rest)| rest).unwrap_or("")
    } else {
        text
    }
}

/// `12["x"]` -> `["x"]`
fn strip_ack_id(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_ascii_digit())
}

/// The url the websocket connects to. The token travels in the query string.
pub fn handshake_url(endpoint: &Url, token: &str) -> Url {
    let mut url = endpoint.clone();
    let scheme = match endpoint.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    // only fails for non-special schemes, which we leave alone
    let _ = url.set_scheme(scheme);

    let path = format!("{}/socket.io/", endpoint.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket")
        .append_pair("token", token);
    url
}

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::channel::mpsc as chan;
use futures::{SinkExt, StreamExt};
use parley::data_model::{Chat, User};
use parley_frontend_rs::api::ChatApi;
use parley_frontend_rs::config::{BackoffConfig, ClientConfig};
use parley_frontend_rs::connection::{Channel, Transport};
use parley_frontend_rs::error::{ConnectionError, FetchError};
use parley_frontend_rs::notifications::{ErrorSurface, Notice};
use parley_frontend_rs::socketio::{OpenHandshake, Packet};
use tokio::sync::mpsc;
use url::Url;

pub fn config() -> ClientConfig {
    ClientConfig {
        backoff: BackoffConfig {
            randomization: 0.0,
            ..BackoffConfig::default()
        },
        ..ClientConfig::new(Url::parse("http://localhost:1234").unwrap())
    }
}

/// The server end of one accepted connection.
pub struct MockServer {
    pub url: Url,
    to_client: chan::UnboundedSender<String>,
    from_client: chan::UnboundedReceiver<String>,
}

impl MockServer {
    pub fn send(&self, packet: Packet) {
        self.send_raw(&packet.encode());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.to_client.unbounded_send(text.to_string());
    }

    /// Next packet sent by the client, or `None` once it hung up.
    pub async fn recv(&mut self) -> Option<Packet> {
        let text = self.from_client.next().await?;
        Some(Packet::decode(&text).expect("client sent a malformed packet"))
    }

    /// Plays the server half of the handshake.
    pub async fn accept(&mut self) {
        self.send(Packet::Open(OpenHandshake {
            sid: "engine-sid".to_string(),
            upgrades: vec![],
            // long enough that no test trips over the heartbeat by accident
            ping_interval: 3_600_000,
            ping_timeout: 20_000,
        }));
        assert_eq!(self.recv().await, Some(Packet::Connect { sid: None }));
        self.send(Packet::Connect {
            sid: Some("socket-sid".to_string()),
        });
    }

    /// Drops the server's side of the socket, like a network failure would.
    pub fn hang_up(self) {}
}

pub struct MockTransport {
    refuse: bool,
    opened: AtomicUsize,
    servers: mpsc::UnboundedSender<MockServer>,
}

impl MockTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        Self::build(false)
    }

    /// A transport that can never reach the server.
    pub fn refusing() -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        Self::build(true)
    }

    fn build(refuse: bool) -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let transport = Self {
            refuse,
            opened: AtomicUsize::new(0),
            servers,
        };
        (transport, accepted)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &Url) -> Result<Channel, ConnectionError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(ConnectionError::Transport("connection refused".to_string()));
        }

        let (to_client, client_stream) = chan::unbounded::<String>();
        let (client_sink, from_client) = chan::unbounded::<String>();
        let server = MockServer {
            url: url.clone(),
            to_client,
            from_client,
        };
        self.servers
            .send(server)
            .map_err(|_| ConnectionError::Transport("test is over".to_string()))?;

        Ok(Channel {
            sink: Box::pin(
                client_sink.sink_map_err(|e| ConnectionError::Transport(e.to_string())),
            ),
            stream: Box::pin(client_stream.map(Ok)),
        })
    }
}

pub enum Reply<T> {
    Ok(T),
    Status(u16),
    Network,
}

impl<T> Reply<T> {
    async fn into_result(self) -> Result<T, FetchError> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Status(code) => Err(FetchError::Status(
                reqwest::StatusCode::from_u16(code).expect("valid status code"),
            )),
            // nothing listens on port 1, so this is a genuine connection error
            Reply::Network => {
                let client = reqwest::Client::builder()
                    .no_proxy()
                    .build()
                    .expect("client builds");
                Err(client
                    .get("http://127.0.0.1:1/")
                    .send()
                    .await
                    .map(|_| ())
                    .expect_err("nothing should be listening on port 1")
                    .into())
            }
        }
    }
}

/// Replies are handed out in order; once they run out, fetches succeed with empty lists.
#[derive(Default)]
pub struct MockApi {
    pub chats: Mutex<VecDeque<Reply<Vec<Chat>>>>,
    pub users: Mutex<VecDeque<Reply<Vec<User>>>>,
    pub chat_delay: Option<Duration>,
    pub chat_tokens: Mutex<Vec<String>>,
    pub user_fetches: AtomicUsize,
}

impl MockApi {
    pub fn with_chats(chats: Vec<Chat>) -> Self {
        let api = Self::default();
        api.chats.lock().unwrap().push_back(Reply::Ok(chats));
        api
    }

    pub fn user_fetches(&self) -> usize {
        self.user_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChatApi for MockApi {
    async fn fetch_chats(&self, token: &str) -> Result<Vec<Chat>, FetchError> {
        self.chat_tokens.lock().unwrap().push(token.to_string());
        let reply = self.chats.lock().unwrap().pop_front();
        if let Some(delay) = self.chat_delay {
            tokio::time::sleep(delay).await;
        }
        reply.unwrap_or(Reply::Ok(vec![])).into_result().await
    }

    async fn fetch_users(&self) -> Result<Vec<User>, FetchError> {
        self.user_fetches.fetch_add(1, Ordering::SeqCst);
        let reply = self.users.lock().unwrap().pop_front();
        reply.unwrap_or(Reply::Ok(vec![])).into_result().await
    }
}

pub struct RecordingSurface {
    notices: mpsc::UnboundedSender<Notice>,
}

impl RecordingSurface {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, received) = mpsc::unbounded_channel();
        (Self { notices }, received)
    }
}

impl ErrorSurface for RecordingSurface {
    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }
}

//! The realtime connection: one websocket per session, with automatic reconnection.
//!
//! A [`ConnectionManager`] spawns a driver task per `connect`. The driver owns the socket, answers
//! heartbeats, reconnects with backoff when the network drops, and reports everything that happens
//! to a single listener as [`ConnectionEvent`]s. Callers talk to it through a cloneable
//! [`ConnectionHandle`].

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{BackoffConfig, ClientConfig};
use crate::error::ConnectionError;
use crate::socketio::{self, Packet};

/// Same as the Socket.IO client's default connect timeout.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

pub type FrameSink = Pin<Box<dyn Sink<String, Error = ConnectionError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ConnectionError>> + Send>>;

/// A freshly opened text channel to the server.
pub struct Channel {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Channel, ConnectionError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketTransport;

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<Channel, ConnectionError> {
        use tokio_tungstenite::tungstenite::{Error as WsError, Message};

        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        let (write, read) = socket.split();

        let sink = write
            .with(|text: String| futures::future::ready(Ok::<_, WsError>(Message::text(text))))
            .sink_map_err(|e| ConnectionError::Transport(e.to_string()));
        let stream = read.filter_map(|message| {
            futures::future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Close(_)) => Some(Err(ConnectionError::TransportClosed)),
                Ok(_) => None,
                Err(e) => Some(Err(ConnectionError::Transport(e.to_string()))),
            })
        });

        Ok(Channel {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the session on purpose, e.g. because the token was revoked.
    ServerInitiated,
    /// We called `disconnect`.
    ClientInitiated,
    TransportClose,
    TransportError,
    PingTimeout,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::ServerInitiated => "io server disconnect",
            DisconnectReason::ClientInitiated => "io client disconnect",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError => "transport error",
            DisconnectReason::PingTimeout => "ping timeout",
        }
    }

    /// Whether the connection will try to come back on its own.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            DisconnectReason::ServerInitiated | DisconnectReason::ClientInitiated
        )
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    ConnectError(ConnectionError),
    Disconnected(DisconnectReason),
    Event { name: String, args: Vec<Value> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    /// Lost the connection, waiting to retry.
    Disconnected,
    /// The driver has stopped and won't reconnect.
    Closed,
}

#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    outbound: mpsc::UnboundedSender<Packet>,
    status: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Sends an event if we're connected. Returns false (and sends nothing) otherwise.
    pub fn emit(&self, name: &str, payload: Value) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.outbound.send(Packet::event(name, vec![payload])).is_ok()
    }

    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the connection has stopped for good.
    pub async fn closed(&self) {
        let mut status = self.status.clone();
        let _ = status
            .wait_for(|status| *status == ConnectionStatus::Closed)
            .await;
    }
}

#[cfg(test)]
impl ConnectionHandle {
    /// A handle with no driver behind it, stuck in `status`.
    pub(crate) fn detached(status: ConnectionStatus) -> (Self, mpsc::UnboundedReceiver<Packet>) {
        let (outbound, packets) = mpsc::unbounded_channel();
        let (_status_tx, status) = watch::channel(status);
        let handle = Self {
            outbound,
            status,
            cancel: CancellationToken::new(),
        };
        (handle, packets)
    }
}

/// Exponential backoff with jitter, the way the Socket.IO client does it.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: BackoffConfig,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Delay before reconnection attempt number `attempt` (starting at 1).
    pub fn delay(&self, attempt: u32) -> Duration {
        let BackoffConfig {
            min,
            max,
            factor,
            randomization,
        } = self.config;
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let base = min.as_secs_f64() * f64::from(factor).powi(exponent);

        let jittered = if randomization > 0.0 {
            let roll = rand::random::<f64>();
            let deviation = roll * randomization * base;
            if (roll * 10.0) as u32 % 2 == 0 {
                base - deviation
            } else {
                base + deviation
            }
        } else {
            base
        };

        Duration::from_secs_f64(jittered.clamp(0.0, max.as_secs_f64()))
    }
}

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    reconnection_attempts: u32,
    backoff: Backoff,
    listener: mpsc::UnboundedSender<ConnectionEvent>,
    current: Option<(ConnectionHandle, JoinHandle<()>)>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
        listener: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            transport,
            endpoint: config.endpoint.clone(),
            reconnection_attempts: config.reconnection_attempts,
            backoff: Backoff::new(config.backoff.clone()),
            listener,
            current: None,
        }
    }

    /// Opens a connection authenticated with `token`, tearing down the previous one first.
    pub async fn connect(&mut self, token: &str) -> ConnectionHandle {
        self.disconnect().await;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let cancel = CancellationToken::new();

        let driver = Driver {
            transport: self.transport.clone(),
            url: socketio::handshake_url(&self.endpoint, token),
            reconnection_attempts: self.reconnection_attempts,
            backoff: self.backoff.clone(),
            listener: self.listener.clone(),
            outbound: outbound_rx,
            status: status_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(driver.run());

        let handle = ConnectionHandle {
            outbound: outbound_tx,
            status: status_rx,
            cancel,
        };
        self.current = Some((handle.clone(), task));
        handle
    }

    /// Closes the current connection (if any) and waits for its driver to finish.
    pub async fn disconnect(&mut self) {
        if let Some((handle, task)) = self.current.take() {
            handle.disconnect();
            if let Err(e) = task.await {
                log::error!("Connection driver panicked: {e:?}");
            }
        }
    }

    pub fn handle(&self) -> Option<&ConnectionHandle> {
        self.current.as_ref().map(|(handle, _)| handle)
    }
}

/// How a single connection attempt ended.
enum SessionEnd {
    Cancelled { was_connected: bool },
    Failed(ConnectionError),
    Lost(DisconnectReason),
    ServerClosed,
}

enum Step {
    Cancel,
    Outbound(Option<Packet>),
    Inbound(Option<Result<String, ConnectionError>>),
    HeartbeatMissed,
}

struct Driver {
    transport: Arc<dyn Transport>,
    url: Url,
    reconnection_attempts: u32,
    backoff: Backoff,
    listener: mpsc::UnboundedSender<ConnectionEvent>,
    outbound: mpsc::UnboundedReceiver<Packet>,
    status: watch::Sender<ConnectionStatus>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let mut attempt = 0;
        loop {
            self.status.send_replace(ConnectionStatus::Connecting);
            match self.session().await {
                SessionEnd::Cancelled { was_connected } => {
                    if was_connected {
                        self.disconnected(DisconnectReason::ClientInitiated);
                    }
                    break;
                }
                SessionEnd::ServerClosed => {
                    self.status.send_replace(ConnectionStatus::Closed);
                    self.disconnected(DisconnectReason::ServerInitiated);
                    break;
                }
                SessionEnd::Lost(reason) => {
                    // stop accepting actions before anyone hears about the disconnect
                    self.status.send_replace(ConnectionStatus::Disconnected);
                    self.disconnected(reason);
                    attempt = 0;
                }
                SessionEnd::Failed(error) => {
                    log::warn!("Could not connect to server: {error}");
                    self.emit(ConnectionEvent::ConnectError(error));
                }
            }

            if attempt >= self.reconnection_attempts {
                self.emit(ConnectionEvent::ConnectError(
                    ConnectionError::ReconnectExhausted { attempts: attempt },
                ));
                break;
            }
            attempt += 1;
            self.status.send_replace(ConnectionStatus::Disconnected);

            let delay = self.backoff.delay(attempt);
            log::debug!("Reconnecting in {delay:?} (attempt {attempt})");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.status.send_replace(ConnectionStatus::Closed);
    }

    fn emit(&self, event: ConnectionEvent) {
        // the listener going away just means nobody cares anymore
        let _ = self.listener.send(event);
    }

    fn disconnected(&self, reason: DisconnectReason) {
        log::info!("Disconnected from server ({reason})");
        self.emit(ConnectionEvent::Disconnected(reason));
    }

    async fn session(&mut self) -> SessionEnd {
        let transport = &self.transport;
        let url = &self.url;
        // the timeout covers opening the socket too, not just the protocol handshake
        let connecting = async {
            let Channel {
                mut sink,
                mut stream,
            } = transport.open(url).await?;
            let heartbeat_deadline = handshake(&mut sink, &mut stream).await?;
            Ok::<_, ConnectionError>((sink, stream, heartbeat_deadline))
        };

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return SessionEnd::Cancelled { was_connected: false },
            connected = tokio::time::timeout(HANDSHAKE_TIMEOUT, connecting) => connected,
        };
        let (mut sink, mut stream, heartbeat_deadline) = match connected {
            Ok(Ok(connected)) => connected,
            Ok(Err(error)) => return SessionEnd::Failed(error),
            Err(_) => {
                return SessionEnd::Failed(ConnectionError::Handshake("timed out".to_string()));
            }
        };

        // actions queued while we weren't connected are dropped, not replayed
        while self.outbound.try_recv().is_ok() {}

        log::info!("Connected to server");
        self.status.send_replace(ConnectionStatus::Connected);
        self.emit(ConnectionEvent::Connected);

        let mut heartbeat = Instant::now() + heartbeat_deadline;
        loop {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancel,
                packet = self.outbound.recv() => Step::Outbound(packet),
                frame = stream.next() => Step::Inbound(frame),
                _ = tokio::time::sleep_until(heartbeat) => Step::HeartbeatMissed,
            };

            match step {
                Step::Cancel | Step::Outbound(None) => {
                    self.status.send_replace(ConnectionStatus::Closed);
                    let _ = sink.send(Packet::Disconnect.encode()).await;
                    let _ = sink.close().await;
                    return SessionEnd::Cancelled {
                        was_connected: true,
                    };
                }
                Step::Outbound(Some(packet)) => {
                    if let Err(error) = sink.send(packet.encode()).await {
                        log::warn!("Failed to send packet: {error}");
                        return SessionEnd::Lost(DisconnectReason::TransportError);
                    }
                }
                Step::HeartbeatMissed => return SessionEnd::Lost(DisconnectReason::PingTimeout),
                Step::Inbound(None) | Step::Inbound(Some(Err(ConnectionError::TransportClosed))) => {
                    return SessionEnd::Lost(DisconnectReason::TransportClose);
                }
                Step::Inbound(Some(Err(error))) => {
                    log::warn!("Connection error: {error}");
                    return SessionEnd::Lost(DisconnectReason::TransportError);
                }
                Step::Inbound(Some(Ok(text))) => {
                    heartbeat = Instant::now() + heartbeat_deadline;
                    match Packet::decode(&text) {
                        Ok(Packet::Ping) => {
                            if sink.send(Packet::Pong.encode()).await.is_err() {
                                return SessionEnd::Lost(DisconnectReason::TransportError);
                            }
                        }
                        Ok(Packet::Close) => return SessionEnd::Lost(DisconnectReason::TransportClose),
                        Ok(Packet::Disconnect) => return SessionEnd::ServerClosed,
                        Ok(Packet::Event { name, args }) => {
                            self.emit(ConnectionEvent::Event { name, args });
                        }
                        Ok(other) => log::debug!("Ignoring packet {other:?}"),
                        Err(error) => log::warn!("Dropping malformed packet {text:?}: {error}"),
                    }
                }
            }
        }
    }
}

/// Waits for the engine's open packet, asks to join the default namespace and waits for the
/// server to accept. Returns how long to wait for heartbeats afterwards.
async fn handshake(
    sink: &mut FrameSink,
    stream: &mut FrameStream,
) -> Result<Duration, ConnectionError> {
    let mut heartbeat_deadline = None;

    while let Some(frame) = stream.next().await {
        let text = frame?;
        let packet = match Packet::decode(&text) {
            Ok(packet) => packet,
            Err(error) => {
                log::warn!("Dropping malformed packet during handshake {text:?}: {error}");
                continue;
            }
        };

        match packet {
            Packet::Open(open) => {
                heartbeat_deadline = Some(open.heartbeat_deadline());
                sink.send(Packet::Connect { sid: None }.encode()).await?;
            }
            Packet::Ping => sink.send(Packet::Pong.encode()).await?,
            Packet::Connect { .. } => {
                return heartbeat_deadline.ok_or_else(|| {
                    ConnectionError::Handshake("namespace connected before engine open".to_string())
                });
            }
            Packet::ConnectError { message } => return Err(ConnectionError::Refused(message)),
            Packet::Disconnect => {
                return Err(ConnectionError::Refused("disconnected during handshake".to_string()));
            }
            Packet::Close => return Err(ConnectionError::TransportClosed),
            other => log::debug!("Ignoring packet during handshake: {other:?}"),
        }
    }

    Err(ConnectionError::TransportClosed)
}

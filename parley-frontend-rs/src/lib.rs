pub mod api;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod notifications;
mod reconciler;
pub mod socketio;
pub mod wire;

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use parley::data_model::{Chat, ChatId, StateStore, StoreView, User, UserId};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::{ChatApi, HttpChatApi};
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionStatus, Transport, WebSocketTransport};
use crate::dispatcher::{Dispatch, OutboundDispatcher};
use crate::notifications::ErrorSurface;
use crate::reconciler::{EventReconciler, Fetched};

pub use parley::data_model::Snapshot;

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    // the embedding application may already have installed a logger, which is fine
    if env_logger::try_init().is_ok() {
        log::info!("Logging initialized");
    }
});

/// Everything a UI needs from the chat backend: the current chats and users, whether the chat
/// list is still loading, and the two actions a user can take.
///
/// Dropping the session (or calling [`ChatSession::teardown`]) stops polling and closes the
/// connection. Results of fetches still in flight at that point are thrown away.
pub struct ChatSession {
    api: Arc<dyn ChatApi>,
    connection: ConnectionManager,
    dispatcher: OutboundDispatcher,
    fetched: mpsc::UnboundedSender<Fetched>,
    view: watch::Receiver<StoreView>,
    generation: u64,
    poll: CancellationToken,
    shutdown: CancellationToken,
    reconciler: Option<JoinHandle<()>>,
}

impl ChatSession {
    /// Starts a session against a real server, over HTTP and websockets.
    pub async fn connect(
        config: &ClientConfig,
        token: &str,
        surface: Arc<dyn ErrorSurface>,
    ) -> Self {
        let api = Arc::new(HttpChatApi::new(config.endpoint.clone()));
        Self::start(config, token, api, Arc::new(WebSocketTransport), surface).await
    }

    pub async fn start(
        config: &ClientConfig,
        token: &str,
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn Transport>,
        surface: Arc<dyn ErrorSurface>,
    ) -> Self {
        LazyLock::force(&LOGGER);

        let mut store = StateStore::default();
        let (view_tx, view_rx) = watch::channel(store.view());
        store.register_listener(move |_, view| {
            view_tx.send_replace(view.clone());
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (fetched_tx, fetched_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let mut reconciler = EventReconciler::new(store, surface);
        reconciler.flush_notifications();
        let reconciler = tokio::spawn(reconciler.run(events_rx, fetched_rx, shutdown.clone()));

        let mut connection = ConnectionManager::new(transport, config, events_tx);
        let handle = connection.connect(token).await;

        let poll = shutdown.child_token();
        tokio::spawn(poll_users(
            api.clone(),
            config.user_poll_interval,
            fetched_tx.clone(),
            poll.clone(),
        ));

        let session = Self {
            api,
            connection,
            dispatcher: OutboundDispatcher::new(handle),
            fetched: fetched_tx,
            view: view_rx,
            generation: 0,
            poll,
            shutdown,
            reconciler: Some(reconciler),
        };
        session.fetch_chats(token);
        session
    }

    fn fetch_chats(&self, token: &str) {
        let api = self.api.clone();
        let fetched = self.fetched.clone();
        let generation = self.generation;
        let token = token.to_string();
        tokio::spawn(async move {
            let result = api.fetch_chats(&token).await;
            // fails if the session was torn down in the meantime, in which case nobody wants it
            let _ = fetched.send(Fetched::Chats { generation, result });
        });
    }

    /// Reconnects with a new token and refetches the chat list with it.
    pub async fn rotate_token(&mut self, token: &str) {
        let handle = self.connection.connect(token).await;
        self.dispatcher = OutboundDispatcher::new(handle);

        self.generation += 1;
        let _ = self.fetched.send(Fetched::TokenRotated {
            generation: self.generation,
        });
        self.fetch_chats(token);
    }

    pub fn view(&self) -> StoreView {
        self.view.borrow().clone()
    }

    /// A receiver that's updated with every new view.
    pub fn subscribe(&self) -> watch::Receiver<StoreView> {
        self.view.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.view.borrow().snapshot.clone()
    }

    pub fn chats(&self) -> im::HashMap<ChatId, Chat> {
        self.view.borrow().snapshot.chats().clone()
    }

    pub fn users(&self) -> im::HashMap<UserId, User> {
        self.view.borrow().snapshot.users().clone()
    }

    pub fn loading(&self) -> bool {
        self.view.borrow().loading
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection
            .handle()
            .map(|handle| handle.status())
            .unwrap_or(ConnectionStatus::Closed)
    }

    pub fn send_message(&self, chat_id: &ChatId, message: Option<&str>) -> Dispatch {
        self.dispatcher.send_message(chat_id, message)
    }

    pub fn create_chat(&self, name: &str, members: &[UserId]) -> Dispatch {
        self.dispatcher.create_chat(name, members)
    }

    /// Stops polling, closes the connection and discards the session state.
    pub async fn teardown(mut self) {
        self.poll.cancel();
        self.connection.disconnect().await;
        self.shutdown.cancel();
        if let Some(reconciler) = self.reconciler.take() {
            if let Err(e) = reconciler.await {
                log::error!("Reconciler task panicked: {e:?}");
            }
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.poll.cancel();
        self.shutdown.cancel();
        if let Some(handle) = self.connection.handle() {
            handle.disconnect();
        }
    }
}

/// Fetches the user list right away, then every `interval` (if there is one) until cancelled.
/// A fetch that has already started is allowed to finish.
async fn poll_users(
    api: Arc<dyn ChatApi>,
    interval: Option<Duration>,
    fetched: mpsc::UnboundedSender<Fetched>,
    cancel: CancellationToken,
) {
    if fetched.send(Fetched::Users(api.fetch_users().await)).is_err() {
        return;
    }

    let Some(period) = interval else {
        return;
    };

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if fetched.send(Fetched::Users(api.fetch_users().await)).is_err() {
            return;
        }
    }
}

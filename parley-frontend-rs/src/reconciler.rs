//! The single task that owns the [`StateStore`]. Connection events and fetch results are both
//! funnelled into it, and it handles them one at a time, so a transition is never observed half
//! applied.

use std::sync::Arc;

use parley::data_model::{Chat, ServerEvent, StateStore, User};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::connection::{ConnectionEvent, DisconnectReason};
use crate::error::FetchError;
use crate::notifications::{ErrorSurface, Notice};
use crate::wire;

pub(crate) enum Fetched {
    /// Chat fetches are tagged with the token generation they were made with.
    Chats {
        generation: u64,
        result: Result<Vec<Chat>, FetchError>,
    },
    Users(Result<Vec<User>, FetchError>),
    /// Chat lists fetched with an older token are stale from here on.
    TokenRotated { generation: u64 },
}

pub(crate) struct EventReconciler {
    store: StateStore,
    surface: Arc<dyn ErrorSurface>,
    generation: u64,
}

impl EventReconciler {
    pub(crate) fn new(store: StateStore, surface: Arc<dyn ErrorSurface>) -> Self {
        Self {
            store,
            surface,
            generation: 0,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        mut fetched: mpsc::UnboundedReceiver<Fetched>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(event) = events.recv() => self.on_connection_event(event),
                Some(result) = fetched.recv() => self.on_fetched(result),
                else => break,
            }
            self.flush_notifications();
        }
        log::debug!("Session state discarded");
    }

    /// Runs listeners outside of any store method, so they're free to do whatever they want.
    pub(crate) fn flush_notifications(&mut self) {
        let notifications = self.store.drain_due_notifications();
        for notification in notifications {
            notification();
        }
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {}
            ConnectionEvent::ConnectError(error) => {
                if error.is_terminal() {
                    log::error!("Giving up on the realtime connection: {error}");
                }
                self.surface.notify(Notice::network("connect_error"));
            }
            ConnectionEvent::Disconnected(reason) if reason.is_transient() => {
                log::debug!("Connection dropped ({reason}), reconnecting");
            }
            ConnectionEvent::Disconnected(DisconnectReason::ServerInitiated) => {
                self.surface.notify(Notice::NotAuthenticated);
            }
            ConnectionEvent::Disconnected(reason) => {
                log::debug!("Connection closed ({reason})");
            }
            ConnectionEvent::Event { name, args } => match wire::decode_event(&name, &args) {
                Ok(Some(event)) => self.on_server_event(event),
                Ok(None) => log::debug!("Ignoring event {name:?}"),
                Err(error) => log::warn!("Dropping malformed event: {error}"),
            },
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        if let Err(error) = self.store.apply_event(&event) {
            log::error!("Dropping event: {error}");
            return;
        }
        if let ServerEvent::Error { message } = event {
            self.surface.notify(Notice::message_rejected(message));
        }
    }

    fn on_fetched(&mut self, fetched: Fetched) {
        match fetched {
            Fetched::TokenRotated { generation } => self.generation = generation,
            Fetched::Chats { generation, .. } if generation != self.generation => {
                log::debug!("Discarding chats fetched with an old token");
            }
            Fetched::Chats { result, .. } => {
                match result {
                    Ok(chats) => {
                        self.store.replace_chats(chats);
                    }
                    // the chat list failing to load is not worth bothering the user about
                    Err(error) => log::debug!("Failed to fetch chats: {error}"),
                }
                self.store.finish_loading();
            }
            Fetched::Users(Ok(users)) => {
                self.store.replace_users(users);
            }
            Fetched::Users(Err(error)) => {
                if error.is_network() {
                    self.surface.notify(Notice::network("fetching users"));
                } else {
                    log::warn!("Failed to fetch users: {error}");
                }
            }
        }
    }
}

use std::sync::Arc;

use crate::AppState;
use crate::data_model::{
    Chat, DirtyTracker, ListenerKey, ReconciliationError, ServerEvent, Snapshot, User,
};

/// What observers get to see: the current snapshot, and whether the chat list is still loading.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreView {
    pub snapshot: Snapshot,
    pub loading: bool,
}

type Listener = Arc<dyn Fn(ListenerKey, &StoreView) + Send + Sync>;

/// Holds the current snapshot. The only way to change it is through the methods below, each of
/// which swaps in a whole new snapshot.
pub struct StateStore {
    snapshot: DirtyTracker<Snapshot>,
    listeners: slotmap::SlotMap<slotmap::DefaultKey, Listener>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self {
            snapshot: DirtyTracker::default(),
            listeners: Default::default(),
        }
    }
}

impl StateStore {
    pub fn get_snapshot(&self) -> Snapshot {
        self.snapshot.store().clone()
    }

    /// True until the chat list has been fetched (or failed to fetch) once.
    pub fn loading(&self) -> bool {
        !self.snapshot.loaded_at_least_once()
    }

    pub fn view(&self) -> StoreView {
        StoreView {
            snapshot: self.get_snapshot(),
            loading: self.loading(),
        }
    }

    pub fn replace_chats(&mut self, chats: impl IntoIterator<Item = Chat>) -> Snapshot {
        let next = self.snapshot.store().with_chats(chats);
        self.snapshot.replace(next.clone());
        next
    }

    pub fn replace_users(&mut self, users: impl IntoIterator<Item = User>) -> Snapshot {
        let next = self.snapshot.store().with_users(users);
        self.snapshot.replace(next.clone());
        next
    }

    /// Marks the chat list as loaded. Returns true the first time.
    pub fn finish_loading(&mut self) -> bool {
        self.snapshot.mark_loaded()
    }

    /// Applies one server event. On error the current snapshot is kept as is.
    pub fn apply_event(&mut self, event: &ServerEvent) -> Result<Snapshot, ReconciliationError> {
        let next = self.snapshot.store().apply_event(event)?;
        if matches!(event, ServerEvent::Error { .. }) {
            return Ok(next);
        }
        self.snapshot.replace(next.clone());
        Ok(next)
    }

    /// The listener is invoked with every new view, once notifications are drained.
    pub fn register_listener(
        &mut self,
        listener: impl Fn(ListenerKey, &StoreView) + Send + Sync + 'static,
    ) -> ListenerKey {
        let key = self.listeners.insert(Arc::new(listener));
        ListenerKey(key)
    }

    pub fn unregister_listener(&mut self, key: ListenerKey) {
        if self.listeners.remove(key.0).is_none() {
            log::warn!("Tried to unregister a listener that was not registered");
        }
    }

    /// Collects the pending notifications without running them, so the caller can release
    /// its hold on the store first.
    pub fn drain_due_notifications(&mut self) -> Vec<Box<dyn FnOnce() + Send>> {
        if !self.snapshot.take_dirty() {
            return Vec::new();
        }

        let view = self.view();
        self.listeners
            .iter()
            .map(|(key, listener)| {
                let listener = listener.clone();
                let view = view.clone();
                let key = ListenerKey(key);
                Box::new(move || listener(key, &view)) as Box<dyn FnOnce() + Send>
            })
            .collect()
    }
}

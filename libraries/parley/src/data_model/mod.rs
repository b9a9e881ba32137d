#[path = "1-ids.rs"]
mod ids;

#[path = "2-entities.rs"]
mod entities;

#[path = "3-server-event.rs"]
mod server_event;

#[path = "4-snapshot.rs"]
mod snapshot;

#[path = "5-reconciler.rs"]
mod reconciler;

#[path = "6-dirty-tracker.rs"]
mod dirty_tracker;

#[path = "7-state-store.rs"]
mod state_store;

pub use dirty_tracker::*;
pub use entities::*;
pub use ids::*;
pub use reconciler::*;
pub use server_event::*;
pub use snapshot::*;
pub use state_store::*;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ListenerKey(pub(crate) slotmap::DefaultKey);

//! This is a library for keeping a client-side mirror of a realtime chat server.
//! It was created for the Parley frontend, so it doesn't include much that was not needed for that project.
//!
//! Syncing strategy:
//! 1. The client starts from an empty [`Snapshot`](data_model::Snapshot).
//! 2. Whole lists fetched over REST replace the corresponding half of the snapshot.
//! 3. Every event pushed by the server is "applied" to the current snapshot, in arrival order, producing the next one.
//! 4. Snapshots are persistent data structures (see the `im` crate), so old snapshots handed out to observers stay valid and unchanged.
//!
//! The tricky parts are keeping transitions atomic and never letting a message show up for a chat the client doesn't know about.

pub mod data_model;

/// A state that evolves by applying events to it.
///
/// `apply_event` borrows the current state and returns the next one, so the caller
/// is free to keep the old value around.
pub trait AppState: Sized {
    type Event;
    type Error;

    fn apply_event(&self, event: &Self::Event) -> Result<Self, Self::Error>;
}

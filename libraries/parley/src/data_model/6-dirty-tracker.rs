//! # DirtyTracker
//! A DirtyTracker is a wrapper around any value that adds a "dirty" flag. It's set whenever the value is replaced,
//! so observers only get notified when there's actually something new to look at.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirtyState {
    /// No pending notifications
    Clean,
    /// Listeners should be told about the current value
    Dirty,
}

#[derive(Clone, Debug)]
pub struct DirtyTracker<Store> {
    store: Store,
    pub dirty_state: DirtyState,
    loaded_at_least_once: bool,
}

impl<Store: Default> Default for DirtyTracker<Store> {
    fn default() -> Self {
        Self {
            store: Default::default(),

            // Creating a store is an action that warrants a notification.
            dirty_state: DirtyState::Dirty,
            loaded_at_least_once: false,
        }
    }
}

impl<Store> DirtyTracker<Store> {
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Swaps in a new value and marks the tracker dirty.
    pub(crate) fn replace(&mut self, store: Store) {
        self.store = store;
        self.dirty_state = DirtyState::Dirty;
    }

    /// Returns true if the `loaded` marker was changed
    pub(crate) fn mark_loaded(&mut self) -> bool {
        if !self.loaded_at_least_once {
            self.loaded_at_least_once = true;
            self.dirty_state = DirtyState::Dirty;
            true
        } else {
            false
        }
    }

    pub fn loaded_at_least_once(&self) -> bool {
        self.loaded_at_least_once
    }

    /// Returns true if there was something to report, and resets the flag.
    pub(crate) fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty_state, DirtyState::Clean) == DirtyState::Dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tracker_is_dirty() {
        let mut tracker = DirtyTracker::<u32>::default();
        assert!(tracker.take_dirty());
        assert!(!tracker.take_dirty());
    }

    #[test]
    fn test_mark_loaded_only_once() {
        let mut tracker = DirtyTracker::<u32>::default();
        tracker.take_dirty();

        assert!(tracker.mark_loaded());
        assert!(tracker.take_dirty());
        assert!(!tracker.mark_loaded());
        assert!(!tracker.take_dirty());
    }

    #[test]
    fn test_replace_marks_dirty() {
        let mut tracker = DirtyTracker::<u32>::default();
        tracker.take_dirty();

        tracker.replace(3);
        assert_eq!(*tracker.store(), 3);
        assert_eq!(tracker.dirty_state, DirtyState::Dirty);
        assert!(!tracker.loaded_at_least_once());
        assert!(tracker.take_dirty());
    }
}

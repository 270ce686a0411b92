//! Occupancy store: the client's single source of truth for who is present.

use labpresence_shared::{OccupancySnapshot, PresenceEntry, PresenceEvent, UserId};
use tokio::sync::watch;

use super::reconcile::{reconcile_event, reconcile_local_arrival, reconcile_snapshot};

/// What observers see: the present users, oldest arrival first, and whether
/// the live stream is up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Occupancy {
    pub entries: Vec<PresenceEntry>,
    pub is_connected: bool,
}

impl Occupancy {
    pub fn entry_for(&self, user_id: UserId) -> Option<&PresenceEntry> {
        self.entries.iter().find(|e| e.user_id == user_id)
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.entry_for(user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owns the presence set. All writes go through this type; readers subscribe.
///
/// Observers are only woken when the view actually changes.
#[derive(Debug)]
pub struct OccupancyStore {
    state: watch::Sender<Occupancy>,
}

impl Default for OccupancyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OccupancyStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Occupancy::default());
        Self { state }
    }

    /// Replace the presence set with a complete server listing.
    pub fn apply_snapshot(&self, snapshot: OccupancySnapshot) {
        let count = snapshot.entries.len();
        let changed = self
            .state
            .send_if_modified(|view| reconcile_snapshot(&mut view.entries, snapshot));
        crate::log_debug!("Applied snapshot of {} entries (changed: {})", count, changed);
    }

    /// Apply one streamed presence change.
    pub fn apply_event(&self, event: PresenceEvent) {
        let user_id = event.user_id();
        let changed = self
            .state
            .send_if_modified(|view| reconcile_event(&mut view.entries, event));
        crate::log_debug!("Applied event for user {} (changed: {})", user_id, changed);
    }

    /// Mirror the stream's connectivity. Never touches the presence set.
    pub fn set_connected(&self, connected: bool) {
        self.state.send_if_modified(|view| {
            if view.is_connected == connected {
                return false;
            }
            view.is_connected = connected;
            true
        });
    }

    /// Optimistically show this client's own check-in until the server confirms it.
    pub fn record_local_check_in(&self, entry: PresenceEntry) {
        self.state
            .send_if_modified(|view| reconcile_local_arrival(&mut view.entries, entry));
    }

    /// Optimistically drop this client's own entry after a check-out.
    pub fn record_local_check_out(&self, user_id: UserId) {
        self.state.send_if_modified(|view| {
            reconcile_event(&mut view.entries, PresenceEvent::Departed(user_id))
        });
    }

    /// Copy of the current view.
    pub fn current(&self) -> Occupancy {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected
    }

    pub fn is_present(&self, user_id: UserId) -> bool {
        self.state.borrow().contains(user_id)
    }

    pub fn entry_for(&self, user_id: UserId) -> Option<PresenceEntry> {
        self.state.borrow().entry_for(user_id).cloned()
    }

    /// Receiver that is marked changed whenever the view changes.
    pub fn subscribe(&self) -> watch::Receiver<Occupancy> {
        self.state.subscribe()
    }
}

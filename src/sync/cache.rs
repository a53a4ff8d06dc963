//! Last-known control state with change detection

use tracing::debug;

use crate::data::ControlState;

/// Result of offering a fetched snapshot to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Snapshot differs from the cached one and replaced it
    Changed,
    /// All synchronization fields are equal; nothing to re-render
    Unchanged,
    /// Older than the cached snapshot; rejected
    Stale,
}

/// Cached control state, reconciled from polls and command responses
#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: Option<ControlState>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn current(&self) -> Option<&ControlState> {
        self.current.as_ref()
    }

    /// Offer a polled snapshot.
    ///
    /// Responses can complete out of order, so a snapshot whose version is
    /// strictly older than the cached one is refused.
    pub fn offer(&mut self, state: ControlState) -> Offer {
        let Some(current) = self.current.as_ref() else {
            self.current = Some(state);
            return Offer::Changed;
        };

        if state.version() < current.version() {
            debug!(
                "Rejecting stale control state {} (cached {})",
                state.version(),
                current.version()
            );
            return Offer::Stale;
        }

        if state.sync_key() == current.sync_key() {
            // Keep display-only fields fresh without notifying
            self.current = Some(state);
            return Offer::Unchanged;
        }

        self.current = Some(state);
        Offer::Changed
    }

    /// Replace with an authoritative command response. The version guard
    /// does not apply. Returns whether the sync fields changed.
    pub fn replace(&mut self, state: ControlState) -> bool {
        let changed = self
            .current
            .as_ref()
            .map(|current| current.sync_key() != state.sync_key())
            .unwrap_or(true);
        self.current = Some(state);
        changed
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

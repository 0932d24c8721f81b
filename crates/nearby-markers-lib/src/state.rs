//! Per-session record of which markers currently have an active notification

use crate::MarkerId;
use std::collections::HashSet;

/// Armed markers for one tracking session
///
/// Membership means a notification has fired for the marker and the user has not left
/// its threshold since. The state lives only in memory and starts empty on every
/// (re)subscribe, so markers the user is already inside fire again after a restart.
#[derive(Debug, Clone, Default)]
pub struct ProximityState {
    armed: HashSet<MarkerId>,
}

impl ProximityState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_armed(&self, id: MarkerId) -> bool {
        self.armed.contains(&id)
    }

    /// Mark a marker as notified. Returns `true` if it was not armed before.
    #[inline]
    pub fn arm(&mut self, id: MarkerId) -> bool {
        self.armed.insert(id)
    }

    /// Forget a marker's notification. Returns `true` if it was armed.
    #[inline]
    pub fn disarm(&mut self, id: MarkerId) -> bool {
        self.armed.remove(&id)
    }

    /// Drop every entry, returning the ids that were armed (ascending)
    pub fn clear(&mut self) -> Vec<MarkerId> {
        let mut ids: Vec<MarkerId> = self.armed.drain().collect();
        ids.sort_unstable();
        ids
    }

    /// Currently armed ids in ascending order
    pub fn armed_ids(&self) -> Vec<MarkerId> {
        let mut ids: Vec<MarkerId> = self.armed.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

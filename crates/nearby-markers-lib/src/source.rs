//! Location sources
//!
//! A [`LocationSource`] pushes coordinates into a channel owned by the consumer until the
//! returned [`Subscription`] is dropped or unsubscribed. Once every sender is gone the
//! consumer sees the channel close and stops.

use crate::{Coordinate, LocationOptions, ProximityError, Result};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Producer of a (possibly infinite) sequence of location updates
pub trait LocationSource: Send + Sync {
    /// Start delivering updates into `updates`
    ///
    /// Returns [`ProximityError::PermissionDenied`] when location access is unavailable; in
    /// that case nothing is delivered and `updates` is dropped.
    fn subscribe(
        &self,
        options: &LocationOptions,
        updates: mpsc::Sender<Coordinate>,
    ) -> Result<Subscription>;
}

/// Handle to an active location subscription
///
/// Unsubscribing is idempotent and also happens on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Create a subscription that runs `cancel` exactly once when it ends
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Debug)]
struct ChannelInner {
    sender: Option<mpsc::Sender<Coordinate>>,
    permission_granted: bool,
    /// Bumped on every subscribe so a stale subscription cannot detach a newer one
    generation: u64,
}

/// Location source fed manually through [`ChannelLocationSource::push`]
///
/// Clones share the same subscriber. A new subscription replaces the previous one.
#[derive(Debug, Clone)]
pub struct ChannelLocationSource {
    inner: Arc<Mutex<ChannelInner>>,
}

impl Default for ChannelLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelLocationSource {
    pub fn new() -> Self {
        Self::with_permission(true)
    }

    /// A source whose subscriptions fail with [`ProximityError::PermissionDenied`]
    pub fn denied() -> Self {
        Self::with_permission(false)
    }

    fn with_permission(permission_granted: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChannelInner {
                sender: None,
                permission_granted,
                generation: 0,
            })),
        }
    }

    pub fn set_permission(&self, granted: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.permission_granted = granted;
    }

    pub fn is_subscribed(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.sender.as_ref().is_some_and(|s| !s.is_closed())
    }

    fn current_sender(&self) -> Result<mpsc::Sender<Coordinate>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.sender.clone().ok_or(ProximityError::SourceClosed)
    }

    /// Deliver one update, waiting for channel capacity
    pub async fn push(&self, location: Coordinate) -> Result<()> {
        let sender = self.current_sender()?;
        sender
            .send(location)
            .await
            .map_err(|_| ProximityError::SourceClosed)
    }

    /// Deliver one update without waiting; fails if the channel is full or closed
    pub fn try_push(&self, location: Coordinate) -> Result<()> {
        let sender = self.current_sender()?;
        sender
            .try_send(location)
            .map_err(|_| ProximityError::SourceClosed)
    }
}

impl LocationSource for ChannelLocationSource {
    fn subscribe(
        &self,
        _options: &LocationOptions,
        updates: mpsc::Sender<Coordinate>,
    ) -> Result<Subscription> {
        let generation = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if !inner.permission_granted {
                return Err(ProximityError::PermissionDenied(
                    "location access was denied".to_string(),
                ));
            }
            inner.generation += 1;
            inner.sender = Some(updates);
            inner.generation
        };

        let inner = Arc::clone(&self.inner);
        Ok(Subscription::new(move || {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.generation == generation {
                inner.sender = None;
            }
        }))
    }
}

//! Notification dispatch
//!
//! [`NotificationDispatcher`] turns [`ProximityEvent`]s into calls on a
//! [`NotificationSink`]. Sink failures are logged and counted but never propagated: the
//! proximity state has already been committed when the sink is called, and a failed
//! `show` only means the user misses that notification until the next re-entry.

use crate::{MarkerId, ProximityEvent};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Title used for every proximity notification
pub const NOTIFICATION_TITLE: &str = "You are near a marker!";

/// Body used when the marker has no title
pub const DEFAULT_NOTIFICATION_BODY: &str = "Saved point";

/// Errors reported by a notification backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SinkError {
    #[error("Notification permission not granted")]
    PermissionDenied,

    #[error("Notification backend error: {0}")]
    Backend(String),
}

/// Capability to show and cancel notifications keyed by marker id
///
/// Implementations must be idempotent: showing an already visible key replaces it and
/// canceling an unknown key is a no-op.
pub trait NotificationSink: Send + Sync {
    fn show(&self, key: MarkerId, title: &str, body: &str) -> Result<(), SinkError>;

    fn cancel(&self, key: MarkerId) -> Result<(), SinkError>;

    fn cancel_all(&self) -> Result<(), SinkError>;
}

impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    fn show(&self, key: MarkerId, title: &str, body: &str) -> Result<(), SinkError> {
        (**self).show(key, title, body)
    }

    fn cancel(&self, key: MarkerId) -> Result<(), SinkError> {
        (**self).cancel(key)
    }

    fn cancel_all(&self) -> Result<(), SinkError> {
        (**self).cancel_all()
    }
}

/// Counters describing what one dispatch call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub shown: usize,
    pub canceled: usize,
    pub failures: usize,
}

impl std::ops::AddAssign for DispatchOutcome {
    fn add_assign(&mut self, other: Self) {
        self.shown += other.shown;
        self.canceled += other.canceled;
        self.failures += other.failures;
    }
}

/// Adapter from proximity events to sink calls
#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Notification body for a marker title
    pub fn body_for(title: Option<&str>) -> String {
        match title.map(str::trim) {
            Some(title) if !title.is_empty() => format!("Marker: {}", title),
            _ => DEFAULT_NOTIFICATION_BODY.to_string(),
        }
    }

    /// Forward a single event to the sink
    pub fn dispatch(&self, event: &ProximityEvent) -> DispatchOutcome {
        match event {
            ProximityEvent::Entered { id, title } => {
                let body = Self::body_for(title.as_deref());
                match self.sink.show(*id, NOTIFICATION_TITLE, &body) {
                    Ok(()) => DispatchOutcome {
                        shown: 1,
                        ..DispatchOutcome::default()
                    },
                    Err(e) => {
                        tracing::warn!("Failed to show notification for marker {}: {}", id, e);
                        DispatchOutcome {
                            failures: 1,
                            ..DispatchOutcome::default()
                        }
                    }
                }
            }
            ProximityEvent::Exited { id } => self.cancel(*id),
        }
    }

    /// Forward events in order
    pub fn dispatch_all(&self, events: &[ProximityEvent]) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for event in events {
            outcome += self.dispatch(event);
        }
        outcome
    }

    /// Cancel the notification of one marker
    pub fn cancel(&self, id: MarkerId) -> DispatchOutcome {
        match self.sink.cancel(id) {
            Ok(()) => DispatchOutcome {
                canceled: 1,
                ..DispatchOutcome::default()
            },
            Err(e) => {
                tracing::warn!("Failed to cancel notification for marker {}: {}", id, e);
                DispatchOutcome {
                    failures: 1,
                    ..DispatchOutcome::default()
                }
            }
        }
    }

    /// Cancel every notification shown through the sink
    pub fn cancel_all(&self) -> DispatchOutcome {
        match self.sink.cancel_all() {
            Ok(()) => DispatchOutcome::default(),
            Err(e) => {
                tracing::warn!("Failed to cancel all notifications: {}", e);
                DispatchOutcome {
                    failures: 1,
                    ..DispatchOutcome::default()
                }
            }
        }
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher").finish_non_exhaustive()
    }
}

/// A sink call recorded by [`MemoryNotificationSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Show {
        key: MarkerId,
        title: String,
        body: String,
    },
    Cancel {
        key: MarkerId,
    },
    CancelAll,
}

/// Sink that keeps notifications in memory
///
/// Useful for headless hosts and tests: it tracks which notifications are visible and
/// records every call in order.
#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    inner: Mutex<MemorySinkInner>,
}

#[derive(Debug, Default)]
struct MemorySinkInner {
    active: BTreeMap<MarkerId, (String, String)>,
    history: Vec<SinkCall>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible notifications as `(key, title, body)` in ascending key order
    pub fn active(&self) -> Vec<(MarkerId, String, String)> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .active
            .iter()
            .map(|(key, (title, body))| (*key, title.clone(), body.clone()))
            .collect()
    }

    pub fn is_active(&self, key: MarkerId) -> bool {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.active.contains_key(&key)
    }

    /// Every call received so far, oldest first
    pub fn history(&self) -> Vec<SinkCall> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.history.clone()
    }
}

impl NotificationSink for MemoryNotificationSink {
    fn show(&self, key: MarkerId, title: &str, body: &str) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .active
            .insert(key, (title.to_string(), body.to_string()));
        inner.history.push(SinkCall::Show {
            key,
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn cancel(&self, key: MarkerId) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.active.remove(&key);
        inner.history.push(SinkCall::Cancel { key });
        Ok(())
    }

    fn cancel_all(&self) -> Result<(), SinkError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.active.clear();
        inner.history.push(SinkCall::CancelAll);
        Ok(())
    }
}

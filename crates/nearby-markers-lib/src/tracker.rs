//! Tracking session - consumer loop tying a location source to markers and notifications
//!
//! A [`TrackingSession`] owns the [`ProximityState`] of one tracking run. Updates from the
//! location source are processed one at a time: every update takes a fresh marker snapshot,
//! evaluates it, commits the state change and only then calls the notification sink. All
//! mutations (updates, marker removal, stop) go through one async mutex, so passes never
//! overlap. A marker deleted from the store is forgotten, and its notification canceled, on
//! the first update that no longer sees it.

use crate::{
    Coordinate, DispatchOutcome, LocationSource, MarkerId, MarkerStore, NotificationDispatcher,
    NotificationSink, ProximityError, ProximityEvent, ProximityState, Result, Subscription,
    TrackingConfig, evaluate_detailed,
};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Counters accumulated over the lifetime of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingStats {
    /// Location updates evaluated
    pub updates_processed: u64,
    /// Updates rejected because the location was not a valid coordinate
    pub updates_rejected: u64,
    pub notifications_shown: u64,
    pub notifications_canceled: u64,
    pub sink_failures: u64,
    /// Marker evaluations skipped because of an invalid marker position
    pub skipped_markers: u64,
}

impl TrackingStats {
    fn record_dispatch(&mut self, outcome: DispatchOutcome) {
        self.notifications_shown += outcome.shown as u64;
        self.notifications_canceled += outcome.canceled as u64;
        self.sink_failures += outcome.failures as u64;
    }
}

/// Collaborators attached while tracking runs
struct Pipeline {
    store: Arc<dyn MarkerStore>,
    dispatcher: NotificationDispatcher,
}

struct Shared {
    state: ProximityState,
    pipeline: Option<Pipeline>,
    stats: TrackingStats,
}

/// Consumer loop and its subscription
struct Worker {
    subscription: Subscription,
    handle: JoinHandle<()>,
}

/// One proximity tracking run
pub struct TrackingSession {
    config: TrackingConfig,
    shared: Arc<Mutex<Shared>>,
    worker: Option<Worker>,
}

impl TrackingSession {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: ProximityState::new(),
                pipeline: None,
                stats: TrackingStats::default(),
            })),
            worker: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Subscribe to `source` and start the consumer loop
    ///
    /// The proximity state is reset, so markers the user is already inside fire again. On
    /// error (invalid configuration, permission denied, already running) no state changes.
    pub async fn start(
        &mut self,
        source: &dyn LocationSource,
        store: Arc<dyn MarkerStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<()> {
        if self.worker.is_some() {
            return Err(ProximityError::AlreadyTracking);
        }
        self.config.validate()?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let subscription = source.subscribe(&self.config.location, tx)?;

        {
            let mut shared = self.shared.lock().await;
            shared.state.clear();
            shared.pipeline = Some(Pipeline {
                store,
                dispatcher: NotificationDispatcher::new(sink),
            });
        }

        let shared = Arc::clone(&self.shared);
        let threshold = self.config.threshold_meters;
        let parallel_threshold = self.config.parallel_threshold;
        let handle = tokio::spawn(consume(shared, rx, threshold, parallel_threshold));

        tracing::info!(
            "Proximity tracking started (threshold {} m, {:?} accuracy)",
            threshold,
            self.config.location.accuracy
        );
        self.worker = Some(Worker {
            subscription,
            handle,
        });
        Ok(())
    }

    /// Evaluate one location directly, bypassing the source channel
    ///
    /// Serialized with the consumer loop. Fails if the session is not started or the
    /// location is invalid.
    pub async fn handle_update(&self, location: Coordinate) -> Result<Vec<ProximityEvent>> {
        let mut shared = self.shared.lock().await;
        process_update(
            &mut shared,
            location,
            self.config.threshold_meters,
            self.config.parallel_threshold,
        )
    }

    /// Forget a deleted marker right away, canceling its notification if one is active
    ///
    /// Without this call the next update does the same once the marker is gone from the
    /// store. Returns `true` if the marker was armed.
    pub async fn remove_marker(&self, id: MarkerId) -> bool {
        let mut shared = self.shared.lock().await;
        if !shared.state.disarm(id) {
            return false;
        }
        tracing::debug!("Marker {} removed while armed; canceling notification", id);
        let outcome = shared
            .pipeline
            .as_ref()
            .map(|pipeline| pipeline.dispatcher.cancel(id));
        if let Some(outcome) = outcome {
            shared.stats.record_dispatch(outcome);
        }
        true
    }

    /// Stop tracking
    ///
    /// Unsubscribes from the source, lets the consumer drain updates that were already
    /// queued, then clears the state and cancels every notification. Stopping an idle
    /// session is a no-op.
    pub async fn stop(&mut self) {
        let Some(Worker {
            mut subscription,
            mut handle,
        }) = self.worker.take()
        else {
            return;
        };

        subscription.unsubscribe();
        join_consumer(&mut handle).await;
        self.reset().await;
    }

    /// Wait until the location source ends on its own, then stop
    ///
    /// Meant for finite sources such as track replays; with an endless source this only
    /// returns once the source is closed elsewhere. Cancel safe: if the future is dropped
    /// before the source ends, the session keeps running and [`Self::stop`] still works.
    pub async fn run_to_completion(&mut self) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        join_consumer(&mut worker.handle).await;

        if let Some(mut worker) = self.worker.take() {
            worker.subscription.unsubscribe();
        }
        self.reset().await;
    }

    async fn reset(&self) {
        let mut shared = self.shared.lock().await;
        let armed = shared.state.clear();
        if let Some(pipeline) = shared.pipeline.take() {
            let outcome = pipeline.dispatcher.cancel_all();
            shared.stats.record_dispatch(outcome);
        }
        tracing::info!(
            "Proximity tracking stopped ({} active notifications cleared)",
            armed.len()
        );
    }

    /// Ids whose notification is currently active, ascending
    pub async fn armed_markers(&self) -> Vec<MarkerId> {
        self.shared.lock().await.state.armed_ids()
    }

    pub async fn stats(&self) -> TrackingStats {
        self.shared.lock().await.stats
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        tracing::warn!("Tracking session dropped without stop(); aborting consumer");
        worker.handle.abort();

        match self.shared.try_lock() {
            Ok(mut shared) => {
                shared.state.clear();
                if let Some(pipeline) = shared.pipeline.take() {
                    let outcome = pipeline.dispatcher.cancel_all();
                    shared.stats.record_dispatch(outcome);
                }
            }
            Err(_) => {
                tracing::warn!("Consumer busy while dropping session; notifications left as is");
            }
        }
    }
}

async fn join_consumer(handle: &mut JoinHandle<()>) {
    if let Err(e) = handle.await {
        tracing::error!("Proximity consumer task failed: {}", e);
    }
}

/// Consumer loop: one evaluation pass per update until the channel closes
async fn consume(
    shared: Arc<Mutex<Shared>>,
    mut rx: mpsc::Receiver<Coordinate>,
    threshold: f64,
    parallel_threshold: usize,
) {
    while let Some(location) = rx.recv().await {
        let mut guard = shared.lock().await;
        if let Err(e) = process_update(&mut guard, location, threshold, parallel_threshold) {
            tracing::warn!("Ignoring location update {}: {}", location, e);
        }
    }
    tracing::debug!("Location stream ended");
}

fn process_update(
    shared: &mut Shared,
    location: Coordinate,
    threshold: f64,
    parallel_threshold: usize,
) -> Result<Vec<ProximityEvent>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("tracker::process_update");

    let Shared {
        state,
        pipeline,
        stats,
    } = shared;
    let pipeline = pipeline.as_ref().ok_or(ProximityError::NotTracking)?;

    let snapshot = pipeline.store.list();
    let evaluation =
        match evaluate_detailed(location, &snapshot, state, threshold, parallel_threshold) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                stats.updates_rejected += 1;
                return Err(e);
            }
        };

    stats.updates_processed += 1;
    stats.skipped_markers += evaluation.skipped.len() as u64;
    let outcome = pipeline.dispatcher.dispatch_all(&evaluation.events);
    stats.record_dispatch(outcome);

    Ok(evaluation.events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{MemoryNotificationSink, SinkCall};
    use crate::utils::destination_point;
    use crate::{ChannelLocationSource, Marker, MemoryMarkerStore, NOTIFICATION_TITLE};

    fn origin() -> Coordinate {
        Coordinate::new(55.7558, 37.6173).unwrap()
    }

    fn at(distance: f64) -> Coordinate {
        destination_point(origin(), 0.0, distance)
    }

    async fn started_session(
        markers: Vec<Marker>,
    ) -> (TrackingSession, ChannelLocationSource, Arc<MemoryNotificationSink>) {
        let source = ChannelLocationSource::new();
        let sink = Arc::new(MemoryNotificationSink::new());
        let mut session = TrackingSession::new(TrackingConfig::default());
        session
            .start(&source, Arc::new(markers), sink.clone())
            .await
            .unwrap();
        (session, source, sink)
    }

    #[tokio::test]
    async fn test_handle_update_scenario() {
        let (mut session, _source, sink) =
            started_session(vec![Marker::new(1, origin()).with_title("Red Square")]).await;

        let events = session.handle_update(at(50.0)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(sink.is_active(1));

        assert!(session.handle_update(at(50.0)).await.unwrap().is_empty());

        let events = session.handle_update(at(500.0)).await.unwrap();
        assert_eq!(events, vec![ProximityEvent::Exited { id: 1 }]);
        assert!(!sink.is_active(1));

        let events = session.handle_update(at(30.0)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            sink.active(),
            vec![(
                1,
                NOTIFICATION_TITLE.to_string(),
                "Marker: Red Square".to_string()
            )]
        );

        let stats = session.stats().await;
        assert_eq!(stats.updates_processed, 4);
        assert_eq!(stats.notifications_shown, 2);
        assert_eq!(stats.notifications_canceled, 1);

        session.stop().await;
    }

    #[tokio::test]
    async fn test_consumer_loop_processes_pushed_updates() {
        let (mut session, source, sink) = started_session(vec![Marker::new(7, origin())]).await;

        for distance in [50.0, 50.0, 500.0, 30.0] {
            source.push(at(distance)).await.unwrap();
        }
        session.stop().await;

        assert_eq!(
            sink.history(),
            vec![
                SinkCall::Show {
                    key: 7,
                    title: NOTIFICATION_TITLE.to_string(),
                    body: "Saved point".to_string()
                },
                SinkCall::Cancel { key: 7 },
                SinkCall::Show {
                    key: 7,
                    title: NOTIFICATION_TITLE.to_string(),
                    body: "Saved point".to_string()
                },
                SinkCall::CancelAll,
            ]
        );
        assert_eq!(session.stats().await.updates_processed, 4);
        assert!(session.armed_markers().await.is_empty());
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_permission_denied_does_not_start() {
        let source = ChannelLocationSource::denied();
        let mut session = TrackingSession::new(TrackingConfig::default());
        let result = session
            .start(
                &source,
                Arc::new(Vec::<Marker>::new()),
                Arc::new(MemoryNotificationSink::new()),
            )
            .await;

        assert!(matches!(result, Err(ProximityError::PermissionDenied(_))));
        assert!(!session.is_running());
        assert!(matches!(
            session.handle_update(origin()).await,
            Err(ProximityError::NotTracking)
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_does_not_subscribe() {
        let source = ChannelLocationSource::new();
        let mut session = TrackingSession::new(TrackingConfig::with_threshold(-5.0));
        let result = session
            .start(
                &source,
                Arc::new(Vec::<Marker>::new()),
                Arc::new(MemoryNotificationSink::new()),
            )
            .await;
        assert!(matches!(result, Err(ProximityError::InvalidThreshold(_))));
        assert!(!source.is_subscribed());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (mut session, source, sink) = started_session(Vec::new()).await;
        let result = session
            .start(&source, Arc::new(Vec::<Marker>::new()), sink)
            .await;
        assert!(matches!(result, Err(ProximityError::AlreadyTracking)));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_remove_marker_cancels_notification() {
        let store = Arc::new(MemoryMarkerStore::new());
        let id = store.add_marker(origin().latitude(), origin().longitude()).unwrap();
        let source = ChannelLocationSource::new();
        let sink = Arc::new(MemoryNotificationSink::new());
        let mut session = TrackingSession::new(TrackingConfig::default());
        session
            .start(&source, store.clone(), sink.clone())
            .await
            .unwrap();

        session.handle_update(at(10.0)).await.unwrap();
        assert_eq!(session.armed_markers().await, vec![id]);

        store.delete_marker(id).unwrap();
        assert!(session.remove_marker(id).await);
        assert!(!sink.is_active(id));
        assert_eq!(sink.history().last(), Some(&SinkCall::Cancel { key: id }));
        assert!(session.armed_markers().await.is_empty());

        // Unknown or already removed markers are a no-op
        assert!(!session.remove_marker(id).await);

        // Deleted marker no longer produces events
        assert!(session.handle_update(at(10.0)).await.unwrap().is_empty());
        session.stop().await;
    }

    #[tokio::test]
    async fn test_deleted_marker_exits_on_next_update() {
        let store = Arc::new(MemoryMarkerStore::new());
        let kept = store.add_marker(origin().latitude(), origin().longitude()).unwrap();
        let deleted = store.add_marker(origin().latitude(), origin().longitude()).unwrap();
        let source = ChannelLocationSource::new();
        let sink = Arc::new(MemoryNotificationSink::new());
        let mut session = TrackingSession::new(TrackingConfig::default());
        session
            .start(&source, store.clone(), sink.clone())
            .await
            .unwrap();

        session.handle_update(at(10.0)).await.unwrap();
        assert_eq!(session.armed_markers().await, vec![kept, deleted]);

        store.delete_marker(deleted).unwrap();
        let events = session.handle_update(at(10.0)).await.unwrap();
        assert_eq!(events, vec![ProximityEvent::Exited { id: deleted }]);
        assert_eq!(sink.history().last(), Some(&SinkCall::Cancel { key: deleted }));
        assert!(!sink.is_active(deleted));
        assert!(sink.is_active(kept));
        assert_eq!(session.armed_markers().await, vec![kept]);
        assert_eq!(session.stats().await.notifications_canceled, 1);

        // Already forgotten, so an explicit removal has nothing left to do
        assert!(!session.remove_marker(deleted).await);
        session.stop().await;
    }

    #[tokio::test]
    async fn test_drop_without_stop_cancels_notifications() {
        let (session, _source, sink) = started_session(vec![Marker::new(1, origin())]).await;
        session.handle_update(at(10.0)).await.unwrap();
        assert!(sink.is_active(1));

        drop(session);
        assert!(sink.active().is_empty());
        assert_eq!(sink.history().last(), Some(&SinkCall::CancelAll));
    }

    #[tokio::test]
    async fn test_restart_refires() {
        let markers = vec![Marker::new(1, origin())];
        let (mut session, source, sink) = started_session(markers.clone()).await;
        session.handle_update(at(20.0)).await.unwrap();
        session.stop().await;
        assert!(sink.active().is_empty());

        session
            .start(&source, Arc::new(markers), sink.clone())
            .await
            .unwrap();
        let events = session.handle_update(at(20.0)).await.unwrap();
        assert!(matches!(
            events.as_slice(),
            [ProximityEvent::Entered { id: 1, .. }]
        ));
        session.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_update_is_counted_and_ignored() {
        let (mut session, source, _sink) = started_session(vec![Marker::new(1, origin())]).await;

        source
            .push(Coordinate::new_unchecked(123.0, 0.0))
            .await
            .unwrap();
        source.push(at(10.0)).await.unwrap();
        session.stop().await;

        let stats = session.stats().await;
        assert_eq!(stats.updates_rejected, 1);
        assert_eq!(stats.updates_processed, 1);
        assert_eq!(stats.notifications_shown, 1);
    }

    #[tokio::test]
    async fn test_stop_idle_session_is_noop() {
        let mut session = TrackingSession::new(TrackingConfig::default());
        session.stop().await;
        assert!(!session.is_running());
        assert_eq!(session.stats().await, TrackingStats::default());
    }
}

//! Nearby Markers Library - Proximity Tracking for Saved Map Markers
//!
//! This library watches a stream of device locations, compares every update against the
//! user's saved markers and decides when a "you are near a marker" notification should be
//! shown, kept, or canceled. A notification fires exactly once per continuous stay inside
//! the proximity threshold and re-arms once the user leaves.
//!
//! # Architecture
//!
//! - **[`Coordinate`]**: Validated WGS84 position
//! - **[`ProximityState`]**: Per-session set of markers whose notification is active
//! - **[`evaluate`]**: Enter/exit transition detection for one location update
//! - **[`NotificationDispatcher`]**: Translates transitions into [`NotificationSink`] calls
//! - **[`TrackingSession`]**: Consumer loop tying a [`LocationSource`] to a [`MarkerStore`]
//! - **[`MemoryMarkerStore`]**: In-memory marker and photo bookkeeping
//! - **[`TrackReplay`]**: GPX-backed location source for simulation and testing
//!
//! # Performance Characteristics
//!
//! - **Evaluation**: O(M log M) per update for M markers (distance pass + id ordering)
//! - **State**: O(A) memory for A currently armed markers

mod config;
mod coordinate;
mod evaluator;
mod marker;
mod notification;
mod source;
mod state;
mod track;
mod tracker;
pub mod utils;

// Public API exports
pub use config::{
    DEFAULT_PROXIMITY_THRESHOLD_METERS, LocationAccuracy, LocationOptions, TrackingConfig,
};
pub use coordinate::Coordinate;
pub use evaluator::{Evaluation, ProximityEvent, evaluate, evaluate_detailed};
pub use marker::{
    ImageId, Marker, MarkerId, MarkerImage, MarkerStore, MarkerStoreSnapshot, MemoryMarkerStore,
};
pub use notification::{
    DEFAULT_NOTIFICATION_BODY, DispatchOutcome, MemoryNotificationSink, NOTIFICATION_TITLE,
    NotificationDispatcher, NotificationSink, SinkCall, SinkError,
};
pub use source::{ChannelLocationSource, LocationSource, Subscription};
pub use state::ProximityState;
pub use track::TrackReplay;
pub use tracker::{TrackingSession, TrackingStats};

/// Error types for proximity tracking
#[derive(Debug, thiserror::Error)]
pub enum ProximityError {
    #[error("Location permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid coordinate: ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Invalid proximity threshold: {0}")]
    InvalidThreshold(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Location source closed")]
    SourceClosed,

    #[error("Tracking session already running")]
    AlreadyTracking,

    #[error("Tracking session not running")]
    NotTracking,

    #[error("Marker not found: {0}")]
    MarkerNotFound(MarkerId),

    #[error("Image not found: {0}")]
    ImageNotFound(ImageId),

    #[error("GPX parsing error: {0}")]
    GpxParse(#[from] gpx::errors::GpxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty track")]
    EmptyTrack,
}

pub type Result<T> = std::result::Result<T, ProximityError>;

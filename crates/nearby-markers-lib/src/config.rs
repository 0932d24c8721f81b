//! Tracking configuration
//!
//! The proximity threshold is fixed for the lifetime of a tracking session. Location
//! options are handed to the [`crate::LocationSource`] untouched; the evaluator never
//! enforces them.

use crate::{ProximityError, Result};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default distance in meters within which a marker counts as nearby
pub const DEFAULT_PROXIMITY_THRESHOLD_METERS: f64 = 100.0;

/// Requested accuracy of location updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LocationAccuracy {
    Lowest,
    Low,
    #[default]
    Balanced,
    High,
    Highest,
    BestForNavigation,
}

impl LocationAccuracy {
    /// Approximate horizontal accuracy a provider aims for, in meters
    pub fn nominal_meters(&self) -> f64 {
        match self {
            Self::Lowest => 3000.0,
            Self::Low => 1000.0,
            Self::Balanced => 100.0,
            Self::High => 10.0,
            Self::Highest | Self::BestForNavigation => 1.0,
        }
    }

    pub fn all() -> &'static [Self] {
        &[
            Self::Lowest,
            Self::Low,
            Self::Balanced,
            Self::High,
            Self::Highest,
            Self::BestForNavigation,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lowest => "lowest",
            Self::Low => "low",
            Self::Balanced => "balanced",
            Self::High => "high",
            Self::Highest => "highest",
            Self::BestForNavigation => "navigation",
        }
    }
}

impl std::str::FromStr for LocationAccuracy {
    type Err = ProximityError;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|accuracy| accuracy.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProximityError::InvalidConfig(format!("unknown accuracy '{}'", s)))
    }
}

/// Options handed to a location source when subscribing
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocationOptions {
    /// Requested accuracy (default: balanced)
    pub accuracy: LocationAccuracy,
    /// Minimum time between updates (default: 5 seconds)
    pub time_interval: Duration,
    /// Minimum movement in meters between updates (default: 10 m)
    pub distance_interval_meters: f64,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            accuracy: LocationAccuracy::Balanced,
            time_interval: Duration::from_millis(5000),
            distance_interval_meters: 10.0,
        }
    }
}

/// Configuration for a tracking session
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackingConfig {
    /// Proximity threshold in meters. A marker at exactly this distance is inside.
    pub threshold_meters: f64,
    /// Options forwarded to the location source
    pub location: LocationOptions,
    /// Capacity of the channel between the location source and the consumer loop
    pub channel_capacity: usize,
    /// Snapshot size above which distances are computed in parallel
    pub parallel_threshold: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            threshold_meters: DEFAULT_PROXIMITY_THRESHOLD_METERS,
            location: LocationOptions::default(),
            channel_capacity: 64,
            parallel_threshold: 1024,
        }
    }
}

impl TrackingConfig {
    /// Create a default configuration with a custom threshold
    pub fn with_threshold(threshold_meters: f64) -> Self {
        Self {
            threshold_meters,
            ..Self::default()
        }
    }

    /// Check that the configuration can drive a tracking session
    pub fn validate(&self) -> Result<()> {
        if !self.threshold_meters.is_finite() || self.threshold_meters < 0.0 {
            return Err(ProximityError::InvalidThreshold(self.threshold_meters));
        }
        if self.channel_capacity == 0 {
            return Err(ProximityError::InvalidConfig(
                "channel capacity must be positive".to_string(),
            ));
        }
        if !self.location.distance_interval_meters.is_finite()
            || self.location.distance_interval_meters < 0.0
        {
            return Err(ProximityError::InvalidConfig(format!(
                "distance interval must be a non-negative number, got {}",
                self.location.distance_interval_meters
            )));
        }
        Ok(())
    }
}

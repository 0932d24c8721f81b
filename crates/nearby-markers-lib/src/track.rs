//! GPX track replay
//!
//! This module provides [`TrackReplay`], a [`LocationSource`] that plays back the points of
//! a recorded GPX track as if they came from a device, honoring the time and distance
//! intervals of the requested [`LocationOptions`].

use crate::{Coordinate, LocationOptions, LocationSource, ProximityError, Result, Subscription, utils};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A recorded track replayed as a location stream
#[derive(Clone, Debug)]
pub struct TrackReplay {
    /// Valid track points in recording order
    points: Arc<[Coordinate]>,
    /// Cached total distance in meters (computed once during construction)
    cached_total_distance: f64,
    /// Playback speed factor; 2.0 halves the delay between updates
    speed: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrackReplay {
    /// Create a replay from parsed GPX data
    ///
    /// Track points outside WGS84 bounds are skipped. Fails if no valid point remains.
    pub fn new(gpx_data: gpx::Gpx) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("track::new");

        let mut points = Vec::new();
        for track in &gpx_data.tracks {
            for segment in &track.segments {
                for waypoint in &segment.points {
                    match utils::waypoint_to_coordinate(waypoint) {
                        Some(coordinate) => points.push(coordinate),
                        None => tracing::warn!(
                            "Skipping track point outside WGS84 bounds: ({}, {})",
                            waypoint.point().y(),
                            waypoint.point().x()
                        ),
                    }
                }
            }
        }
        Self::from_coordinates(points)
    }

    /// Read and parse a GPX file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let reader = std::io::BufReader::new(file);
        Self::new(gpx::read(reader)?)
    }

    /// Create a replay from coordinates
    pub fn from_coordinates(points: Vec<Coordinate>) -> Result<Self> {
        if points.is_empty() {
            return Err(ProximityError::EmptyTrack);
        }
        for point in &points {
            point.validate()?;
        }
        let total_distance = points
            .windows(2)
            .map(|pair| utils::haversine_distance(pair[0], pair[1]))
            .sum();

        Ok(Self {
            points: points.into(),
            cached_total_distance: total_distance,
            speed: 1.0,
        })
    }

    /// Set the playback speed factor (non-positive values are ignored)
    pub fn with_speed(mut self, speed: f64) -> Self {
        if speed.is_finite() && speed > 0.0 {
            self.speed = speed;
        } else {
            tracing::warn!("Ignoring invalid replay speed {}", speed);
        }
        self
    }

    #[inline]
    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    #[inline]
    pub fn total_points(&self) -> usize {
        self.points.len()
    }

    /// Total distance along the track in meters
    ///
    /// This is O(1) as the value is cached during construction.
    #[inline]
    pub fn total_distance(&self) -> f64 {
        self.cached_total_distance
    }

    /// Points a provider would report with the given distance interval
    ///
    /// A point is kept when it is at least `distance_interval` meters from the last kept
    /// point. The first point is always kept.
    pub fn filtered_points(&self, distance_interval: f64) -> Vec<Coordinate> {
        let mut kept: Vec<Coordinate> = Vec::with_capacity(self.points.len());
        for point in self.points.iter() {
            match kept.last() {
                Some(last) if utils::haversine_distance(*last, *point) < distance_interval => {}
                _ => kept.push(*point),
            }
        }
        kept
    }

    /// Wait between two replayed points; fails if the interval does not fit a `Duration`
    fn delay(&self, options: &LocationOptions) -> Result<Duration> {
        let seconds = options.time_interval.as_secs_f64() / self.speed;
        Duration::try_from_secs_f64(seconds).map_err(|e| {
            ProximityError::InvalidConfig(format!(
                "replay speed {} gives an unusable update interval: {}",
                self.speed, e
            ))
        })
    }
}

impl LocationSource for TrackReplay {
    /// Spawn a playback task on the current tokio runtime
    fn subscribe(
        &self,
        options: &LocationOptions,
        updates: mpsc::Sender<Coordinate>,
    ) -> Result<Subscription> {
        let delay = self.delay(options)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ProximityError::InvalidConfig(format!("track replay needs a tokio runtime: {}", e))
        })?;

        let points = self.filtered_points(options.distance_interval_meters);
        tracing::info!(
            "Replaying {} of {} track points every {:?}",
            points.len(),
            self.total_points(),
            delay
        );

        let handle = runtime.spawn(async move {
            for (index, point) in points.into_iter().enumerate() {
                if index > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if updates.send(point).await.is_err() {
                    tracing::debug!("Replay consumer went away after {} points", index);
                    return;
                }
            }
            tracing::debug!("Replay finished");
        });

        Ok(Subscription::new(move || handle.abort()))
    }
}

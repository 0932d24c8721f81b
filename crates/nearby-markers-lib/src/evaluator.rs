//! Proximity evaluation
//!
//! One evaluation pass compares the current location with every marker of a snapshot and
//! turns threshold crossings into [`ProximityEvent`]s, updating the [`ProximityState`] as it
//! goes. Markers are visited in ascending id order so the output is stable for identical
//! inputs. An armed marker that no longer appears in the snapshot was deleted and counts as
//! exited.

use crate::{Coordinate, Marker, MarkerId, ProximityError, ProximityState, Result, utils};
use rayon::prelude::*;
use std::collections::HashSet;

/// Snapshot size above which distances are computed with rayon by [`evaluate`]
const DEFAULT_PARALLEL_THRESHOLD: usize = 1024;

/// A threshold crossing for one marker
#[derive(Debug, Clone, PartialEq)]
pub enum ProximityEvent {
    /// The user came within the threshold of a marker that was not armed
    Entered {
        id: MarkerId,
        title: Option<String>,
    },
    /// The user left the threshold of an armed marker, or the marker left the store
    Exited { id: MarkerId },
}

impl ProximityEvent {
    #[inline]
    pub fn marker_id(&self) -> MarkerId {
        match self {
            Self::Entered { id, .. } | Self::Exited { id } => *id,
        }
    }
}

/// Detailed result of one evaluation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Transitions in ascending marker id order
    pub events: Vec<ProximityEvent>,
    /// Markers ignored because their position is not a valid coordinate
    pub skipped: Vec<MarkerId>,
    /// Distance in meters to every evaluated marker, in ascending id order
    pub distances: Vec<(MarkerId, f64)>,
}

/// Evaluate one location update and return the resulting transitions
///
/// Fails without touching `state` if `current` is not a valid coordinate or the threshold
/// is negative or not finite. Markers with invalid positions are skipped and keep their
/// armed state; armed markers missing from `markers` are disarmed with an
/// [`ProximityEvent::Exited`].
pub fn evaluate(
    current: Coordinate,
    markers: &[Marker],
    state: &mut ProximityState,
    threshold: f64,
) -> Result<Vec<ProximityEvent>> {
    evaluate_detailed(
        current,
        markers,
        state,
        threshold,
        DEFAULT_PARALLEL_THRESHOLD,
    )
    .map(|evaluation| evaluation.events)
}

/// Evaluate one location update, also reporting skipped markers and distances
///
/// `parallel_threshold` controls when the distance pass switches to rayon; the state pass
/// always runs sequentially so results do not depend on it.
pub fn evaluate_detailed(
    current: Coordinate,
    markers: &[Marker],
    state: &mut ProximityState,
    threshold: f64,
    parallel_threshold: usize,
) -> Result<Evaluation> {
    #[cfg(feature = "profiling")]
    profiling::scope!("evaluator::evaluate");

    current.validate()?;
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(ProximityError::InvalidThreshold(threshold));
    }

    let mut ordered: Vec<&Marker> = markers.iter().collect();
    ordered.sort_by_key(|marker| marker.id);

    let measure = |marker: &&Marker| -> (MarkerId, Option<f64>) {
        let distance = marker
            .position
            .validate()
            .ok()
            .map(|_| utils::haversine_distance(current, marker.position));
        (marker.id, distance)
    };
    let measured: Vec<(MarkerId, Option<f64>)> = if ordered.len() > parallel_threshold {
        ordered.par_iter().map(measure).collect()
    } else {
        ordered.iter().map(measure).collect()
    };

    let mut evaluation = Evaluation {
        distances: Vec::with_capacity(measured.len()),
        ..Evaluation::default()
    };

    for (marker, (id, distance)) in ordered.into_iter().zip(measured) {
        let Some(distance) = distance else {
            tracing::warn!(
                "Skipping marker {} with invalid position {}",
                id,
                marker.position
            );
            evaluation.skipped.push(id);
            continue;
        };
        evaluation.distances.push((id, distance));

        let inside = distance <= threshold;
        if inside && state.arm(id) {
            tracing::debug!("Entered marker {} ({:.1} m)", id, distance);
            evaluation.events.push(ProximityEvent::Entered {
                id,
                title: marker.title.clone(),
            });
        } else if !inside && state.disarm(id) {
            tracing::debug!("Exited marker {} ({:.1} m)", id, distance);
            evaluation.events.push(ProximityEvent::Exited { id });
        }
    }

    if !state.is_empty() {
        let present: HashSet<MarkerId> = markers.iter().map(|marker| marker.id).collect();
        let vanished: Vec<MarkerId> = state
            .armed_ids()
            .into_iter()
            .filter(|id| !present.contains(id))
            .collect();
        if !vanished.is_empty() {
            for id in vanished {
                tracing::debug!("Marker {} left the store while armed", id);
                state.disarm(id);
                evaluation.events.push(ProximityEvent::Exited { id });
            }
            evaluation.events.sort_by_key(ProximityEvent::marker_id);
        }
    }

    Ok(evaluation)
}

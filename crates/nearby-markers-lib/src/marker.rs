//! Marker storage
//!
//! This module provides the [`Marker`] record, the read-only [`MarkerStore`] view used by
//! tracking sessions, and [`MemoryMarkerStore`], a thread-safe in-memory store that also
//! keeps the photos attached to each marker.

use crate::{Coordinate, ProximityError, Result};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique marker identifier, also used as the notification key
pub type MarkerId = i64;

/// Unique photo identifier
pub type ImageId = i64;

/// A saved geographic point of interest
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Marker {
    pub id: MarkerId,
    pub position: Coordinate,
    pub title: Option<String>,
    /// Creation time in seconds since the Unix epoch
    pub created_at: Option<u64>,
}

impl Marker {
    pub fn new(id: MarkerId, position: Coordinate) -> Self {
        Self {
            id,
            position,
            title: None,
            created_at: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A photo attached to a marker
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarkerImage {
    pub id: ImageId,
    pub marker_id: MarkerId,
    pub uri: String,
    /// Creation time in seconds since the Unix epoch
    pub created_at: u64,
}

/// Read-only access to the current markers
pub trait MarkerStore: Send + Sync {
    /// Take a snapshot of all markers at the time of the call
    fn list(&self) -> Vec<Marker>;
}

impl MarkerStore for Vec<Marker> {
    fn list(&self) -> Vec<Marker> {
        self.clone()
    }
}

/// Serializable image of a [`MemoryMarkerStore`]
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarkerStoreSnapshot {
    pub markers: Vec<Marker>,
    pub images: Vec<MarkerImage>,
    pub next_marker_id: MarkerId,
    pub next_image_id: ImageId,
}

#[derive(Debug, Default)]
struct Inner {
    markers: BTreeMap<MarkerId, Marker>,
    images: BTreeMap<ImageId, MarkerImage>,
    next_marker_id: MarkerId,
    next_image_id: ImageId,
}

impl Inner {
    fn allocate_marker_id(&mut self) -> MarkerId {
        self.next_marker_id = self.next_marker_id.max(0) + 1;
        self.next_marker_id
    }

    fn allocate_image_id(&mut self) -> ImageId {
        self.next_image_id = self.next_image_id.max(0) + 1;
        self.next_image_id
    }
}

/// Thread-safe in-memory marker store with auto-incrementing ids
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    inner: RwLock<Inner>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot
    ///
    /// Fails if a marker position is out of range or an image references a missing marker.
    pub fn from_snapshot(snapshot: MarkerStoreSnapshot) -> Result<Self> {
        let mut inner = Inner::default();

        for marker in snapshot.markers {
            marker.position.validate()?;
            inner.next_marker_id = inner.next_marker_id.max(marker.id);
            inner.markers.insert(marker.id, marker);
        }
        for image in snapshot.images {
            if !inner.markers.contains_key(&image.marker_id) {
                return Err(ProximityError::MarkerNotFound(image.marker_id));
            }
            inner.next_image_id = inner.next_image_id.max(image.id);
            inner.images.insert(image.id, image);
        }
        // Never reuse ids handed out before the snapshot was taken
        inner.next_marker_id = inner.next_marker_id.max(snapshot.next_marker_id);
        inner.next_image_id = inner.next_image_id.max(snapshot.next_image_id);

        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Capture the full store contents
    pub fn snapshot(&self) -> MarkerStoreSnapshot {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        MarkerStoreSnapshot {
            markers: inner.markers.values().cloned().collect(),
            images: inner.images.values().cloned().collect(),
            next_marker_id: inner.next_marker_id,
            next_image_id: inner.next_image_id,
        }
    }

    /// Add an untitled marker at the given position
    pub fn add_marker(&self, latitude: f64, longitude: f64) -> Result<MarkerId> {
        self.insert_marker(Coordinate::new(latitude, longitude)?, None)
    }

    /// Add a marker with a title
    pub fn add_marker_with_title(
        &self,
        latitude: f64,
        longitude: f64,
        title: impl Into<String>,
    ) -> Result<MarkerId> {
        self.insert_marker(Coordinate::new(latitude, longitude)?, Some(title.into()))
    }

    fn insert_marker(&self, position: Coordinate, title: Option<String>) -> Result<MarkerId> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = inner.allocate_marker_id();
        inner.markers.insert(
            id,
            Marker {
                id,
                position,
                title,
                created_at: Some(unix_now()),
            },
        );
        tracing::debug!("Added marker {} at {}", id, position);
        Ok(id)
    }

    /// Change or clear a marker's title
    pub fn set_title(&self, id: MarkerId, title: Option<String>) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let marker = inner
            .markers
            .get_mut(&id)
            .ok_or(ProximityError::MarkerNotFound(id))?;
        marker.title = title;
        Ok(())
    }

    /// Delete a marker together with its photos
    ///
    /// Tracking sessions must be told separately through
    /// [`crate::TrackingSession::remove_marker`] so an outstanding notification is canceled.
    pub fn delete_marker(&self, id: MarkerId) -> Result<Marker> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let marker = inner
            .markers
            .remove(&id)
            .ok_or(ProximityError::MarkerNotFound(id))?;
        inner.images.retain(|_, image| image.marker_id != id);
        tracing::debug!("Deleted marker {}", id);
        Ok(marker)
    }

    pub fn get_marker(&self, id: MarkerId) -> Option<Marker> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.markers.get(&id).cloned()
    }

    /// Attach a photo URI to a marker
    pub fn add_image(&self, marker_id: MarkerId, uri: impl Into<String>) -> Result<ImageId> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !inner.markers.contains_key(&marker_id) {
            return Err(ProximityError::MarkerNotFound(marker_id));
        }
        let id = inner.allocate_image_id();
        inner.images.insert(
            id,
            MarkerImage {
                id,
                marker_id,
                uri: uri.into(),
                created_at: unix_now(),
            },
        );
        Ok(id)
    }

    pub fn delete_image(&self, id: ImageId) -> Result<MarkerImage> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .images
            .remove(&id)
            .ok_or(ProximityError::ImageNotFound(id))
    }

    /// Photos of a marker, newest first
    pub fn marker_images(&self, marker_id: MarkerId) -> Vec<MarkerImage> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut images: Vec<MarkerImage> = inner
            .images
            .values()
            .filter(|image| image.marker_id == marker_id)
            .cloned()
            .collect();
        images.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        images
    }

    #[inline]
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MarkerStore for MemoryMarkerStore {
    /// Markers ordered newest first
    fn list(&self) -> Vec<Marker> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut markers: Vec<Marker> = inner.markers.values().cloned().collect();
        markers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        markers
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_list_markers() {
        let store = MemoryMarkerStore::new();
        let first = store.add_marker(55.7558, 37.6173).unwrap();
        let second = store.add_marker_with_title(55.7600, 37.6200, "Cafe").unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(store.len(), 2);

        let markers = store.list();
        // Newest first
        assert_eq!(markers[0].id, second);
        assert_eq!(markers[0].title.as_deref(), Some("Cafe"));
        assert_eq!(markers[1].id, first);
        assert!(markers[1].created_at.is_some());
    }

    #[test]
    fn test_add_marker_rejects_invalid_position() {
        let store = MemoryMarkerStore::new();
        assert!(matches!(
            store.add_marker(95.0, 0.0),
            Err(ProximityError::InvalidCoordinate { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_marker_cascades_images() {
        let store = MemoryMarkerStore::new();
        let keep = store.add_marker(1.0, 1.0).unwrap();
        let remove = store.add_marker(2.0, 2.0).unwrap();
        store.add_image(keep, "file:///keep.jpg").unwrap();
        store.add_image(remove, "file:///a.jpg").unwrap();
        store.add_image(remove, "file:///b.jpg").unwrap();

        let deleted = store.delete_marker(remove).unwrap();
        assert_eq!(deleted.id, remove);
        assert!(store.get_marker(remove).is_none());
        assert!(store.marker_images(remove).is_empty());
        assert_eq!(store.marker_images(keep).len(), 1);
    }

    #[test]
    fn test_delete_missing_marker() {
        let store = MemoryMarkerStore::new();
        assert!(matches!(
            store.delete_marker(3),
            Err(ProximityError::MarkerNotFound(3))
        ));
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() {
        let store = MemoryMarkerStore::new();
        let first = store.add_marker(1.0, 1.0).unwrap();
        store.delete_marker(first).unwrap();
        let second = store.add_marker(1.0, 1.0).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_images_for_unknown_marker() {
        let store = MemoryMarkerStore::new();
        assert!(matches!(
            store.add_image(9, "file:///x.jpg"),
            Err(ProximityError::MarkerNotFound(9))
        ));
    }

    #[test]
    fn test_marker_images_newest_first() {
        let store = MemoryMarkerStore::new();
        let marker = store.add_marker(1.0, 1.0).unwrap();
        let a = store.add_image(marker, "file:///a.jpg").unwrap();
        let b = store.add_image(marker, "file:///b.jpg").unwrap();

        let images = store.marker_images(marker);
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].id, b);
        assert_eq!(images[1].id, a);

        store.delete_image(a).unwrap();
        assert_eq!(store.marker_images(marker).len(), 1);
        assert!(matches!(
            store.delete_image(a),
            Err(ProximityError::ImageNotFound(_))
        ));
    }

    #[test]
    fn test_set_title() {
        let store = MemoryMarkerStore::new();
        let id = store.add_marker(1.0, 1.0).unwrap();
        store.set_title(id, Some("Home".to_string())).unwrap();
        assert_eq!(store.get_marker(id).unwrap().title.as_deref(), Some("Home"));
        store.set_title(id, None).unwrap();
        assert!(store.get_marker(id).unwrap().title.is_none());
        assert!(store.set_title(99, None).is_err());
    }

    #[test]
    fn test_snapshot_restore() {
        let store = MemoryMarkerStore::new();
        let a = store.add_marker_with_title(10.0, 20.0, "A").unwrap();
        let b = store.add_marker(11.0, 21.0).unwrap();
        store.add_image(a, "file:///a.jpg").unwrap();
        store.delete_marker(b).unwrap();

        let snapshot = store.snapshot();
        let restored = MemoryMarkerStore::from_snapshot(snapshot.clone()).unwrap();
        assert_eq!(restored.snapshot(), snapshot);

        // Id counter survives even though marker `b` is gone
        let next = restored.add_marker(0.0, 0.0).unwrap();
        assert_eq!(next, b + 1);
    }

    #[test]
    fn test_snapshot_with_dangling_image_fails() {
        let snapshot = MarkerStoreSnapshot {
            markers: Vec::new(),
            images: vec![MarkerImage {
                id: 1,
                marker_id: 5,
                uri: "file:///x.jpg".to_string(),
                created_at: 0,
            }],
            next_marker_id: 0,
            next_image_id: 1,
        };
        assert!(matches!(
            MemoryMarkerStore::from_snapshot(snapshot),
            Err(ProximityError::MarkerNotFound(5))
        ));
    }

    #[test]
    fn test_vec_is_a_marker_store() {
        let markers = vec![Marker::new(1, Coordinate::new(0.0, 0.0).unwrap()).with_title("x")];
        assert_eq!(MarkerStore::list(&markers), markers);
    }
}

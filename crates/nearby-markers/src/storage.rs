//! Marker persistence
//!
//! Markers and their photos live in a single JSON file holding a
//! [`MarkerStoreSnapshot`]. Writes go to a sibling temporary file which is then
//! renamed over the existing file, so a crash mid-write never leaves a truncated file.
//! [`WatchedMarkerFile`] serves a tracking session from that file and picks up edits made
//! by other invocations while tracking runs.

use nearby_markers_lib::{
    Marker, MarkerStore, MarkerStoreSnapshot, MemoryMarkerStore, ProximityError,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Invalid marker data: {0}")]
    Data(#[from] ProximityError),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// JSON file backing a [`MemoryMarkerStore`]
#[derive(Debug, Clone)]
pub struct MarkerFile {
    path: PathBuf,
}

impl MarkerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store; a missing or empty file yields an empty store
    pub fn load(&self) -> StorageResult<MemoryMarkerStore> {
        match self.read()? {
            Some(contents) => self.parse(&contents),
            None => Ok(MemoryMarkerStore::new()),
        }
    }

    /// Raw file contents, `None` if the file does not exist
    fn read(&self) -> StorageResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No marker file at {}, starting empty", self.path.display());
                Ok(None)
            }
            Err(e) => Err(StorageError::Io(format!(
                "Failed to read marker file {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn parse(&self, contents: &str) -> StorageResult<MemoryMarkerStore> {
        if contents.trim().is_empty() {
            return Ok(MemoryMarkerStore::new());
        }
        let snapshot: MarkerStoreSnapshot = serde_json::from_str(contents)
            .map_err(|e| StorageError::Json(format!("Failed to parse marker file: {}", e)))?;
        tracing::debug!(
            "Loaded {} markers and {} photos from {}",
            snapshot.markers.len(),
            snapshot.images.len(),
            self.path.display()
        );
        Ok(MemoryMarkerStore::from_snapshot(snapshot)?)
    }

    /// Write the whole store atomically
    pub fn save(&self, store: &MemoryMarkerStore) -> StorageResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::Io(format!("Failed to create marker directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&store.snapshot())
            .map_err(|e| StorageError::Json(e.to_string()))?;

        let tmp = self.temp_path();
        fs::write(&tmp, json).map_err(|e| StorageError::Io(format!("write failed: {}", e)))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(StorageError::Io(format!("rename failed: {}", e)));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "markers.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// [`MarkerStore`] that reads its [`MarkerFile`] again for every snapshot
///
/// The file is only parsed when its contents changed since the last snapshot. If it can no
/// longer be read or parsed, the last good markers are served.
#[derive(Debug)]
pub struct WatchedMarkerFile {
    file: MarkerFile,
    cache: Mutex<CachedMarkers>,
}

#[derive(Debug)]
struct CachedMarkers {
    contents: Option<String>,
    markers: Vec<Marker>,
}

impl WatchedMarkerFile {
    /// Load the file once; errors here are reported instead of falling back to empty
    pub fn open(file: MarkerFile) -> StorageResult<Self> {
        let contents = file.read()?;
        let markers = file.parse(contents.as_deref().unwrap_or_default())?.list();
        Ok(Self {
            file,
            cache: Mutex::new(CachedMarkers { contents, markers }),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn refresh(&self, cache: &mut CachedMarkers) -> StorageResult<()> {
        let contents = self.file.read()?;
        if contents == cache.contents {
            return Ok(());
        }
        let markers = self
            .file
            .parse(contents.as_deref().unwrap_or_default())?
            .list();
        tracing::info!(
            "Marker file {} changed: {} -> {} markers",
            self.file.path().display(),
            cache.markers.len(),
            markers.len()
        );
        cache.contents = contents;
        cache.markers = markers;
        Ok(())
    }
}

impl MarkerStore for WatchedMarkerFile {
    fn list(&self) -> Vec<Marker> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.refresh(&mut cache) {
            tracing::warn!("Keeping previous markers: {}", e);
        }
        cache.markers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let file = MarkerFile::new(dir.path().join("markers.json"));
        assert!(file.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let file = MarkerFile::new(dir.path().join("nested").join("markers.json"));

        let store = MemoryMarkerStore::new();
        let cafe = store.add_marker_with_title(55.7558, 37.6173, "Cafe").unwrap();
        let deleted = store.add_marker(55.7600, 37.6200).unwrap();
        store.add_image(cafe, "file:///photos/1.jpg").unwrap();
        store.delete_marker(deleted).unwrap();
        file.save(&store).unwrap();

        let reloaded = file.load().unwrap();
        assert_eq!(reloaded.list(), store.list());
        assert_eq!(reloaded.marker_images(cafe).len(), 1);

        // Ids of deleted markers are not reused after a reload
        let next = reloaded.add_marker(1.0, 1.0).unwrap();
        assert!(next > deleted);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = MarkerFile::new(dir.path().join("markers.json"));
        file.save(&MemoryMarkerStore::new()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("markers.json")]);
    }

    #[test]
    fn test_corrupted_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            MarkerFile::new(&path).load(),
            Err(StorageError::Json(_))
        ));
    }

    #[test]
    fn test_invalid_marker_position_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.json");
        fs::write(
            &path,
            r#"{"markers":[{"id":1,"position":{"latitude":123.0,"longitude":0.0},"title":null,"created_at":null}],"images":[],"next_marker_id":1,"next_image_id":0}"#,
        )
        .unwrap();
        assert!(matches!(
            MarkerFile::new(&path).load(),
            Err(StorageError::Data(ProximityError::InvalidCoordinate { .. }))
        ));
    }

    #[test]
    fn test_watched_file_follows_edits() {
        let dir = tempfile::tempdir().unwrap();
        let file = MarkerFile::new(dir.path().join("markers.json"));
        let store = MemoryMarkerStore::new();
        let cafe = store.add_marker_with_title(55.7558, 37.6173, "Cafe").unwrap();
        let park = store.add_marker(55.7600, 37.6200).unwrap();
        file.save(&store).unwrap();

        let watched = WatchedMarkerFile::open(file.clone()).unwrap();
        assert_eq!(watched.list(), store.list());

        // Another invocation deletes a marker
        let edited = file.load().unwrap();
        edited.delete_marker(park).unwrap();
        file.save(&edited).unwrap();
        let ids: Vec<_> = watched.list().iter().map(|marker| marker.id).collect();
        assert_eq!(ids, vec![cafe]);

        // A broken file keeps the last good markers
        fs::write(file.path(), "{ not json").unwrap();
        assert_eq!(watched.list().len(), 1);

        fs::remove_file(file.path()).unwrap();
        assert!(watched.list().is_empty());
    }

    #[test]
    fn test_watched_file_open_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markers.json");
        assert!(WatchedMarkerFile::open(MarkerFile::new(&path)).unwrap().list().is_empty());

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            WatchedMarkerFile::open(MarkerFile::new(&path)),
            Err(StorageError::Json(_))
        ));
    }
}

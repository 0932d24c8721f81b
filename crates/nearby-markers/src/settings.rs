use clap::{Args, Parser, Subcommand};
use nearby_markers_lib::{
    DEFAULT_PROXIMITY_THRESHOLD_METERS, ImageId, LocationAccuracy, MarkerId, Result,
    TrackingConfig,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the default marker file location
pub const MARKERS_FILE_ENV: &str = "NEARBY_MARKERS_FILE";

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Nearby Markers - Manage saved map markers and get notified when you walk past them
pub struct Settings {
    /// JSON file holding the saved markers (default: $NEARBY_MARKERS_FILE or the user config dir)
    #[clap(long, value_name = "FILE", global = true)]
    pub markers_file: Option<PathBuf>,

    /// Distance in meters within which a marker counts as nearby
    #[clap(long, default_value_t = DEFAULT_PROXIMITY_THRESHOLD_METERS, global = true)]
    pub threshold: f64,

    /// Minimum time between location updates in milliseconds
    #[clap(long, default_value = "5000", global = true)]
    pub interval_ms: u64,

    /// Minimum movement in meters between location updates
    #[clap(long, default_value = "10.0", global = true)]
    pub distance_interval: f64,

    /// Requested location accuracy (lowest, low, balanced, high, highest, navigation)
    #[clap(long, default_value = "balanced", global = true)]
    pub accuracy: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Manage saved markers
    #[clap(subcommand)]
    Markers(MarkerCommand),

    /// Manage photos attached to markers
    #[clap(subcommand)]
    Images(ImageCommand),

    /// Track a location stream and notify when passing saved markers
    Track(TrackArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum MarkerCommand {
    /// List markers, newest first
    List,

    /// Save a marker
    Add {
        #[clap(allow_negative_numbers = true)]
        latitude: f64,
        #[clap(allow_negative_numbers = true)]
        longitude: f64,
        #[clap(long)]
        title: Option<String>,
    },

    /// Delete a marker and its photos
    Delete { id: MarkerId },

    /// Change a marker's title (an empty title clears it)
    Title { id: MarkerId, title: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ImageCommand {
    /// List the photos of a marker, newest first
    List { marker: MarkerId },

    /// Attach a photo URI to a marker
    Add { marker: MarkerId, uri: String },

    /// Delete a photo
    Delete { id: ImageId },
}

#[derive(Args, Debug, Clone)]
pub struct TrackArgs {
    /// GPX track to replay as the location stream
    #[clap(long, value_name = "FILE", conflicts_with = "stdin", required_unless_present = "stdin")]
    pub gpx: Option<PathBuf>,

    /// Read `lat,lon` lines from stdin as the location stream
    #[clap(long)]
    pub stdin: bool,

    /// Replay speed factor for --gpx (2.0 plays twice as fast)
    #[clap(long, default_value = "1.0")]
    pub speed: f64,
}

impl Settings {
    pub fn from_cli() -> Self {
        Settings::parse()
    }

    /// Tracking configuration assembled from the global flags
    pub fn tracking_config(&self) -> Result<TrackingConfig> {
        let mut config = TrackingConfig::with_threshold(self.threshold);
        config.location.accuracy = self.accuracy.parse::<LocationAccuracy>()?;
        config.location.time_interval = Duration::from_millis(self.interval_ms);
        config.location.distance_interval_meters = self.distance_interval;
        config.validate()?;
        Ok(config)
    }

    /// Marker file path: flag, then environment, then the per-user default
    pub fn markers_path(&self) -> PathBuf {
        self.markers_file
            .clone()
            .or_else(|| get_env::<PathBuf>(MARKERS_FILE_ENV))
            .unwrap_or_else(default_markers_path)
    }
}

/// Generic function to get environment variable, parsing it to the desired type.
pub fn get_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Determine a good default marker file path for the current user.
/// - On Windows: %APPDATA%/NearbyMarkers/markers.json
/// - Else: $HOME/.config/nearby-markers/markers.json
fn default_markers_path() -> PathBuf {
    if cfg!(windows)
        && let Ok(appdata) = std::env::var("APPDATA")
    {
        return Path::new(&appdata).join("NearbyMarkers").join("markers.json");
    }

    if let Ok(home) = std::env::var("HOME") {
        return Path::new(&home)
            .join(".config")
            .join("nearby-markers")
            .join("markers.json");
    }

    // Fallback to current directory
    Path::new(".").join("nearby-markers.json")
}

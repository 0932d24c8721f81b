//! Subcommand implementations

use crate::settings::{Command, ImageCommand, MarkerCommand, Settings, TrackArgs};
use crate::sink::LogNotificationSink;
use crate::storage::{MarkerFile, StorageError, WatchedMarkerFile};
use nearby_markers_lib::{
    ChannelLocationSource, Coordinate, MarkerStore, NotificationSink, ProximityError,
    TrackReplay, TrackingConfig, TrackingSession, TrackingStats,
};
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Proximity(#[from] ProximityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid location '{0}': expected 'lat,lon'")]
    Parse(String),
}

pub async fn run(settings: Settings) -> Result<(), AppError> {
    let file = MarkerFile::new(settings.markers_path());
    let mut out = std::io::stdout();

    match &settings.command {
        Command::Markers(command) => run_markers(&file, command, &mut out),
        Command::Images(command) => run_images(&file, command, &mut out),
        Command::Track(args) => {
            let config = settings.tracking_config()?;
            let sink = Arc::new(LogNotificationSink::stdout());
            let stats = run_track(&file, config, args, tokio::io::stdin(), sink).await?;
            tracing::info!(
                "Processed {} updates ({} rejected): {} notifications shown, {} canceled, {} sink failures",
                stats.updates_processed,
                stats.updates_rejected,
                stats.notifications_shown,
                stats.notifications_canceled,
                stats.sink_failures
            );
            Ok(())
        }
    }
}

pub fn run_markers(
    file: &MarkerFile,
    command: &MarkerCommand,
    out: &mut impl Write,
) -> Result<(), AppError> {
    let store = file.load()?;

    match command {
        MarkerCommand::List => {
            for marker in store.list() {
                writeln!(
                    out,
                    "{}\t{:.6}\t{:.6}\t{}",
                    marker.id,
                    marker.position.latitude(),
                    marker.position.longitude(),
                    marker.title.as_deref().unwrap_or("-")
                )?;
            }
        }
        MarkerCommand::Add {
            latitude,
            longitude,
            title,
        } => {
            let id = match title {
                Some(title) => store.add_marker_with_title(*latitude, *longitude, title.clone())?,
                None => store.add_marker(*latitude, *longitude)?,
            };
            file.save(&store)?;
            writeln!(out, "{}", id)?;
        }
        MarkerCommand::Delete { id } => {
            let photos = store.marker_images(*id).len();
            store.delete_marker(*id)?;
            file.save(&store)?;
            writeln!(out, "Deleted marker {} ({} photos)", id, photos)?;
        }
        MarkerCommand::Title { id, title } => {
            let title = Some(title.trim())
                .filter(|title| !title.is_empty())
                .map(str::to_string);
            store.set_title(*id, title)?;
            file.save(&store)?;
        }
    }
    Ok(())
}

pub fn run_images(
    file: &MarkerFile,
    command: &ImageCommand,
    out: &mut impl Write,
) -> Result<(), AppError> {
    let store = file.load()?;

    match command {
        ImageCommand::List { marker } => {
            if store.get_marker(*marker).is_none() {
                return Err(ProximityError::MarkerNotFound(*marker).into());
            }
            for image in store.marker_images(*marker) {
                writeln!(out, "{}\t{}", image.id, image.uri)?;
            }
        }
        ImageCommand::Add { marker, uri } => {
            let id = store.add_image(*marker, uri.clone())?;
            file.save(&store)?;
            writeln!(out, "{}", id)?;
        }
        ImageCommand::Delete { id } => {
            store.delete_image(*id)?;
            file.save(&store)?;
        }
    }
    Ok(())
}

/// Track either a GPX replay or `lat,lon` lines from `input` until the stream ends
/// or Ctrl-C is pressed
///
/// The marker file is read again on every update, so markers added or deleted by other
/// invocations are seen while tracking runs.
pub async fn run_track<R: AsyncRead + Unpin>(
    file: &MarkerFile,
    config: TrackingConfig,
    args: &TrackArgs,
    input: R,
    sink: Arc<dyn NotificationSink>,
) -> Result<TrackingStats, AppError> {
    let store = Arc::new(WatchedMarkerFile::open(file.clone())?);
    tracing::info!(
        "Tracking {} markers from {}",
        store.list().len(),
        store.path().display()
    );
    let mut session = TrackingSession::new(config);

    match &args.gpx {
        Some(path) => {
            let replay = TrackReplay::from_file(path)?.with_speed(args.speed);
            tracing::info!(
                "Replaying {} ({} points, {:.0} m)",
                path.display(),
                replay.total_points(),
                replay.total_distance()
            );
            session.start(&replay, store, sink).await?;
            tokio::select! {
                _ = session.run_to_completion() => {}
                _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
            }
        }
        None => {
            let source = ChannelLocationSource::new();
            session.start(&source, store, sink).await?;
            let fed = tokio::select! {
                fed = feed_lines(&source, input) => fed,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted");
                    Ok(0)
                }
            };
            if let Err(e) = fed {
                session.stop().await;
                return Err(e);
            }
        }
    }

    session.stop().await;
    Ok(session.stats().await)
}

/// Push every parseable line of `input` into `source`
async fn feed_lines<R: AsyncRead + Unpin>(
    source: &ChannelLocationSource,
    input: R,
) -> Result<usize, AppError> {
    let mut lines = BufReader::new(input).lines();
    let mut pushed = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_location(line) {
            Ok(location) => {
                source.push(location).await?;
                pushed += 1;
            }
            Err(e) => tracing::warn!("Skipping input line: {}", e),
        }
    }
    tracing::debug!("Input ended after {} locations", pushed);
    Ok(pushed)
}

/// Parse a `lat,lon` pair in decimal degrees
pub fn parse_location(line: &str) -> Result<Coordinate, AppError> {
    let parse_error = || AppError::Parse(line.to_string());
    let (lat, lon) = line.split_once(',').ok_or_else(parse_error)?;
    let lat: f64 = lat.trim().parse().map_err(|_| parse_error())?;
    let lon: f64 = lon.trim().parse().map_err(|_| parse_error())?;
    Ok(Coordinate::new(lat, lon)?)
}

/*!
Logging and profiling setup for the command line host.

Two implementations share one API:

- real: compiled when `feature = "profiling"` is set. Adds a tracing-chrome
  layer when `ENABLE_PROFILING` is present in the environment; the returned
  guard flushes the `trace-*.json` file when dropped.
- stub: plain formatted logging to stderr.

Logs always go to stderr so command output on stdout stays machine readable.
*/

/// Filter used when `RUST_LOG` is not set
fn default_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

#[cfg(feature = "profiling")]
mod inner {
    use tracing_chrome::{ChromeLayerBuilder, FlushGuard};
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    /// Keeps the trace file open until dropped
    pub struct LoggingGuard {
        _flush: Option<FlushGuard>,
    }

    pub fn setup_logging() -> LoggingGuard {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(super::default_filter()));
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(filter);

        if std::env::var("ENABLE_PROFILING").is_ok() {
            let (chrome_layer, guard) = ChromeLayerBuilder::new().build();
            tracing_subscriber::registry()
                .with(chrome_layer)
                .with(fmt_layer)
                .init();
            tracing::info!("ENABLE_PROFILING set - recording chrome trace");
            LoggingGuard {
                _flush: Some(guard),
            }
        } else {
            tracing_subscriber::registry().with(fmt_layer).init();
            tracing::debug!("Logging initialized (set ENABLE_PROFILING to record a trace)");
            LoggingGuard { _flush: None }
        }
    }
}

#[cfg(not(feature = "profiling"))]
mod inner {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    pub struct LoggingGuard;

    pub fn setup_logging() -> LoggingGuard {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(super::default_filter()));
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(filter);
        tracing_subscriber::registry().with(fmt_layer).init();

        tracing::debug!("Logging initialized (profiling disabled in this build)");
        LoggingGuard
    }
}

pub use inner::{LoggingGuard, setup_logging};

//! Terminal notification sink

use nearby_markers_lib::{MarkerId, NotificationSink, SinkError};
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Mutex;

/// Prints notifications as lines and remembers which ones are visible
///
/// Output format, one line per call:
/// `show <key>\t<title>\t<body>`, `cancel <key>` and `cancel-all`.
pub struct LogNotificationSink<W: Write + Send> {
    inner: Mutex<SinkInner<W>>,
}

struct SinkInner<W> {
    out: W,
    visible: BTreeSet<MarkerId>,
}

impl LogNotificationSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> LogNotificationSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            inner: Mutex::new(SinkInner {
                out,
                visible: BTreeSet::new(),
            }),
        }
    }

    /// Keys of the notifications currently shown
    pub fn visible(&self) -> Vec<MarkerId> {
        match self.inner.lock() {
            Ok(inner) => inner.visible.iter().copied().collect(),
            Err(poisoned) => poisoned.into_inner().visible.iter().copied().collect(),
        }
    }

    fn with_inner<T>(
        &self,
        f: impl FnOnce(&mut SinkInner<W>) -> std::io::Result<T>,
    ) -> Result<T, SinkError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| SinkError::Backend(format!("mutex poisoned: {:?}", e)))?;
        f(&mut *guard).map_err(|e| SinkError::Backend(e.to_string()))
    }

    #[cfg(test)]
    fn into_output(self) -> W {
        match self.inner.into_inner() {
            Ok(inner) => inner.out,
            Err(poisoned) => poisoned.into_inner().out,
        }
    }
}

impl<W: Write + Send> NotificationSink for LogNotificationSink<W> {
    fn show(&self, key: MarkerId, title: &str, body: &str) -> Result<(), SinkError> {
        tracing::info!("Notify marker {}: {}", key, body);
        self.with_inner(|inner| {
            inner.visible.insert(key);
            writeln!(inner.out, "show {}\t{}\t{}", key, title, body)?;
            inner.out.flush()
        })
    }

    fn cancel(&self, key: MarkerId) -> Result<(), SinkError> {
        self.with_inner(|inner| {
            if inner.visible.remove(&key) {
                writeln!(inner.out, "cancel {}", key)?;
                inner.out.flush()?;
            }
            Ok(())
        })
    }

    fn cancel_all(&self) -> Result<(), SinkError> {
        self.with_inner(|inner| {
            if !inner.visible.is_empty() {
                inner.visible.clear();
                writeln!(inner.out, "cancel-all")?;
                inner.out.flush()?;
            }
            Ok(())
        })
    }
}

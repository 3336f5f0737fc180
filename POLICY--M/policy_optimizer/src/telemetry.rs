use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use tokio::runtime::{Builder, Handle, Runtime};

/// Telemetry builder for the policy optimizer.
pub struct PolicyTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    sinks: Vec<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl PolicyTelemetryBuilder {
    /// Creates a new builder scoped to a module label.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            sinks: Vec::new(),
            event_publisher: None,
        }
    }

    /// Writes JSON lines to `path`.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Minimum level for the file log.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Adds an extra sink, e.g. a [`shared_logging::MemoryLogSink`].
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds telemetry; fails only when the log file cannot be opened.
    pub fn build(self) -> Result<PolicyTelemetry> {
        let mut sinks = self.sinks;
        if let Some(path) = self.log_path {
            sinks.push(Arc::new(JsonLogger::with_min_level(path, self.min_level)?));
        }
        Ok(PolicyTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                sinks,
                event: self.event_publisher.map(|publisher| EventHandle {
                    publisher,
                    fallback: OnceCell::new(),
                }),
            }),
        })
    }
}

/// Telemetry handle shared by the optimizer runtime. Cheap to clone.
#[derive(Clone)]
pub struct PolicyTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for PolicyTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyTelemetry")
            .field("module", &self.inner.module)
            .field("sinks", &self.inner.sinks.len())
            .field("events", &self.inner.event.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    sinks: Vec<Arc<dyn LogSink>>,
    event: Option<EventHandle>,
}

/// Publishes onto the caller's tokio runtime when there is one; otherwise blocks
/// on a current-thread runtime built on first use and kept for later events.
struct EventHandle {
    publisher: Arc<dyn EventPublisher>,
    fallback: OnceCell<Runtime>,
}

impl EventHandle {
    fn publish(&self, record: EventRecord) -> Result<()> {
        if let Ok(handle) = Handle::try_current() {
            let publisher = Arc::clone(&self.publisher);
            handle.spawn(async move {
                let _ = publisher.publish(record).await;
            });
            return Ok(());
        }
        let runtime = self
            .fallback
            .get_or_try_init(|| Builder::new_current_thread().enable_all().build())?;
        runtime.block_on(self.publisher.publish(record))
    }
}

impl PolicyTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> PolicyTelemetryBuilder {
        PolicyTelemetryBuilder::new(module)
    }

    /// Module label stamped on records and events.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Logs a message with JSON metadata to every sink.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if self.inner.sinks.is_empty() {
            return Ok(());
        }
        let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
        for sink in &self.inner.sinks {
            sink.write(&record)?;
        }
        Ok(())
    }

    /// Emits an event when a publisher is configured.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.event {
            handle.publish(EventRecord::new(&self.inner.module, event_type, payload))?;
        }
        Ok(())
    }
}

//! Observability events
//!
//! The pipeline reports lifecycle observations through a [`TelemetrySink`].
//! Emission is fire-and-forget: sinks must not block and cannot fail the
//! pipeline.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

/// Fixed vocabulary of event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A `generate` call was entered
    GenerateStart,
    /// A `generate` call finished (successfully or not)
    GenerateStop,
    /// A `generate` call failed with a normalized error
    GenerateError,
    /// A `generate` call hit a fault
    GenerateException,
    /// A vendor HTTP round trip completed
    HttpRequest,
    /// The retry engine is about to sleep before another attempt
    RetryAttempt,
    /// Text was split into more than one chunk
    TextSplit,
}

impl EventName {
    /// Dotted event name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateStart => "generate.start",
            Self::GenerateStop => "generate.stop",
            Self::GenerateError => "generate.error",
            Self::GenerateException => "generate.exception",
            Self::HttpRequest => "http.request",
            Self::RetryAttempt => "retry.attempt",
            Self::TextSplit => "text.split",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation: a name, numeric measurements, and descriptive metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    /// Event name
    pub name: EventName,
    /// Numeric measurements (durations, sizes, counts)
    pub measurements: Map<String, Value>,
    /// Descriptive metadata (provider, error snapshot, flags)
    pub metadata: Map<String, Value>,
}

impl TelemetryEvent {
    /// Create an empty event
    #[must_use]
    pub fn new(name: EventName) -> Self {
        Self {
            name,
            measurements: Map::new(),
            metadata: Map::new(),
        }
    }

    /// Add a measurement
    #[must_use]
    pub fn measurement(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.measurements.insert(key.to_string(), value.into());
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Read a measurement as an unsigned integer
    #[must_use]
    pub fn measurement_u64(&self, key: &str) -> Option<u64> {
        self.measurements.get(key).and_then(Value::as_u64)
    }

    /// Read a metadata entry as a string
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Destination for telemetry events
pub trait TelemetrySink: Send + Sync + fmt::Debug {
    /// Record an event
    fn emit(&self, event: &TelemetryEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn emit(&self, _event: &TelemetryEvent) {}
}

/// Logs every event through `tracing` at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: &TelemetryEvent) {
        // Bound outside the macro, which has its own `Value` in scope
        let measurements = Value::Object(event.measurements.clone());
        let metadata = Value::Object(event.metadata.clone());
        debug!(
            event = event.name.as_str(),
            measurements = %measurements,
            metadata = %metadata,
            "telemetry"
        );
    }
}

/// Forwards events to the `metrics` facade
///
/// Every event increments `tts_events_total{event}`. Stop events also record
/// `tts_generate_duration_ms{provider,success}`, and retry attempts record
/// `tts_retry_delay_ms`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSink;

impl TelemetrySink for MetricsSink {
    #[allow(clippy::cast_precision_loss)]
    fn emit(&self, event: &TelemetryEvent) {
        metrics::counter!("tts_events_total", "event" => event.name.as_str()).increment(1);

        match event.name {
            EventName::GenerateStop => {
                let provider = event.meta_str("provider").unwrap_or("unknown").to_string();
                let success = event
                    .metadata
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if let Some(duration) = event.measurement_u64("duration_ms") {
                    metrics::histogram!(
                        "tts_generate_duration_ms",
                        "provider" => provider,
                        "success" => if success { "true" } else { "false" }
                    )
                    .record(duration as f64);
                }
            },
            EventName::RetryAttempt => {
                if let Some(delay) = event.measurement_u64("delay_ms") {
                    metrics::histogram!("tts_retry_delay_ms").record(delay as f64);
                }
            },
            _ => {},
        }
    }
}

/// Keeps events in memory for later inspection
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Recorded events with the given name
    #[must_use]
    pub fn named(&self, name: EventName) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.name == name)
            .cloned()
            .collect()
    }

    /// Names of all recorded events, in order
    #[must_use]
    pub fn names(&self) -> Vec<EventName> {
        self.events.lock().iter().map(|event| event.name).collect()
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TelemetrySink for RecordingSink {
    fn emit(&self, event: &TelemetryEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Sends each event to several sinks
#[derive(Debug, Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    /// Create a fan-out over the given sinks
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for FanoutSink {
    fn emit(&self, event: &TelemetryEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

//! Telemetry: best-effort JSON records on the message bus.
//!
//! # Topics
//!
//! Every topic hangs off one configurable prefix, e.g. `home/hsb2/ir-bridge`:
//!
//! | Topic               | Payload                                   | Retained |
//! |---------------------|-------------------------------------------|----------|
//! | `<prefix>/debug`    | `{timestamp, level, message}`             | no       |
//! | `<prefix>/event`    | one record per dispatched key press       | no       |
//! | `<prefix>/status`   | [`BridgeStats`] snapshot                  | yes      |
//! | `<prefix>/toggle`   | `{timestamp, name, key}` side-effect call | no       |
//! | `<prefix>/control`  | inbound: `status` or `restart`            | n/a      |
//!
//! # Failure model
//!
//! Publishing never blocks the event path and never fails it: the sink is a
//! non-blocking enqueue, and every error it returns is logged at debug level
//! and dropped.  Side-effect requests are the one exception, since for them
//! the bus *is* the effector; [`TelemetryPublisher::publish_toggle`] reports
//! its error so the executor can count it.

use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use keybridge_core::{Action, BridgeStats, BridgeStatus, KeyId};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Error type for telemetry sinks.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The bus client rejected the record (disconnected, queue full).
    #[error("telemetry bus unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode telemetry payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Severity carried in debug records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Destination for encoded telemetry records.
///
/// Implementations must return promptly: `publish` is called inline on the
/// dispatch path.
pub trait TelemetrySink: Send + Sync {
    /// Enqueues one record.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Unavailable`] when the record cannot be
    /// enqueued.
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), TelemetryError>;

    /// Requests a clean disconnect.  Default is a no-op.
    fn close(&self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Sink used when telemetry is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn publish(&self, _topic: &str, _payload: Vec<u8>, _retain: bool) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// One record captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRecord {
    pub topic: String,
    pub payload: serde_json::Value,
    pub retain: bool,
}

/// In-process sink that keeps every record, for tests and local debugging.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<CapturedRecord>>,
    offline: Mutex<bool>,
    closed: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, `publish` fails and nothing is captured.
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().expect("lock poisoned") = offline;
    }

    pub fn records(&self) -> Vec<CapturedRecord> {
        self.records.lock().expect("lock poisoned").clone()
    }

    /// Payloads published on `topic`, oldest first.
    pub fn payloads_on(&self, topic: &str) -> Vec<serde_json::Value> {
        self.records
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|r| r.topic == topic)
            .map(|r| r.payload.clone())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().expect("lock poisoned")
    }
}

impl TelemetrySink for MemorySink {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), TelemetryError> {
        if *self.offline.lock().expect("lock poisoned") {
            return Err(TelemetryError::Unavailable("memory sink offline".to_string()));
        }
        let payload = serde_json::from_slice(&payload)?;
        self.records.lock().expect("lock poisoned").push(CapturedRecord {
            topic: topic.to_string(),
            payload,
            retain,
        });
        Ok(())
    }

    fn close(&self) -> Result<(), TelemetryError> {
        *self.closed.lock().expect("lock poisoned") = true;
        Ok(())
    }
}

// ── Topics and control messages ───────────────────────────────────────────────

/// Topic names derived from the configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn debug(&self) -> String {
        format!("{}/debug", self.prefix)
    }

    pub fn event(&self) -> String {
        format!("{}/event", self.prefix)
    }

    pub fn status(&self) -> String {
        format!("{}/status", self.prefix)
    }

    pub fn toggle(&self) -> String {
        format!("{}/toggle", self.prefix)
    }

    pub fn control(&self) -> String {
        format!("{}/control", self.prefix)
    }
}

/// Requests accepted on the control topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Publish a status snapshot now.
    Status,
    /// Shut down gracefully; the service manager restarts the process.
    Restart,
}

impl ControlCommand {
    /// Parses a control payload.  Unknown payloads yield `None`.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?.trim();
        if text.eq_ignore_ascii_case("status") {
            Some(ControlCommand::Status)
        } else if text.eq_ignore_ascii_case("restart") {
            Some(ControlCommand::Restart)
        } else {
            None
        }
    }
}

/// Notifications from the bus adapter to the bridge's control task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    /// The bus (re)connected; the control subscription is in place.
    Connected,
    Control(ControlCommand),
}

// ── Stats registry ────────────────────────────────────────────────────────────

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Shared, lock-protected [`BridgeStats`].
#[derive(Debug)]
pub struct StatsRegistry {
    inner: Mutex<BridgeStats>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BridgeStats::new(now_rfc3339())),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut BridgeStats) -> R) -> R {
        // A poisoned lock only means a panic elsewhere mid-update; the
        // counters are still usable.
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn record_key(&self, key_name: &str) {
        self.with(|s| s.record_key(key_name));
    }

    pub fn record_command(&self, command: &str) {
        self.with(|s| s.record_command(command));
    }

    pub fn record_error(&self) {
        self.with(|s| s.record_error());
    }

    pub fn set_status(&self, status: BridgeStatus) {
        self.with(|s| s.status = status);
    }

    /// Returns a copy with `updated_at` refreshed.
    pub fn snapshot(&self) -> BridgeStats {
        self.with(|s| {
            s.updated_at = now_rfc3339();
            s.clone()
        })
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DebugRecord<'a> {
    timestamp: String,
    level: LogLevel,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    timestamp: String,
    key_name: String,
    key_code: u16,
    action: String,
    command: Option<&'a str>,
    success: bool,
    target: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ToggleRecord<'a> {
    timestamp: String,
    name: &'a str,
    key: String,
}

// ── Publisher ─────────────────────────────────────────────────────────────────

/// Formats and publishes telemetry records.  Cheap to share behind an `Arc`.
pub struct TelemetryPublisher {
    sink: Arc<dyn TelemetrySink>,
    topics: Topics,
    stats: Arc<StatsRegistry>,
    /// Outbound target (the TV host) reported in event records.
    target: Option<String>,
}

impl TelemetryPublisher {
    pub fn new(
        sink: Arc<dyn TelemetrySink>,
        topics: Topics,
        stats: Arc<StatsRegistry>,
        target: Option<String>,
    ) -> Self {
        Self {
            sink,
            topics,
            stats,
            target,
        }
    }

    /// A publisher that discards everything.
    pub fn disabled(stats: Arc<StatsRegistry>) -> Self {
        Self::new(Arc::new(NullSink), Topics::new("keybridge"), stats, None)
    }

    pub fn stats(&self) -> &Arc<StatsRegistry> {
        &self.stats
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Logs `message` locally and mirrors it to `<prefix>/debug`.
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!("{message}"),
            LogLevel::Info => info!("{message}"),
            LogLevel::Warning => warn!("{message}"),
            LogLevel::Error => error!("{message}"),
        }
        let record = DebugRecord {
            timestamp: now_rfc3339(),
            level,
            message,
        };
        self.best_effort(&self.topics.debug(), &record, false);
    }

    /// Publishes one record per dispatched key press.
    pub fn publish_event(&self, key_id: KeyId, action: &Action, command: Option<&str>, success: bool) {
        let record = EventRecord {
            timestamp: now_rfc3339(),
            key_name: key_id.name(),
            key_code: key_id.code(),
            action: action.label(),
            command,
            success,
            target: self.target.as_deref(),
        };
        self.best_effort(&self.topics.event(), &record, false);
    }

    /// Publishes the retained status snapshot.
    pub fn publish_status(&self) {
        let snapshot = self.stats.snapshot();
        self.best_effort(&self.topics.status(), &snapshot, true);
        debug!(status = ?snapshot.status, "status published");
    }

    /// Asks an external subscriber to perform side effect `name`.
    ///
    /// # Errors
    ///
    /// Returns the sink's error; unlike the other records this one is an
    /// effect, not just an observation.
    pub fn publish_toggle(&self, name: &str, key_id: KeyId) -> Result<(), TelemetryError> {
        let record = ToggleRecord {
            timestamp: now_rfc3339(),
            name,
            key: key_id.name(),
        };
        self.send(&self.topics.toggle(), &record, false)
    }

    /// Disconnects the underlying sink.
    pub fn close(&self) {
        if let Err(e) = self.sink.close() {
            debug!("telemetry close failed: {e}");
        }
    }

    fn send<T: Serialize>(&self, topic: &str, record: &T, retain: bool) -> Result<(), TelemetryError> {
        let payload = serde_json::to_vec(record)?;
        self.sink.publish(topic, payload, retain)
    }

    fn best_effort<T: Serialize>(&self, topic: &str, record: &T, retain: bool) {
        if let Err(e) = self.send(topic, record, retain) {
            debug!("telemetry record on {topic} dropped: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher() -> (Arc<MemorySink>, TelemetryPublisher) {
        let sink = Arc::new(MemorySink::new());
        let publisher = TelemetryPublisher::new(
            sink.clone(),
            Topics::new("home/hsb2/ir-bridge/"),
            Arc::new(StatsRegistry::new()),
            Some("192.168.1.137".to_string()),
        );
        (sink, publisher)
    }

    #[test]
    fn test_topics_strip_trailing_slash() {
        let topics = Topics::new("home/test/");
        assert_eq!(topics.status(), "home/test/status");
        assert_eq!(topics.control(), "home/test/control");
    }

    #[test]
    fn test_control_command_parse() {
        assert_eq!(ControlCommand::parse(b"status"), Some(ControlCommand::Status));
        assert_eq!(ControlCommand::parse(b" RESTART\n"), Some(ControlCommand::Restart));
        assert_eq!(ControlCommand::parse(b"reboot"), None);
        assert_eq!(ControlCommand::parse(&[0xff, 0xfe]), None);
    }

    #[test]
    fn test_log_publishes_debug_record() {
        // Arrange
        let (sink, publisher) = publisher();

        // Act
        publisher.log(LogLevel::Warning, "device lost");

        // Assert
        let records = sink.payloads_on("home/hsb2/ir-bridge/debug");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["level"], "warning");
        assert_eq!(records[0]["message"], "device lost");
        assert!(records[0]["timestamp"].is_string());
    }

    #[test]
    fn test_publish_event_carries_key_and_command() {
        let (sink, publisher) = publisher();

        publisher.publish_event(
            KeyId::from_code(115),
            &Action::SendCommand("volumeup".into()),
            Some("volumeup"),
            true,
        );

        let events = sink.payloads_on("home/hsb2/ir-bridge/event");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["key_name"], "VOLUMEUP");
        assert_eq!(events[0]["key_code"], 115);
        assert_eq!(events[0]["action"], "command:volumeup");
        assert_eq!(events[0]["command"], "volumeup");
        assert_eq!(events[0]["success"], true);
        assert_eq!(events[0]["target"], "192.168.1.137");
    }

    #[test]
    fn test_publish_status_is_retained_snapshot() {
        let (sink, publisher) = publisher();
        publisher.stats().record_key("MUTE");
        publisher.stats().set_status(BridgeStatus::Running);

        publisher.publish_status();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].retain);
        assert_eq!(records[0].payload["status"], "running");
        assert_eq!(records[0].payload["keys_pressed"], 1);
    }

    #[test]
    fn test_offline_sink_never_fails_observations() {
        let (sink, publisher) = publisher();
        sink.set_offline(true);

        publisher.log(LogLevel::Info, "hello");
        publisher.publish_status();

        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_offline_sink_fails_toggle() {
        let (sink, publisher) = publisher();
        sink.set_offline(true);

        let result = publisher.publish_toggle("lights", KeyId::from_code(38));

        assert!(matches!(result, Err(TelemetryError::Unavailable(_))));
    }

    #[test]
    fn test_toggle_record_names_side_effect_and_key() {
        let (sink, publisher) = publisher();

        publisher.publish_toggle("lights", KeyId::from_code(38)).unwrap();

        let toggles = sink.payloads_on("home/hsb2/ir-bridge/toggle");
        assert_eq!(toggles[0]["name"], "lights");
        assert_eq!(toggles[0]["key"], "L");
    }

    #[test]
    fn test_snapshot_refreshes_updated_at_only() {
        let stats = StatsRegistry::new();
        let first = stats.snapshot();
        let second = stats.snapshot();
        assert_eq!(first.started_at, second.started_at);
        assert!(second.updated_at >= first.updated_at);
    }
}

//! Dispatcher: the per-event pipeline.
//!
//! ```text
//! KeyEvent ─▶ resolve ─▶ stop key? ──yes──▶ stop all playback (never debounced)
//!                          │no
//!                          ▼
//!                     debounce gate ──reject──▶ drop
//!                          │accept
//!                          ▼
//!                     NoOp? ──yes──▶ drop
//!                          │no
//!                          ▼
//!                     execute ─▶ stats + event telemetry
//! ```
//!
//! Each event is processed to completion before the next one is read.  A
//! failure is confined to its own event: it is logged, counted, and
//! reported, and the next event is processed normally.

use std::sync::Arc;

use keybridge_core::{Action, ActionTable, DebounceConfig, DebounceGate, KeyEvent};
use tracing::debug;

use super::executor::{ActionExecutor, ExecOutcome};
use super::telemetry::{LogLevel, TelemetryPublisher};

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Rejected by the debounce gate.
    Debounced,
    /// Accepted, but the key maps to nothing.
    Ignored,
    Executed(ExecOutcome),
    /// Accepted, but the action failed.
    Failed,
}

/// Owns the debounce state, the action table and the executor.
pub struct Dispatcher {
    table: ActionTable,
    gate: DebounceGate,
    executor: ActionExecutor,
    telemetry: Arc<TelemetryPublisher>,
}

impl Dispatcher {
    pub fn new(
        table: ActionTable,
        debounce: DebounceConfig,
        executor: ActionExecutor,
        telemetry: Arc<TelemetryPublisher>,
    ) -> Self {
        Self {
            table,
            gate: DebounceGate::new(debounce),
            executor,
            telemetry,
        }
    }

    pub fn table(&self) -> &ActionTable {
        &self.table
    }

    /// Stops all playback, e.g. when the device goes away.
    pub fn stop_all(&mut self) -> usize {
        self.executor.stop_all()
    }

    /// Runs one key-down through the pipeline.
    pub async fn dispatch(&mut self, event: KeyEvent) -> DispatchOutcome {
        let key_id = event.key_id;
        let action = self.table.resolve(key_id);

        if action.is_stop() {
            let stopped = self.executor.stop_all();
            self.telemetry.log(
                LogLevel::Info,
                &format!("{key_id} pressed - stopped {stopped} sound(s)"),
            );
            return DispatchOutcome::Executed(ExecOutcome::Stopped(stopped));
        }

        if !self.gate.accept(key_id, event.observed_at) {
            debug!("key {key_id} debounced");
            return DispatchOutcome::Debounced;
        }

        if matches!(action, Action::NoOp) {
            debug!("key {key_id} (code {}) has no action", key_id.code());
            return DispatchOutcome::Ignored;
        }

        let stats = self.telemetry.stats();
        stats.record_key(&key_id.name());
        self.telemetry.log(
            LogLevel::Info,
            &format!("Key pressed: {key_id} -> {}", action.label()),
        );

        match self.executor.execute(&action, key_id).await {
            Ok(outcome) => {
                match &outcome {
                    ExecOutcome::Sent(command) => {
                        stats.record_command(command);
                        self.telemetry
                            .publish_event(key_id, &action, Some(command), true);
                    }
                    ExecOutcome::Played(path) => {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        self.telemetry
                            .log(LogLevel::Info, &format!("Playing: {name}"));
                        self.telemetry.publish_event(key_id, &action, None, true);
                    }
                    ExecOutcome::SideEffect(_) => {
                        self.telemetry.publish_event(key_id, &action, None, true);
                    }
                    ExecOutcome::Stopped(_) | ExecOutcome::Nothing => {}
                }
                DispatchOutcome::Executed(outcome)
            }
            Err(e) => {
                stats.record_error();
                self.telemetry
                    .log(LogLevel::Error, &format!("{key_id}: {e}"));
                let command = match &action {
                    Action::SendCommand(id) => Some(id.as_str()),
                    _ => None,
                };
                self.telemetry.publish_event(key_id, &action, command, false);
                DispatchOutcome::Failed
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Connection supervisor: keeps the input device attached.
//!
//! # State machine
//!
//! ```text
//!            ┌──────────── not found / open failed (wait poll interval) ─┐
//!            ▼                                                           │
//!   ──▶ SEARCHING ──found──▶ OPEN ──opened──▶ STREAMING ──ended/error────┤
//!            │                 │                  │     (stop playback,  │
//!            │                 │                  │      warn, re-search │
//!            │                 │                  │      immediately)    │
//!            └─────────────────┴──── shutdown ────┴──────────▶ STOPPED ◀─┘
//! ```
//!
//! Shutdown is observed in every state, including while waiting out the
//! poll interval and while blocked on a device read.  An event already being
//! dispatched is allowed to finish first.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use super::dispatch::Dispatcher;
use super::telemetry::{LogLevel, TelemetryPublisher};
use crate::infrastructure::input_capture::{DeviceProvider, DeviceSpec, EventSource, InputError};

/// Default wait between device searches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Where the supervisor is in the device lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Searching,
    Open,
    Streaming,
    Stopped,
}

// ── Shutdown signalling ───────────────────────────────────────────────────────

/// Sending half of the shutdown signal.  Cloneable; triggering is idempotent.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Arc<watch::Sender<bool>>,
}

/// Receiving half of the shutdown signal, one per task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Creates a linked trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx: Arc::new(tx) }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered.  Dropping every trigger counts
    /// as a shutdown as well.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

// ── Supervisor ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub device: DeviceSpec,
    pub poll_interval: Duration,
}

/// Why a streaming session ended.
enum StreamEnd {
    Shutdown,
    Eof,
    Lost(InputError),
}

/// Drives the device lifecycle and feeds events to the [`Dispatcher`].
pub struct Supervisor {
    config: SupervisorConfig,
    provider: Arc<dyn DeviceProvider>,
    dispatcher: Dispatcher,
    telemetry: Arc<TelemetryPublisher>,
    state_tx: watch::Sender<SupervisorState>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        provider: Arc<dyn DeviceProvider>,
        dispatcher: Dispatcher,
        telemetry: Arc<TelemetryPublisher>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Searching);
        Self {
            config,
            provider,
            dispatcher,
            telemetry,
            state_tx,
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state_tx.borrow()
    }

    /// Live view of state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// Runs until `shutdown` fires, then stops all playback and returns in
    /// [`SupervisorState::Stopped`].
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) {
        let mut reported_missing = false;

        while !shutdown.is_triggered() {
            // SEARCHING
            self.set_state(SupervisorState::Searching);
            let located = tokio::select! {
                _ = shutdown.wait() => break,
                located = self.provider.locate(&self.config.device) => located,
            };
            let path = match located {
                Ok(path) => path,
                Err(e) => {
                    if reported_missing {
                        debug!("{e}");
                    } else {
                        self.telemetry.log(
                            LogLevel::Warning,
                            &format!(
                                "{e}; retrying every {}ms",
                                self.config.poll_interval.as_millis()
                            ),
                        );
                        reported_missing = true;
                    }
                    if pause(self.config.poll_interval, &mut shutdown).await {
                        continue;
                    }
                    break;
                }
            };

            // OPEN
            self.set_state(SupervisorState::Open);
            let opened = tokio::select! {
                _ = shutdown.wait() => break,
                opened = self.provider.open(&path) => opened,
            };
            let source = match opened {
                Ok(source) => source,
                Err(e) => {
                    self.telemetry.log(LogLevel::Warning, &e.to_string());
                    if pause(self.config.poll_interval, &mut shutdown).await {
                        continue;
                    }
                    break;
                }
            };

            // STREAMING
            reported_missing = false;
            self.set_state(SupervisorState::Streaming);
            self.telemetry.log(
                LogLevel::Info,
                &format!("Opened device: {} ({})", source.device_name(), path.display()),
            );

            match self.stream(source, &mut shutdown).await {
                StreamEnd::Shutdown => break,
                StreamEnd::Eof => {
                    self.dispatcher.stop_all();
                    self.telemetry.log(
                        LogLevel::Warning,
                        "Input device closed; searching again",
                    );
                }
                StreamEnd::Lost(e) => {
                    self.dispatcher.stop_all();
                    self.telemetry.stats().record_error();
                    self.telemetry.log(
                        LogLevel::Warning,
                        &format!("Input device lost ({e}); searching again"),
                    );
                }
            }
        }

        let stopped = self.dispatcher.stop_all();
        self.set_state(SupervisorState::Stopped);
        info!("supervisor stopped ({stopped} playback(s) terminated)");
    }

    async fn stream(&mut self, mut source: Box<dyn EventSource>, shutdown: &mut ShutdownSignal) -> StreamEnd {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.wait() => return StreamEnd::Shutdown,
                next = source.next_event() => next,
            };

            match next {
                Ok(Some(raw)) => {
                    let observed_at = tokio::time::Instant::now().into_std();
                    if let Some(event) = raw.to_key_event(observed_at) {
                        self.dispatcher.dispatch(event).await;
                    }
                }
                Ok(None) => return StreamEnd::Eof,
                Err(e) => return StreamEnd::Lost(e),
            }
        }
    }

    fn set_state(&self, state: SupervisorState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("supervisor: {previous:?} -> {state:?}");
        }
    }
}

/// Waits one poll interval.  Returns `false` if shutdown fired instead.
async fn pause(interval: Duration, shutdown: &mut ShutdownSignal) -> bool {
    tokio::select! {
        _ = shutdown.wait() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Bridge: top-level assembly of the running service.
//!
//! Owns three concurrent activities and the shutdown sequence:
//!
//! - the [`Supervisor`], which reads the device and dispatches events;
//! - a status task, which republishes the stats snapshot every interval;
//! - a control task, which reacts to bus events (`Connected`, and the
//!   `status` / `restart` control requests).
//!
//! On shutdown (signal, or `restart` on the control topic) every task
//! observes the same [`ShutdownSignal`].  Playback is stopped, the final
//! `stopped` status is published, and the bus is disconnected.

use std::sync::Arc;
use std::time::Duration;

use keybridge_core::BridgeStatus;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::supervisor::{ShutdownSignal, ShutdownTrigger, Supervisor};
use super::telemetry::{BusEvent, ControlCommand, LogLevel, TelemetryPublisher};

/// Default status republish interval.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(60);

pub struct Bridge {
    supervisor: Supervisor,
    telemetry: Arc<TelemetryPublisher>,
    status_interval: Duration,
    bus_events: mpsc::Receiver<BusEvent>,
    shutdown: ShutdownTrigger,
}

impl Bridge {
    pub fn new(
        supervisor: Supervisor,
        telemetry: Arc<TelemetryPublisher>,
        status_interval: Duration,
        bus_events: mpsc::Receiver<BusEvent>,
        shutdown: ShutdownTrigger,
    ) -> Self {
        Self {
            supervisor,
            telemetry,
            status_interval,
            bus_events,
            shutdown,
        }
    }

    /// Runs until shutdown and performs the stop sequence.  Returns the
    /// supervisor so callers can inspect its final state.
    pub async fn run(self) -> Supervisor {
        let Bridge {
            mut supervisor,
            telemetry,
            status_interval,
            bus_events,
            shutdown,
        } = self;

        telemetry.stats().set_status(BridgeStatus::Running);
        telemetry.log(LogLevel::Info, "keybridge started");
        telemetry.publish_status();

        let status_task = spawn_status_task(
            Arc::clone(&telemetry),
            status_interval,
            shutdown.subscribe(),
        );
        let control_task = spawn_control_task(
            Arc::clone(&telemetry),
            bus_events,
            shutdown.clone(),
        );

        supervisor.run(shutdown.subscribe()).await;

        // The supervisor only returns on shutdown; make sure the helpers see it.
        shutdown.trigger();
        for task in [status_task, control_task] {
            if let Err(e) = task.await {
                debug!("bridge task ended abnormally: {e}");
            }
        }

        telemetry.stats().set_status(BridgeStatus::Stopped);
        telemetry.log(LogLevel::Info, "keybridge stopped");
        telemetry.publish_status();
        telemetry.close();

        supervisor
    }
}

fn spawn_status_task(
    telemetry: Arc<TelemetryPublisher>,
    period: Duration,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes at once; the startup status is already out.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => telemetry.publish_status(),
            }
        }
    })
}

fn spawn_control_task(
    telemetry: Arc<TelemetryPublisher>,
    mut bus_events: mpsc::Receiver<BusEvent>,
    trigger: ShutdownTrigger,
) -> JoinHandle<()> {
    let mut shutdown = trigger.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.wait() => break,
                event = bus_events.recv() => event,
            };

            match event {
                Some(BusEvent::Connected) => {
                    info!("telemetry bus connected");
                    telemetry.publish_status();
                }
                Some(BusEvent::Control(ControlCommand::Status)) => {
                    debug!("status requested on control topic");
                    telemetry.publish_status();
                }
                Some(BusEvent::Control(ControlCommand::Restart)) => {
                    telemetry.log(LogLevel::Info, "Restart requested via control topic");
                    trigger.trigger();
                    break;
                }
                None => {
                    // Bus adapter gone (telemetry disabled); nothing more to read.
                    shutdown.wait().await;
                    break;
                }
            }
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

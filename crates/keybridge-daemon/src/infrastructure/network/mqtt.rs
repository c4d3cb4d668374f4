//! MQTT adapter for the telemetry bus (rumqttc).
//!
//! [`connect`] returns three things:
//!
//! - an [`MqttSink`], the non-blocking publishing half handed to the
//!   [`TelemetryPublisher`](crate::application::telemetry::TelemetryPublisher);
//! - a receiver of [`BusEvent`]s for the bridge's control task;
//! - the handle of the task that drives the rumqttc event loop.
//!
//! The event loop reconnects by itself on the next poll after an error; the
//! task only spaces the attempts out.  On every `ConnAck` it subscribes to the
//! control topic again and reports [`BusEvent::Connected`].
//!
//! The task ends once the DISCONNECT queued by [`MqttSink::close`] is written.
//! When the stop signal fires first, it keeps polling for up to
//! [`FLUSH_TIMEOUT`] so records queued during shutdown (the final `stopped`
//! status among them) still reach the broker.

use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::supervisor::ShutdownSignal;
use crate::application::telemetry::{
    BusEvent, ControlCommand, TelemetryError, TelemetrySink, Topics,
};

/// Requests buffered between the sink and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// Bus events buffered for the control task.
const BUS_EVENT_CAPACITY: usize = 16;

/// Wait before polling again after a connection error.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on delivering queued records after the stop signal.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    pub topics: Topics,
}

impl MqttConfig {
    fn options(&self) -> MqttOptions {
        let client_id = format!("keybridge-{}", uuid::Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, self.broker_host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        // Credentials only apply when both halves are present.
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            options.set_credentials(user.clone(), pass.clone());
        }
        options
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

/// Publishing half.  Every call is a non-blocking enqueue.
#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
}

impl TelemetrySink for MqttSink {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), TelemetryError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, retain, payload)
            .map_err(|e| TelemetryError::Unavailable(e.to_string()))
    }

    fn close(&self) -> Result<(), TelemetryError> {
        self.client
            .try_disconnect()
            .map_err(|e| TelemetryError::Unavailable(e.to_string()))
    }
}

// ── Event loop ────────────────────────────────────────────────────────────────

/// Creates the client and spawns the task that drives its event loop.
///
/// Never fails: the broker may be down at startup, in which case records are
/// dropped until the first successful connect.  `stop` bounds the task's
/// lifetime when the broker never acknowledges the disconnect.
pub fn connect(
    config: &MqttConfig,
    stop: ShutdownSignal,
) -> (MqttSink, mpsc::Receiver<BusEvent>, JoinHandle<()>) {
    let (client, eventloop) = AsyncClient::new(config.options(), REQUEST_CAPACITY);
    let (bus_tx, bus_rx) = mpsc::channel(BUS_EVENT_CAPACITY);

    info!(
        "telemetry bus: {}:{} (prefix {})",
        config.broker_host,
        config.port,
        config.topics.prefix()
    );

    let handle = tokio::spawn(drive(
        eventloop,
        client.clone(),
        config.topics.control(),
        bus_tx,
        stop,
    ));
    (MqttSink { client }, bus_rx, handle)
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    control_topic: String,
    bus_tx: mpsc::Sender<BusEvent>,
    mut stop: ShutdownSignal,
) {
    let mut connected = false;
    loop {
        let polled = tokio::select! {
            _ = stop.wait() => break,
            polled = eventloop.poll() => polled,
        };

        match polled {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent; event loop stopped");
                return;
            }
            Ok(event) => {
                if let Event::Incoming(Packet::Disconnect) = event {
                    connected = false;
                }
                let Some(bus_event) = classify(&event, &control_topic) else {
                    continue;
                };
                if bus_event == BusEvent::Connected {
                    connected = true;
                    info!("MQTT connected; subscribing to {control_topic}");
                    if let Err(e) = client.try_subscribe(control_topic.as_str(), QoS::AtMostOnce) {
                        warn!("MQTT subscribe failed: {e}");
                    }
                }
                if bus_tx.try_send(bus_event).is_err() {
                    debug!("bus event {bus_event:?} dropped; control task busy or gone");
                }
            }
            Err(e) => {
                if connected {
                    warn!("MQTT disconnected: {e}");
                    connected = false;
                } else {
                    debug!("MQTT connection attempt failed: {e}");
                }
                tokio::select! {
                    _ = stop.wait() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }

    flush(&mut eventloop).await;
}

/// Polls until the queued DISCONNECT is written, without waiting on a dead
/// broker for longer than [`FLUSH_TIMEOUT`].
async fn flush(eventloop: &mut EventLoop) {
    let drain = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(e),
            }
        }
    };
    match tokio::time::timeout(FLUSH_TIMEOUT, drain).await {
        Ok(Ok(())) => debug!("MQTT queue flushed; disconnect sent"),
        Ok(Err(e)) => debug!("MQTT flush interrupted: {e}"),
        Err(_) => debug!("MQTT flush gave up after {FLUSH_TIMEOUT:?}"),
    }
}

/// Maps an event-loop notification to what the bridge cares about.
fn classify(event: &Event, control_topic: &str) -> Option<BusEvent> {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
            Some(BusEvent::Connected)
        }
        Event::Incoming(Packet::ConnAck(ack)) => {
            warn!("MQTT broker refused connection: {:?}", ack.code);
            None
        }
        Event::Incoming(Packet::Publish(publish)) if publish.topic == control_topic => {
            let command = ControlCommand::parse(&publish.payload);
            if command.is_none() {
                debug!(
                    "ignoring unknown control payload {:?}",
                    String::from_utf8_lossy(&publish.payload)
                );
            }
            command.map(BusEvent::Control)
        }
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, Publish};

    const CONTROL: &str = "home/hsb2/ir-bridge/control";

    fn publish(topic: &str, payload: &str) -> Event {
        Event::Incoming(Packet::Publish(Publish::new(
            topic,
            QoS::AtMostOnce,
            payload.as_bytes().to_vec(),
        )))
    }

    fn config() -> MqttConfig {
        MqttConfig {
            broker_host: "localhost".to_string(),
            port: 1883,
            username: Some("user".to_string()),
            password: None,
            keep_alive: Duration::from_secs(60),
            topics: Topics::new("home/hsb2/ir-bridge"),
        }
    }

    #[test]
    fn test_successful_connack_is_connected() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)));
        assert_eq!(classify(&event, CONTROL), Some(BusEvent::Connected));
    }

    #[test]
    fn test_refused_connack_is_ignored() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::NotAuthorized,
            false,
        )));
        assert_eq!(classify(&event, CONTROL), None);
    }

    #[test]
    fn test_control_payloads_are_forwarded() {
        assert_eq!(
            classify(&publish(CONTROL, "status"), CONTROL),
            Some(BusEvent::Control(ControlCommand::Status))
        );
        assert_eq!(
            classify(&publish(CONTROL, "restart\n"), CONTROL),
            Some(BusEvent::Control(ControlCommand::Restart))
        );
    }

    #[test]
    fn test_unknown_payload_and_other_topics_are_ignored() {
        assert_eq!(classify(&publish(CONTROL, "reboot"), CONTROL), None);
        assert_eq!(classify(&publish("elsewhere/control", "status"), CONTROL), None);
        assert_eq!(classify(&Event::Incoming(Packet::PingResp), CONTROL), None);
    }

    #[test]
    fn test_client_id_is_unique_per_connection() {
        let config = config();
        let a = config.options();
        let b = config.options();
        assert!(a.client_id().starts_with("keybridge-"));
        assert_ne!(a.client_id(), b.client_id());
        assert_eq!(a.keep_alive(), Duration::from_secs(60));
        // Half a credential pair is not applied.
        assert!(a.credentials().is_none());
    }

    #[tokio::test]
    async fn test_sink_enqueues_without_a_broker() {
        // Arrange: nothing polls the event loop, so requests only queue up
        let (client, _eventloop) = AsyncClient::new(config().options(), 2);
        let sink = MqttSink { client };

        // Act
        let first = sink.publish("t/debug", b"{}".to_vec(), false);
        let second = sink.publish("t/status", b"{}".to_vec(), true);
        let overflow = sink.publish("t/debug", b"{}".to_vec(), false);

        // Assert: a full queue is reported, not waited on
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert!(matches!(overflow, Err(TelemetryError::Unavailable(_))));
    }
}

//! Integration tests for the MQTT adapter against a loopback broker.
//!
//! The broker is a minimal MQTT 3.1.1 peer on 127.0.0.1: it acknowledges the
//! connect and the subscription, records every PUBLISH and the DISCONNECT,
//! and answers pings.  Real time is used since the bytes cross a socket.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keybridge_core::{ActionTable, DebounceConfig, DefaultAction};
use keybridge_daemon::application::bridge::Bridge;
use keybridge_daemon::application::dispatch::Dispatcher;
use keybridge_daemon::application::executor::ActionExecutor;
use keybridge_daemon::application::supervisor::{
    shutdown_channel, ShutdownTrigger, Supervisor, SupervisorConfig, DEFAULT_POLL_INTERVAL,
};
use keybridge_daemon::application::telemetry::{
    BusEvent, StatsRegistry, TelemetryPublisher, Topics,
};
use keybridge_daemon::infrastructure::input_capture::mock::{MockDeviceProvider, MockSession};
use keybridge_daemon::infrastructure::input_capture::DeviceSpec;
use keybridge_daemon::infrastructure::network::mqtt::{self, MqttConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

// ── Loopback broker ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Publish {
        topic: String,
        retain: bool,
        payload: serde_json::Value,
    },
    Disconnect,
}

type Ledger = Arc<Mutex<Vec<Seen>>>;

async fn read_packet(stream: &mut TcpStream) -> io::Result<Option<(u8, Vec<u8>)>> {
    let header = match stream.read_u8().await {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let b = stream.read_u8().await?;
        len |= usize::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0; len];
    stream.read_exact(&mut body).await?;
    Ok(Some((header, body)))
}

async fn serve(listener: TcpListener, ledger: Ledger) -> io::Result<()> {
    let (mut stream, _) = listener.accept().await?;
    while let Some((header, body)) = read_packet(&mut stream).await? {
        match header >> 4 {
            // CONNECT
            1 => stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await?,
            // PUBLISH, QoS 0 only
            3 => {
                let topic_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
                let topic = String::from_utf8_lossy(&body[2..2 + topic_len]).into_owned();
                let payload = serde_json::from_slice(&body[2 + topic_len..])
                    .unwrap_or(serde_json::Value::Null);
                ledger.lock().unwrap().push(Seen::Publish {
                    topic,
                    retain: header & 0x01 == 1,
                    payload,
                });
            }
            // SUBSCRIBE
            8 => stream.write_all(&[0x90, 0x03, body[0], body[1], 0x00]).await?,
            // PINGREQ
            12 => stream.write_all(&[0xd0, 0x00]).await?,
            // DISCONNECT
            14 => {
                ledger.lock().unwrap().push(Seen::Disconnect);
                break;
            }
            _ => {}
        }
    }
    Ok(())
}

async fn start_broker() -> (u16, Ledger, JoinHandle<io::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let ledger = Ledger::default();
    let handle = tokio::spawn(serve(listener, Arc::clone(&ledger)));
    (port, ledger, handle)
}

fn statuses(ledger: &Ledger) -> Vec<(String, bool)> {
    ledger
        .lock()
        .unwrap()
        .iter()
        .filter_map(|seen| match seen {
            Seen::Publish {
                topic,
                retain,
                payload,
            } if topic == "kb/status" => Some((
                payload["status"].as_str().unwrap_or_default().to_string(),
                *retain,
            )),
            _ => None,
        })
        .collect()
}

async fn wait_until(ledger: &Ledger, done: impl Fn(&Ledger) -> bool) {
    timeout(WAIT, async {
        while !done(ledger) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("broker did not see the expected records in time");
}

// ── Fixture ───────────────────────────────────────────────────────────────────

fn bridge(
    telemetry: Arc<TelemetryPublisher>,
    bus_events: mpsc::Receiver<BusEvent>,
    trigger: ShutdownTrigger,
) -> Bridge {
    let provider = Arc::new(MockDeviceProvider::new());
    provider.push_session(MockSession::new());
    let dispatcher = Dispatcher::new(
        ActionTable::builder(DefaultAction::None).build(),
        DebounceConfig::default(),
        ActionExecutor::new(None, None, Arc::clone(&telemetry)),
        Arc::clone(&telemetry),
    );
    let supervisor = Supervisor::new(
        SupervisorConfig {
            device: DeviceSpec::parse("flirc.tv flirc"),
            poll_interval: DEFAULT_POLL_INTERVAL,
        },
        provider,
        dispatcher,
        Arc::clone(&telemetry),
    );
    Bridge::new(supervisor, telemetry, Duration::from_secs(60), bus_events, trigger)
}

fn mqtt_config(port: u16) -> MqttConfig {
    MqttConfig {
        broker_host: "127.0.0.1".to_string(),
        port,
        username: None,
        password: None,
        keep_alive: Duration::from_secs(60),
        topics: Topics::new("kb"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_final_status_and_disconnect_reach_broker_on_shutdown() {
    // Arrange: the bus shares the bridge's shutdown signal, so it is told to
    // stop before the final records are queued
    let (port, ledger, broker) = start_broker().await;
    let (trigger, _) = shutdown_channel();
    let (sink, bus_events, mqtt_task) = mqtt::connect(&mqtt_config(port), trigger.subscribe());
    let telemetry = Arc::new(TelemetryPublisher::new(
        Arc::new(sink),
        Topics::new("kb"),
        Arc::new(StatsRegistry::new()),
        None,
    ));
    let handle = tokio::spawn(bridge(telemetry, bus_events, trigger.clone()).run());
    wait_until(&ledger, |l| !statuses(l).is_empty()).await;

    // Act
    trigger.trigger();
    timeout(WAIT, handle).await.unwrap().unwrap();
    timeout(WAIT, mqtt_task).await.unwrap().unwrap();
    timeout(WAIT, broker).await.unwrap().unwrap().unwrap();

    // Assert: retained `stopped` is the last status, then the disconnect
    let statuses = statuses(&ledger);
    assert_eq!(statuses.first(), Some(&("running".to_string(), true)));
    assert_eq!(statuses.last(), Some(&("stopped".to_string(), true)));
    assert_eq!(ledger.lock().unwrap().last(), Some(&Seen::Disconnect));
}

#[tokio::test]
async fn test_bus_task_ends_after_client_disconnect_without_stop_signal() {
    // Arrange: a stop signal that never fires
    let (port, ledger, broker) = start_broker().await;
    let (bus_stop, _) = shutdown_channel();
    let (trigger, _) = shutdown_channel();
    let (sink, bus_events, mqtt_task) = mqtt::connect(&mqtt_config(port), bus_stop.subscribe());
    let telemetry = Arc::new(TelemetryPublisher::new(
        Arc::new(sink),
        Topics::new("kb"),
        Arc::new(StatsRegistry::new()),
        None,
    ));
    let handle = tokio::spawn(bridge(telemetry, bus_events, trigger.clone()).run());
    wait_until(&ledger, |l| !statuses(l).is_empty()).await;

    // Act
    trigger.trigger();
    timeout(WAIT, handle).await.unwrap().unwrap();

    // Assert: the task returns on its own once the disconnect is written
    timeout(WAIT, mqtt_task).await.unwrap().unwrap();
    timeout(WAIT, broker).await.unwrap().unwrap().unwrap();
    assert_eq!(statuses(&ledger).last().map(|s| s.0.as_str()), Some("stopped"));
    assert_eq!(ledger.lock().unwrap().last(), Some(&Seen::Disconnect));
    drop(bus_stop);
}

//! Integration tests for the dispatch pipeline of the IR-to-TV setup.
//!
//! The pipeline is built from a real TOML configuration through the public
//! API, the same way `main` builds it, with the HTTP transport replaced by a
//! scripted fake.  Time is paused so the retry delay and the debounce windows
//! are exact.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keybridge_core::{KeyEvent, KeyId, OutboundCommand};
use keybridge_daemon::application::dispatch::{DispatchOutcome, Dispatcher};
use keybridge_daemon::application::executor::{ActionExecutor, ExecOutcome, RemoteControl};
use keybridge_daemon::application::outbound::{
    CommandSender, CommandTransport, RetryPolicy, TransportError,
};
use keybridge_daemon::application::telemetry::{
    MemorySink, StatsRegistry, TelemetryPublisher, Topics,
};
use keybridge_daemon::infrastructure::storage::config::AppConfig;
use tokio::time::Instant;

const IR_CONFIG: &str = r#"
[device]
source = "flirc.tv flirc"

[debounce]
global_cooldown_ms = 0
per_key_cooldown_ms = 300

[keys]
F1 = "toggle:lamp"

[ircc]
host = "192.168.1.137"
psk = "0000"
retry_count = 3
retry_delay_ms = 1000

[telemetry]
topic_prefix = "home/hsb2/ir-bridge"
"#;

const VOLUME_UP: KeyId = KeyId::from_code(115);
const MUTE: KeyId = KeyId::from_code(113);
const F1: KeyId = KeyId::from_code(59);
const UNBOUND: KeyId = KeyId::from_code(200);

// ── Fake transport ────────────────────────────────────────────────────────────

/// Replies with scripted results, then 200 forever.
#[derive(Default)]
struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<u16, TransportError>>>,
    posted: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedTransport {
    fn replying(replies: Vec<Result<u16, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            posted: Mutex::new(Vec::new()),
        })
    }

    fn posted(&self) -> Vec<(String, Instant)> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandTransport for ScriptedTransport {
    async fn post(&self, command: &OutboundCommand) -> Result<u16, TransportError> {
        self.posted
            .lock()
            .unwrap()
            .push((command.command_id.clone(), Instant::now()));
        self.replies.lock().unwrap().pop_front().unwrap_or(Ok(200))
    }

    fn target(&self) -> String {
        "192.168.1.137".to_string()
    }
}

// ── Fixture ───────────────────────────────────────────────────────────────────

struct Pipeline {
    dispatcher: Dispatcher,
    sink: Arc<MemorySink>,
    stats: Arc<StatsRegistry>,
}

fn pipeline(transport: Arc<ScriptedTransport>) -> Pipeline {
    let config = AppConfig::from_toml(IR_CONFIG).expect("config parses");
    let resolved = config.resolve().expect("config is valid");
    let ircc = config.ircc.as_ref().unwrap();

    let sink = Arc::new(MemorySink::new());
    let stats = Arc::new(StatsRegistry::new());
    let telemetry = Arc::new(TelemetryPublisher::new(
        sink.clone(),
        Topics::new(&config.telemetry.topic_prefix),
        stats.clone(),
        Some(ircc.host.clone()),
    ));
    let remote = RemoteControl {
        catalog: resolved.catalog.expect("ircc configured"),
        sender: CommandSender::new(
            transport,
            RetryPolicy {
                retry_count: ircc.retry_count,
                retry_delay: Duration::from_millis(ircc.retry_delay_ms),
            },
        ),
    };
    let executor = ActionExecutor::new(None, Some(remote), telemetry.clone());
    let dispatcher = Dispatcher::new(resolved.table, resolved.debounce, executor, telemetry);
    Pipeline {
        dispatcher,
        sink,
        stats,
    }
}

fn press(key_id: KeyId) -> KeyEvent {
    KeyEvent::new(key_id, Instant::now().into_std())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_remote_button_sends_its_ircc_command() {
    // Arrange
    let transport = ScriptedTransport::replying(vec![]);
    let mut p = pipeline(transport.clone());

    // Act
    let outcome = p.dispatcher.dispatch(press(VOLUME_UP)).await;

    // Assert
    assert_eq!(
        outcome,
        DispatchOutcome::Executed(ExecOutcome::Sent("volumeup".to_string()))
    );
    let stats = p.stats.snapshot();
    assert_eq!(stats.commands_sent, 1);
    assert_eq!(stats.last_command.as_deref(), Some("volumeup"));
    assert_eq!(stats.last_key.as_deref(), Some("VOLUMEUP"));

    let events = p.sink.payloads_on("home/hsb2/ir-bridge/event");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["key_code"], 115);
    assert_eq!(events[0]["command"], "volumeup");
    assert_eq!(events[0]["success"], true);
    assert_eq!(events[0]["target"], "192.168.1.137");
}

#[tokio::test(start_paused = true)]
async fn test_per_key_cooldown_only_with_zero_global() {
    // Arrange
    let transport = ScriptedTransport::replying(vec![]);
    let mut p = pipeline(transport.clone());

    // Act: repeat inside 300 ms, a different key at once, repeat after 300 ms
    let first = p.dispatcher.dispatch(press(VOLUME_UP)).await;
    tokio::time::advance(Duration::from_millis(100)).await;
    let repeat = p.dispatcher.dispatch(press(VOLUME_UP)).await;
    let other = p.dispatcher.dispatch(press(MUTE)).await;
    tokio::time::advance(Duration::from_millis(250)).await;
    let later = p.dispatcher.dispatch(press(VOLUME_UP)).await;

    // Assert
    assert!(matches!(first, DispatchOutcome::Executed(_)));
    assert_eq!(repeat, DispatchOutcome::Debounced);
    assert!(matches!(other, DispatchOutcome::Executed(_)));
    assert!(matches!(later, DispatchOutcome::Executed(_)));
    let sent: Vec<_> = transport.posted().into_iter().map(|(c, _)| c).collect();
    assert_eq!(sent, vec!["volumeup", "mute", "volumeup"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_send_retries_then_counts_one_error() {
    // Arrange: every attempt fails
    let transport = ScriptedTransport::replying(vec![
        Ok(403),
        Err(TransportError::Timeout),
        Err(TransportError::Request("connection refused".to_string())),
    ]);
    let mut p = pipeline(transport.clone());
    let started = Instant::now();

    // Act
    let outcome = p.dispatcher.dispatch(press(VOLUME_UP)).await;

    // Assert: three attempts one second apart, no sleep after the last
    assert_eq!(outcome, DispatchOutcome::Failed);
    let posted = transport.posted();
    assert_eq!(posted.len(), 3);
    assert_eq!(posted[1].1 - posted[0].1, Duration::from_secs(1));
    assert_eq!(posted[2].1 - posted[1].1, Duration::from_secs(1));
    assert_eq!(Instant::now() - started, Duration::from_secs(2));

    let stats = p.stats.snapshot();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.commands_sent, 0);
    let events = p.sink.payloads_on("home/hsb2/ir-bridge/event");
    assert_eq!(events[0]["success"], false);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_after_transient_failure() {
    let transport = ScriptedTransport::replying(vec![Err(TransportError::Timeout), Ok(200)]);
    let mut p = pipeline(transport.clone());

    let outcome = p.dispatcher.dispatch(press(MUTE)).await;

    assert_eq!(
        outcome,
        DispatchOutcome::Executed(ExecOutcome::Sent("mute".to_string()))
    );
    assert_eq!(transport.posted().len(), 2);
    assert_eq!(p.stats.snapshot().errors, 0);
}

#[tokio::test(start_paused = true)]
async fn test_side_effect_key_publishes_toggle() {
    let transport = ScriptedTransport::replying(vec![]);
    let mut p = pipeline(transport.clone());

    let outcome = p.dispatcher.dispatch(press(F1)).await;

    assert_eq!(
        outcome,
        DispatchOutcome::Executed(ExecOutcome::SideEffect("lamp".to_string()))
    );
    let toggles = p.sink.payloads_on("home/hsb2/ir-bridge/toggle");
    assert_eq!(toggles.len(), 1);
    assert_eq!(toggles[0]["name"], "lamp");
    assert_eq!(toggles[0]["key"], "F1");
    assert!(transport.posted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unbound_scancode_is_ignored() {
    let transport = ScriptedTransport::replying(vec![]);
    let mut p = pipeline(transport.clone());

    let outcome = p.dispatcher.dispatch(press(UNBOUND)).await;

    assert_eq!(outcome, DispatchOutcome::Ignored);
    assert!(transport.posted().is_empty());
    assert_eq!(p.stats.snapshot().keys_pressed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_outage_does_not_affect_dispatch() {
    // Arrange: the bus refuses every record
    let transport = ScriptedTransport::replying(vec![]);
    let mut p = pipeline(transport.clone());
    p.sink.set_offline(true);

    // Act
    let outcome = p.dispatcher.dispatch(press(VOLUME_UP)).await;

    // Assert
    assert!(matches!(outcome, DispatchOutcome::Executed(ExecOutcome::Sent(_))));
    assert_eq!(p.stats.snapshot().commands_sent, 1);
    assert!(p.sink.records().is_empty());
}

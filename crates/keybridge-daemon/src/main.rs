//! keybridge daemon: entry point.
//!
//! Reads key presses from a Linux input device (a keyboard, or an IR
//! receiver such as a FLIRC that presents itself as one) and turns them into
//! sounds, Sony IRCC commands, or side-effect requests on the MQTT bus.
//!
//! # Usage
//!
//! ```text
//! keybridge [OPTIONS]
//!
//! Options:
//!   -c, --config <PATH>      Configuration file [default: /etc/keybridge/config.toml]
//!       --log-level <FILTER> tracing filter, overrides RUST_LOG
//!       --psk <KEY>          IRCC pre-shared key, overrides the file
//! ```
//!
//! | Variable              | Description                   |
//! |-----------------------|-------------------------------|
//! | `KEYBRIDGE_CONFIG`    | Configuration file path       |
//! | `KEYBRIDGE_IRCC_PSK`  | IRCC pre-shared key           |
//! | `RUST_LOG`            | Log filter when no `--log-level` |
//!
//! Exits 0 after a clean shutdown (SIGINT, SIGTERM, or `restart` on the
//! control topic) and non-zero when the configuration is unusable.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keybridge_daemon::application::audio::{AudioPlayer, SoundPool};
use keybridge_daemon::application::bridge::Bridge;
use keybridge_daemon::application::dispatch::Dispatcher;
use keybridge_daemon::application::executor::{ActionExecutor, RemoteControl};
use keybridge_daemon::application::outbound::{CommandSender, RetryPolicy};
use keybridge_daemon::application::supervisor::{
    shutdown_channel, ShutdownTrigger, Supervisor, SupervisorConfig,
};
use keybridge_daemon::application::telemetry::{
    NullSink, StatsRegistry, TelemetryPublisher, TelemetrySink, Topics,
};
use keybridge_daemon::infrastructure::audio::process::ProcessSpawner;
use keybridge_daemon::infrastructure::input_capture::DeviceProvider;
use keybridge_daemon::infrastructure::network::ircc_client::{IrccClient, IrccClientConfig};
use keybridge_daemon::infrastructure::network::mqtt::{self, MqttConfig};
use keybridge_daemon::infrastructure::storage::config::{
    load_config, AppConfig, AudioConfig, IrccConfig, DEFAULT_CONFIG_PATH,
};
use keybridge_core::IrccCatalog;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Bridge key presses to sounds and TV remote commands.
#[derive(Debug, Parser)]
#[command(
    name = "keybridge",
    about = "Turn key presses into sounds or Sony IRCC commands, with MQTT telemetry",
    version
)]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "KEYBRIDGE_CONFIG")]
    config: PathBuf,

    /// tracing filter directive, e.g. `debug` or `keybridge_daemon=trace`.
    /// Takes precedence over `RUST_LOG`.
    #[arg(long)]
    log_level: Option<String>,

    /// IRCC pre-shared key.  Overrides `ircc.psk` in the file.
    #[arg(long, env = "KEYBRIDGE_IRCC_PSK", hide_env_values = true)]
    psk: Option<String>,
}

impl Cli {
    fn env_filter(&self) -> EnvFilter {
        match &self.log_level {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        }
    }

    /// Loads the configuration file and applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = load_config(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        if let Some(psk) = &self.psk {
            config.override_psk(psk);
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_env_filter(cli.env_filter()).init();

    let config = cli.load_config()?;
    let resolved = config
        .resolve()
        .with_context(|| format!("invalid configuration in {}", cli.config.display()))?;

    info!(
        "keybridge {} starting: device {}, {} key binding(s)",
        env!("CARGO_PKG_VERSION"),
        resolved.device,
        resolved.table.len()
    );

    let (trigger, _) = shutdown_channel();
    spawn_signal_handler(trigger.clone())?;

    // ── Telemetry ─────────────────────────────────────────────────────────────
    let stats = Arc::new(StatsRegistry::new());
    let topics = Topics::new(&config.telemetry.topic_prefix);
    let target = config.ircc.as_ref().map(|i| i.host.clone());

    // Separate from `trigger`: the bus outlives the bridge so the final
    // status is delivered.
    let (bus_stop, _) = shutdown_channel();
    let (sink, bus_events, mqtt_task) = if config.telemetry.enabled {
        let t = &config.telemetry;
        let mqtt_config = MqttConfig {
            broker_host: t.broker_host.clone(),
            port: t.port,
            username: t.username.clone(),
            password: t.password.clone(),
            keep_alive: Duration::from_secs(t.keep_alive_secs),
            topics: topics.clone(),
        };
        let (sink, bus_events, task) = mqtt::connect(&mqtt_config, bus_stop.subscribe());
        let sink: Arc<dyn TelemetrySink> = Arc::new(sink);
        (sink, bus_events, Some(task))
    } else {
        info!("telemetry disabled");
        // Sender dropped at once: the control task sees a closed channel.
        let (_tx, rx) = mpsc::channel(1);
        let sink: Arc<dyn TelemetrySink> = Arc::new(NullSink);
        (sink, rx, None)
    };
    let telemetry = Arc::new(TelemetryPublisher::new(sink, topics, Arc::clone(&stats), target));

    // ── Effectors ─────────────────────────────────────────────────────────────
    let audio = config.audio.as_ref().map(build_audio);
    let remote = match (&config.ircc, resolved.catalog) {
        (Some(ircc), Some(catalog)) => Some(build_remote(ircc, catalog)?),
        _ => None,
    };
    let executor = ActionExecutor::new(audio, remote, Arc::clone(&telemetry));

    // ── Dispatch and supervision ──────────────────────────────────────────────
    let dispatcher = Dispatcher::new(
        resolved.table,
        resolved.debounce,
        executor,
        Arc::clone(&telemetry),
    );
    let supervisor = Supervisor::new(
        SupervisorConfig {
            device: resolved.device,
            poll_interval: resolved.poll_interval,
        },
        device_provider(),
        dispatcher,
        Arc::clone(&telemetry),
    );

    let bridge = Bridge::new(
        supervisor,
        telemetry,
        Duration::from_secs(config.telemetry.status_interval_secs.max(1)),
        bus_events,
        trigger,
    );
    bridge.run().await;

    bus_stop.trigger();
    if let Some(task) = mqtt_task {
        if let Err(e) = task.await {
            warn!("MQTT task ended abnormally: {e}");
        }
    }

    let stats = stats.snapshot();
    info!(
        "keybridge stopped: {} key(s), {} command(s), {} error(s)",
        stats.keys_pressed, stats.commands_sent, stats.errors
    );
    Ok(())
}

// ── Wiring helpers ────────────────────────────────────────────────────────────

fn build_audio(audio: &AudioConfig) -> AudioPlayer {
    let pool = match SoundPool::scan(&audio.sound_dir) {
        Ok(pool) => pool,
        Err(e) => {
            warn!("sound directory {} unreadable: {e}", audio.sound_dir.display());
            SoundPool::default()
        }
    };
    if pool.is_empty() {
        warn!("no audio files found in {}", audio.sound_dir.display());
    } else {
        info!("{} sound file(s) in {}", pool.len(), audio.sound_dir.display());
    }
    let spawner = Arc::new(ProcessSpawner::new(audio.player.clone(), audio.volume));
    AudioPlayer::new(spawner, pool, Duration::from_millis(audio.grace_ms))
}

fn build_remote(ircc: &IrccConfig, catalog: IrccCatalog) -> anyhow::Result<RemoteControl> {
    let client = IrccClient::new(IrccClientConfig {
        host: ircc.host.clone(),
        psk: ircc.psk.clone(),
        request_timeout: Duration::from_millis(ircc.request_timeout_ms),
    })
    .context("creating IRCC client")?;
    info!("IRCC target {} ({} command(s))", client.url(), catalog.len());

    let sender = CommandSender::new(
        Arc::new(client),
        RetryPolicy {
            retry_count: ircc.retry_count,
            retry_delay: Duration::from_millis(ircc.retry_delay_ms),
        },
    );
    Ok(RemoteControl { catalog, sender })
}

#[cfg(target_os = "linux")]
fn device_provider() -> Arc<dyn DeviceProvider> {
    Arc::new(keybridge_daemon::infrastructure::input_capture::linux::EvdevProvider::new())
}

#[cfg(not(target_os = "linux"))]
fn device_provider() -> Arc<dyn DeviceProvider> {
    warn!("evdev input is only available on Linux; no device will ever be found");
    Arc::new(keybridge_daemon::infrastructure::input_capture::mock::MockDeviceProvider::new())
}

/// Triggers shutdown on Ctrl-C, and on SIGTERM where available.
fn spawn_signal_handler(trigger: ShutdownTrigger) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received Ctrl-C, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
            trigger.trigger();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C, shutting down"),
            Err(e) => warn!("failed to listen for Ctrl-C: {e}"),
        }
        trigger.trigger();
    });

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_config_path() {
        // Arrange: parse with no arguments
        let cli = Cli::try_parse_from(["keybridge"]).unwrap();

        // Assert (KEYBRIDGE_CONFIG may be set in the environment)
        if std::env::var_os("KEYBRIDGE_CONFIG").is_none() {
            assert_eq!(cli.config, PathBuf::from("/etc/keybridge/config.toml"));
        }
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_cli_config_override() {
        let cli = Cli::parse_from(["keybridge", "--config", "/tmp/kb.toml"]);
        assert_eq!(cli.config, PathBuf::from("/tmp/kb.toml"));

        let cli = Cli::parse_from(["keybridge", "-c", "/tmp/short.toml"]);
        assert_eq!(cli.config, PathBuf::from("/tmp/short.toml"));
    }

    #[test]
    fn test_cli_log_level_and_psk() {
        let cli = Cli::parse_from(["keybridge", "--log-level", "debug", "--psk", "0000"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.psk.as_deref(), Some("0000"));
    }

    #[test]
    fn test_psk_flag_overrides_file() {
        // Arrange
        let path = std::env::temp_dir().join(format!("keybridge-cli-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[ircc]\nhost = \"tv\"\npsk = \"old\"\n").unwrap();
        let cli = Cli::parse_from([
            "keybridge",
            "--config",
            path.to_str().unwrap(),
            "--psk",
            "new",
        ]);

        // Act
        let config = cli.load_config().unwrap();

        // Assert
        assert_eq!(config.ircc.unwrap().psk, "new");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli::parse_from(["keybridge", "--config", "/nonexistent/keybridge.toml"]);
        let err = cli.load_config().unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/keybridge.toml"));
    }
}

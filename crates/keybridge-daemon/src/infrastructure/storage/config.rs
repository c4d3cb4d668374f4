//! TOML configuration for the daemon.
//!
//! The file is read once at startup (default `/etc/keybridge/config.toml`).
//! Every section has defaults except the effector sections: at least one of
//! `[audio]` and `[ircc]` must be present.
//!
//! ```toml
//! [device]
//! source = "flirc.tv flirc"          # or a path such as /dev/input/event0
//! poll_interval_ms = 5000
//!
//! [debounce]
//! global_cooldown_ms = 0
//! per_key_cooldown_ms = 300
//!
//! [dispatch]
//! stop_key = "SPACE"
//! default_action = "none"            # or "random"
//!
//! [keys]
//! A = "sound:cat.wav"
//! F1 = "toggle:lamp"
//!
//! [ircc]
//! host = "192.168.1.137"
//! psk = "0000"
//! map_remote_keys = true
//!
//! [ircc.commands]
//! netflix = "AAAAAgAAABoAAAB8Aw=="
//!
//! [telemetry]
//! broker_host = "192.168.1.101"
//! topic_prefix = "home/hsb2/ir-bridge"
//! ```
//!
//! [`AppConfig::resolve`] validates the whole file and builds the runtime
//! objects in one step, so a configuration that resolves is one the daemon
//! can run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use keybridge_core::{
    Action, ActionParseError, ActionTable, CatalogError, DebounceConfig, DefaultAction,
    IrccCatalog, KeyId, KeymapError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::input_capture::DeviceSpec;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/keybridge/config.toml";

/// Stop key used when audio is configured and `dispatch.stop_key` is unset.
const DEFAULT_AUDIO_STOP_KEY: &str = "SPACE";

/// Error type for configuration loading and validation.  Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid action for key {key}: {source}")]
    Action {
        key: String,
        #[source]
        source: ActionParseError,
    },

    #[error(transparent)]
    Keymap(#[from] KeymapError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub debounce: DebounceSection,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Key name → action spec.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
    pub audio: Option<AudioConfig>,
    pub ircc: Option<IrccConfig>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Device path (starts with `/`) or kernel device name.
    #[serde(default = "default_device_source")]
    pub source: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebounceSection {
    #[serde(default = "default_cooldown_ms")]
    pub global_cooldown_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub per_key_cooldown_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Key that stops all playback.  Defaults to `SPACE` when audio is
    /// configured; an empty string disables it.
    pub stop_key: Option<String>,
    #[serde(default)]
    pub default_action: DefaultAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    /// Directory holding the sound files; `sound:` paths are relative to it.
    pub sound_dir: PathBuf,
    /// Player program and fixed arguments.
    #[serde(default = "default_player")]
    pub player: Vec<String>,
    #[serde(default = "default_volume")]
    pub volume: u32,
    /// Wait after spawning before checking whether the player died.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IrccConfig {
    /// TV host, optionally with `:port`.
    pub host: String,
    /// Pre-shared key.  May instead come from `KEYBRIDGE_IRCC_PSK`.
    #[serde(default)]
    pub psk: String,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Bind the built-in remote scancodes to their commands.
    #[serde(default = "default_true")]
    pub map_remote_keys: bool,
    /// Command name → base64 IRCC code, replacing or extending the catalog.
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_broker_host")]
    pub broker_host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_device_source() -> String {
    "/dev/input/event0".to_string()
}
fn default_poll_interval_ms() -> u64 {
    5000
}
fn default_cooldown_ms() -> u64 {
    1000
}
fn default_player() -> Vec<String> {
    vec!["paplay".to_string()]
}
fn default_volume() -> u32 {
    45875
}
fn default_grace_ms() -> u64 {
    150
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_true() -> bool {
    true
}
fn default_broker_host() -> String {
    "localhost".to_string()
}
fn default_broker_port() -> u16 {
    1883
}
fn default_topic_prefix() -> String {
    "keybridge".to_string()
}
fn default_status_interval_secs() -> u64 {
    60
}
fn default_keep_alive_secs() -> u64 {
    60
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            source: default_device_source(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for DebounceSection {
    fn default() -> Self {
        Self {
            global_cooldown_ms: default_cooldown_ms(),
            per_key_cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            broker_host: default_broker_host(),
            port: default_broker_port(),
            username: None,
            password: None,
            topic_prefix: default_topic_prefix(),
            status_interval_secs: default_status_interval_secs(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Reads and parses the configuration file.  Does not validate it; call
/// [`AppConfig::resolve`] after applying any overrides.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    AppConfig::from_toml(&content)
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Everything the dispatch core needs, built from a valid [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub device: DeviceSpec,
    pub poll_interval: Duration,
    pub debounce: DebounceConfig,
    pub table: ActionTable,
    /// Present iff `[ircc]` is configured.
    pub catalog: Option<IrccCatalog>,
}

impl AppConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is malformed.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Replaces the IRCC pre-shared key, e.g. from the environment.  Ignored
    /// when `[ircc]` is absent.
    pub fn override_psk(&mut self, psk: &str) {
        if let Some(ircc) = self.ircc.as_mut() {
            ircc.psk = psk.to_string();
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.device.poll_interval_ms)
    }

    pub fn debounce(&self) -> DebounceConfig {
        DebounceConfig {
            global_cooldown: Duration::from_millis(self.debounce.global_cooldown_ms),
            per_key_cooldown: Duration::from_millis(self.debounce.per_key_cooldown_ms),
        }
    }

    /// Validates the configuration and builds the runtime objects.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if no effector is configured, a required value
    /// is empty or zero, a key name is unknown, an action spec is malformed,
    /// an action needs an effector that is not configured (a side effect needs
    /// the telemetry bus), a command name is
    /// not in the catalog, or an IRCC code is not valid base64.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        self.check_sections()?;

        let catalog = match &self.ircc {
            Some(ircc) => Some(IrccCatalog::default().with_overrides(&ircc.commands)?),
            None => None,
        };
        let table = self.action_table(catalog.as_ref())?;

        Ok(ResolvedConfig {
            device: DeviceSpec::parse(&self.device.source),
            poll_interval: self.poll_interval(),
            debounce: self.debounce(),
            table,
            catalog,
        })
    }

    fn check_sections(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.audio.is_none() && self.ircc.is_none() {
            return invalid("no effector configured; add an [audio] or [ircc] section");
        }
        if self.device.source.trim().is_empty() {
            return invalid("device.source must not be empty");
        }
        if self.device.poll_interval_ms == 0 {
            return invalid("device.poll_interval_ms must be greater than zero");
        }
        if let Some(audio) = &self.audio {
            if audio.player.first().map_or(true, |p| p.trim().is_empty()) {
                return invalid("audio.player must name a program");
            }
        }
        if let Some(ircc) = &self.ircc {
            if ircc.host.trim().is_empty() {
                return invalid("ircc.host must not be empty");
            }
            if ircc.psk.is_empty() {
                return invalid("ircc.psk is empty; set it in the file or via KEYBRIDGE_IRCC_PSK");
            }
        }
        if self.telemetry.enabled {
            if self.telemetry.broker_host.trim().is_empty() {
                return invalid("telemetry.broker_host must not be empty");
            }
            if self.telemetry.topic_prefix.trim_matches('/').is_empty() {
                return invalid("telemetry.topic_prefix must not be empty");
            }
            if self.telemetry.status_interval_secs == 0 {
                return invalid("telemetry.status_interval_secs must be greater than zero");
            }
        }
        Ok(())
    }

    fn action_table(&self, catalog: Option<&IrccCatalog>) -> Result<ActionTable, ConfigError> {
        let sound_root = self
            .audio
            .as_ref()
            .map(|a| a.sound_dir.clone())
            .unwrap_or_default();

        let default = self.dispatch.default_action;
        if default == DefaultAction::Random && self.audio.is_none() {
            return Err(ConfigError::Invalid(
                "dispatch.default_action = \"random\" requires an [audio] section".to_string(),
            ));
        }

        let mut builder = ActionTable::builder(default);

        let stop_key = match (&self.dispatch.stop_key, &self.audio) {
            (Some(name), _) if name.trim().is_empty() => None,
            (Some(name), _) => Some(KeyId::from_name(name)?),
            (None, Some(_)) => Some(KeyId::from_name(DEFAULT_AUDIO_STOP_KEY)?),
            (None, None) => None,
        };
        if let Some(key_id) = stop_key {
            builder = builder.stop_key(key_id);
        }

        for (name, spec) in &self.keys {
            let key_id = KeyId::from_name(name)?;
            let action = Action::parse_spec(spec, &sound_root).map_err(|source| ConfigError::Action {
                key: name.clone(),
                source,
            })?;
            self.check_effector(name, &action, catalog)?;
            builder = builder.entry(key_id, action);
        }

        // Remote scancodes fill in whatever the explicit entries left open.
        if let (Some(ircc), Some(catalog)) = (&self.ircc, catalog) {
            if ircc.map_remote_keys {
                for (scancode, command) in catalog.bindings() {
                    builder = builder.entry_if_absent(
                        KeyId::from_code(scancode),
                        Action::SendCommand(command.to_string()),
                    );
                }
            }
        }

        Ok(builder.build())
    }

    fn check_effector(
        &self,
        key: &str,
        action: &Action,
        catalog: Option<&IrccCatalog>,
    ) -> Result<(), ConfigError> {
        match action {
            Action::PlaySound(_) | Action::PlayRandomSound if self.audio.is_none() => {
                Err(ConfigError::Invalid(format!(
                    "key {key}: {} requires an [audio] section",
                    action.label()
                )))
            }
            Action::SendCommand(command) => match catalog {
                None => Err(ConfigError::Invalid(format!(
                    "key {key}: {} requires an [ircc] section",
                    action.label()
                ))),
                Some(catalog) if !catalog.contains(command) => Err(ConfigError::Invalid(format!(
                    "key {key}: unknown IRCC command {command:?}"
                ))),
                Some(_) => Ok(()),
            },
            Action::SideEffect(_) if !self.telemetry.enabled => Err(ConfigError::Invalid(format!(
                "key {key}: {} is delivered over the bus and requires telemetry.enabled",
                action.label()
            ))),
            _ => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Running counters reported on the telemetry bus.
//!
//! [`BridgeStats`] is a plain value: the daemon keeps the live copy behind a
//! lock and publishes clones of it.  Timestamps are RFC 3339 strings so the
//! snapshot serializes the same way whatever clock produced it.

use serde::{Deserialize, Serialize};

/// Lifecycle reported in the `status` field of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStatus {
    #[default]
    Initializing,
    Running,
    Stopped,
}

/// Snapshot of bridge activity since startup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BridgeStats {
    pub started_at: String,
    pub updated_at: String,
    /// Key presses that cleared the debounce gate.
    pub keys_pressed: u64,
    /// Outbound commands acknowledged by the target.
    pub commands_sent: u64,
    pub errors: u64,
    pub last_key: Option<String>,
    pub last_command: Option<String>,
    pub status: BridgeStatus,
}

impl BridgeStats {
    pub fn new(started_at: impl Into<String>) -> Self {
        let started_at = started_at.into();
        Self {
            updated_at: started_at.clone(),
            started_at,
            ..Self::default()
        }
    }

    pub fn record_key(&mut self, key_name: &str) {
        self.keys_pressed += 1;
        self.last_key = Some(key_name.to_string());
    }

    pub fn record_command(&mut self, command: &str) {
        self.commands_sent += 1;
        self.last_command = Some(command.to_string());
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }
}

//! Debounce gate: suppresses bounce, auto-repeat, and key mashing.
//!
//! A press is accepted only if it clears two cooldowns:
//!
//! ```text
//!   global:  now - last accepted press (any key)   >= global_cooldown
//!   per-key: now - last accepted press (this key)  >= per_key_cooldown
//! ```
//!
//! Timestamps are recorded only for accepted presses, so a burst of rejected
//! presses never extends the window.  The per-key map is never pruned; it is
//! bounded by the number of distinct keys on the device.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::event::KeyId;

/// Cooldown settings for [`DebounceGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Minimum spacing between any two accepted presses.  Zero disables the
    /// global check.
    pub global_cooldown: Duration,
    /// Minimum spacing between two accepted presses of the same key.
    pub per_key_cooldown: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            global_cooldown: Duration::from_secs(1),
            per_key_cooldown: Duration::from_secs(1),
        }
    }
}

/// Stateful filter deciding whether a key press is live or suppressed.
#[derive(Debug)]
pub struct DebounceGate {
    config: DebounceConfig,
    last_accept: HashMap<KeyId, Instant>,
    last_global_accept: Option<Instant>,
}

impl DebounceGate {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            last_accept: HashMap::new(),
            last_global_accept: None,
        }
    }

    pub fn config(&self) -> DebounceConfig {
        self.config
    }

    /// Returns `true` and records the press if it clears both cooldowns.
    pub fn accept(&mut self, key_id: KeyId, now: Instant) -> bool {
        if let Some(last) = self.last_global_accept {
            if now.saturating_duration_since(last) < self.config.global_cooldown {
                return false;
            }
        }

        if let Some(last) = self.last_accept.get(&key_id) {
            if now.saturating_duration_since(*last) < self.config.per_key_cooldown {
                return false;
            }
        }

        self.last_accept.insert(key_id, now);
        self.last_global_accept = Some(now);
        true
    }

    /// Number of keys with a recorded accept.
    pub fn tracked_keys(&self) -> usize {
        self.last_accept.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Key identifiers and key-down events.

use std::fmt;
use std::time::Instant;

use crate::keymap::{self, KeymapError};

/// Opaque identifier for one physical control.
///
/// Wraps the Linux input-event key code.  Two events from the same button
/// always carry the same `KeyId`, which is what the debounce gate and the
/// action table key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u16);

impl KeyId {
    pub const fn from_code(code: u16) -> Self {
        Self(code)
    }

    /// Parses a key name as written in the configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`KeymapError::UnknownName`] for names outside the key table.
    pub fn from_name(name: &str) -> Result<Self, KeymapError> {
        keymap::code_for_name(name).map(Self)
    }

    /// Raw scancode as reported by the device.
    pub const fn code(self) -> u16 {
        self.0
    }

    /// Canonical name, e.g. `"SPACE"`, or `"CODE_<n>"` for unnamed codes.
    pub fn name(self) -> String {
        keymap::name_for_code(self.0)
            .map(str::to_string)
            .unwrap_or_else(|| keymap::raw_code_name(self.0))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match keymap::name_for_code(self.0) {
            Some(name) => f.write_str(name),
            None => f.write_str(&keymap::raw_code_name(self.0)),
        }
    }
}

/// A key-down observed on the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_id: KeyId,
    /// Monotonic time at which the event was read from the device.
    pub observed_at: Instant,
}

impl KeyEvent {
    pub fn new(key_id: KeyId, observed_at: Instant) -> Self {
        Self {
            key_id,
            observed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_name_uses_table() {
        assert_eq!(KeyId::from_code(57).name(), "SPACE");
        assert_eq!(KeyId::from_code(57).to_string(), "SPACE");
    }

    #[test]
    fn test_key_id_name_falls_back_to_raw_code() {
        assert_eq!(KeyId::from_code(600).name(), "CODE_600");
        assert_eq!(KeyId::from_name("CODE_600"), Ok(KeyId::from_code(600)));
    }

    #[test]
    fn test_key_id_from_name_rejects_unknown() {
        assert!(KeyId::from_name("WIBBLE").is_err());
    }
}

//! Sony IRCC (IR-over-IP) command catalog and request envelope.
//!
//! Bravia TVs accept remote-control commands as a SOAP call:
//!
//! ```text
//!   POST http://<host>/sony/IRCC
//!   Content-Type: text/xml; charset=UTF-8
//!   SOAPACTION:   "urn:schemas-sony-com:service:IRCC:1#X_SendIRCC"
//!   X-Auth-PSK:   <pre-shared key>
//!
//!   <s:Envelope ...><s:Body><u:X_SendIRCC ...>
//!     <IRCCCode>AAAAAQAAAAEAAAATAw==</IRCCCode>
//!   </u:X_SendIRCC></s:Body></s:Envelope>
//! ```
//!
//! Each command is an opaque base64 code.  The built-in table maps the
//! scancodes a FLIRC receiver emits for a Sony remote to those codes.
//! Configuration may replace a code or add new named commands; every code is
//! checked to be valid base64 when the catalog is built.

use std::collections::{BTreeMap, HashMap};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tracing::debug;

use crate::domain::action::CommandId;

/// Request path on the TV.
pub const IRCC_PATH: &str = "/sony/IRCC";

/// Value of the `SOAPACTION` header, quotes included.
pub const SOAP_ACTION: &str = "\"urn:schemas-sony-com:service:IRCC:1#X_SendIRCC\"";

pub const CONTENT_TYPE: &str = "text/xml; charset=UTF-8";

/// `(scancode, command name, IRCC code)`.
const BUILTIN: &[(u16, &str, &str)] = &[
    // Digits
    (2, "num1", "AAAAAQAAAAEAAAAAAw=="),
    (3, "num2", "AAAAAQAAAAEAAAABAw=="),
    (4, "num3", "AAAAAQAAAAEAAAACAw=="),
    (5, "num4", "AAAAAQAAAAEAAAADAw=="),
    (6, "num5", "AAAAAQAAAAEAAAAEAw=="),
    (7, "num6", "AAAAAQAAAAEAAAAFAw=="),
    (8, "num7", "AAAAAQAAAAEAAAAGAw=="),
    (9, "num8", "AAAAAQAAAAEAAAAHAw=="),
    (10, "num9", "AAAAAQAAAAEAAAAIAw=="),
    (11, "num0", "AAAAAQAAAAEAAAAJAw=="),
    // Navigation
    (103, "up", "AAAAAQAAAAEAAAB0Aw=="),
    (108, "down", "AAAAAQAAAAEAAAB1Aw=="),
    (105, "left", "AAAAAQAAAAEAAAA0Aw=="),
    (106, "right", "AAAAAQAAAAEAAAAzAw=="),
    (96, "enter", "AAAAAQAAAAEAAABlAw=="),
    (28, "enter", "AAAAAQAAAAEAAABlAw=="),
    (1, "back", "AAAAAgAAAJcAAAAjAw=="),
    (102, "home", "AAAAAQAAAAEAAABgAw=="),
    // Volume
    (113, "mute", "AAAAAQAAAAEAAAAUAw=="),
    (114, "volumedown", "AAAAAQAAAAEAAAASAw=="),
    (115, "volumeup", "AAAAAQAAAAEAAAATAw=="),
    // Playback
    (164, "play", "AAAAAQAAAAEAAAANAw=="),
    (166, "stop", "AAAAAQAAAAEAAAAOAw=="),
    (168, "rewind", "AAAAAQAAAAEAAAA4Aw=="),
    (208, "fastforward", "AAAAAQAAAAEAAAA5Aw=="),
    (163, "next", "AAAAAQAAAAEAAAAXAw=="),
    (165, "previous", "AAAAAQAAAAEAAAAYAw=="),
    // Power and input
    (44, "power", "AAAAAQAAAAEAAAAVAw=="),
    (23, "input", "AAAAAQAAAAEAAAAlAw=="),
    (30, "actionmenu", "AAAAAQAAAAEAAAA6Aw=="),
    // Apps
    (49, "netflix", "AAAAAQAAAAEAAAAMAw=="),
    (25, "youtube", "AAAAAQAAAAEAAABDAw=="),
    // Colour buttons
    (19, "red", "AAAAAQAAAAEAAAATAw=="),
    (34, "green", "AAAAAQAAAAEAAAAUAw=="),
    (21, "yellow", "AAAAAQAAAAEAAAAVAw=="),
    (48, "blue", "AAAAAQAAAAEAAAAWAw=="),
    // Channels
    (20, "channelup", "AAAAAQAAAAEAAAA+Aw=="),
    (47, "channeldown", "AAAAAQAAAAEAAAA9Aw=="),
    // HDMI
    (17, "hdmi1", "AAAAAQAAAAEAAABAAw=="),
    (22, "hdmi2", "AAAAAQAAAAEAAABBAw=="),
];

/// Errors raised while building the catalog from configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("IRCC command name must not be empty")]
    EmptyName,

    #[error("IRCC code for {name:?} is not valid base64: {reason}")]
    InvalidCode { name: String, reason: String },
}

/// A command ready to be sent: its name and the base64 IRCC code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    pub command_id: CommandId,
    pub encoded_payload: String,
}

impl OutboundCommand {
    /// SOAP body for this command.
    pub fn envelope(&self) -> String {
        envelope(&self.encoded_payload)
    }
}

/// Builds the SOAP envelope carrying `code`.
pub fn envelope(code: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\n\
         \x20 <s:Body>\n\
         \x20   <u:X_SendIRCC xmlns:u=\"urn:schemas-sony-com:service:IRCC:1\">\n\
         \x20     <IRCCCode>{code}</IRCCCode>\n\
         \x20   </u:X_SendIRCC>\n\
         \x20 </s:Body>\n\
         </s:Envelope>"
    )
}

/// Named IRCC commands plus the scancode bindings that reach them.
#[derive(Debug, Clone)]
pub struct IrccCatalog {
    codes: BTreeMap<String, String>,
    scancodes: HashMap<u16, String>,
}

impl Default for IrccCatalog {
    fn default() -> Self {
        let mut codes = BTreeMap::new();
        let mut scancodes = HashMap::new();
        for &(scancode, name, code) in BUILTIN {
            codes.insert(name.to_string(), code.to_string());
            scancodes.insert(scancode, name.to_string());
        }
        Self { codes, scancodes }
    }
}

impl IrccCatalog {
    /// Applies `name → code` overrides on top of the built-in table.  Names
    /// are case-insensitive; unknown names add new commands without a
    /// scancode binding.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] for empty names or codes that do not decode
    /// as standard base64.
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, code) in overrides {
            let name = name.as_ref().trim().to_ascii_lowercase();
            let code = code.as_ref().trim();
            if name.is_empty() {
                return Err(CatalogError::EmptyName);
            }
            validate_code(&name, code)?;
            debug!(command = %name, "IRCC code overridden from configuration");
            self.codes.insert(name, code.to_string());
        }
        Ok(self)
    }

    /// Looks up a command by name.
    pub fn command(&self, name: &str) -> Option<OutboundCommand> {
        let name = name.to_ascii_lowercase();
        self.codes.get(&name).map(|code| OutboundCommand {
            command_id: name.clone(),
            encoded_payload: code.clone(),
        })
    }

    /// Command name bound to a raw scancode, if any.
    pub fn name_for_scancode(&self, scancode: u16) -> Option<&str> {
        self.scancodes.get(&scancode).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codes.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterates `(scancode, command name)` bindings in no particular order.
    pub fn bindings(&self) -> impl Iterator<Item = (u16, &str)> {
        self.scancodes.iter().map(|(code, name)| (*code, name.as_str()))
    }

    /// Number of named commands.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

fn validate_code(name: &str, code: &str) -> Result<(), CatalogError> {
    match STANDARD.decode(code) {
        Ok(bytes) if !bytes.is_empty() => Ok(()),
        Ok(_) => Err(CatalogError::InvalidCode {
            name: name.to_string(),
            reason: "decodes to zero bytes".to_string(),
        }),
        Err(e) => Err(CatalogError::InvalidCode {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_codes_are_valid_base64() {
        for &(_, name, code) in BUILTIN {
            assert!(validate_code(name, code).is_ok(), "bad builtin code for {name}");
        }
    }

    #[test]
    fn test_builtin_scancodes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for &(scancode, _, _) in BUILTIN {
            assert!(seen.insert(scancode), "duplicate scancode {scancode}");
        }
    }

    #[test]
    fn test_volume_up_scancode_resolves_to_command() {
        let catalog = IrccCatalog::default();
        let name = catalog.name_for_scancode(115).unwrap();
        let cmd = catalog.command(name).unwrap();
        assert_eq!(cmd.command_id, "volumeup");
        assert_eq!(cmd.encoded_payload, "AAAAAQAAAAEAAAATAw==");
    }

    #[test]
    fn test_both_enter_scancodes_share_one_command() {
        let catalog = IrccCatalog::default();
        assert_eq!(catalog.name_for_scancode(28), Some("enter"));
        assert_eq!(catalog.name_for_scancode(96), Some("enter"));
    }

    #[test]
    fn test_unmapped_scancode_returns_none() {
        assert_eq!(IrccCatalog::default().name_for_scancode(57), None);
    }

    #[test]
    fn test_command_lookup_is_case_insensitive() {
        assert!(IrccCatalog::default().command("VolumeUp").is_some());
    }

    #[test]
    fn test_override_replaces_code_and_adds_new_command() {
        // Arrange
        let overrides = [("Mute", "AAAAAQAAAAEAAAAUAw=="), ("netflix2", "AAAAAgAAABoAAAB8Aw==")];

        // Act
        let catalog = IrccCatalog::default().with_overrides(overrides).unwrap();

        // Assert
        assert_eq!(catalog.command("mute").unwrap().encoded_payload, "AAAAAQAAAAEAAAAUAw==");
        assert!(catalog.contains("netflix2"));
        assert_eq!(catalog.len(), IrccCatalog::default().len() + 1);
    }

    #[test]
    fn test_override_rejects_invalid_base64() {
        let err = IrccCatalog::default()
            .with_overrides([("power", "not base64!!")])
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidCode { ref name, .. } if name == "power"));
    }

    #[test]
    fn test_override_rejects_empty_name() {
        let err = IrccCatalog::default()
            .with_overrides([("  ", "AAAAAQAAAAEAAAAUAw==")])
            .unwrap_err();
        assert_eq!(err, CatalogError::EmptyName);
    }

    #[test]
    fn test_envelope_wraps_code() {
        let body = envelope("AAAAAQAAAAEAAAAVAw==");
        assert!(body.starts_with("<?xml version=\"1.0\"?>\n<s:Envelope"));
        assert!(body.contains("\n      <IRCCCode>AAAAAQAAAAEAAAAVAw==</IRCCCode>\n"));
        assert!(body.ends_with("</s:Envelope>"));
    }
}

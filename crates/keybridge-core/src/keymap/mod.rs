//! Linux input-event key codes and their canonical names.
//!
//! Values are defined in `linux/input-event-codes.h`.  Names are the
//! constants with the `KEY_` prefix removed, which is also how keys are
//! written in the configuration file:
//!
//! | Name        | Code |
//! |-------------|------|
//! | `ESC`       | 1    |
//! | `A`         | 30   |
//! | `SPACE`     | 57   |
//! | `VOLUMEUP`  | 115  |
//!
//! An IR receiver such as the FLIRC presents itself as a keyboard and emits
//! the same codes, so one table serves both device kinds.
//!
//! Codes missing from the table are still valid key identifiers; they are
//! rendered as `CODE_<n>` and may be written that way in configuration.

use thiserror::Error;

/// Error returned when a configured key name cannot be translated to a code.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeymapError {
    #[error("unknown key name: {0:?}")]
    UnknownName(String),
}

/// `(code, name)` pairs, sorted by code.
const KEY_NAMES: &[(u16, &str)] = &[
    (1, "ESC"),
    (2, "1"),
    (3, "2"),
    (4, "3"),
    (5, "4"),
    (6, "5"),
    (7, "6"),
    (8, "7"),
    (9, "8"),
    (10, "9"),
    (11, "0"),
    (12, "MINUS"),
    (13, "EQUAL"),
    (14, "BACKSPACE"),
    (15, "TAB"),
    (16, "Q"),
    (17, "W"),
    (18, "E"),
    (19, "R"),
    (20, "T"),
    (21, "Y"),
    (22, "U"),
    (23, "I"),
    (24, "O"),
    (25, "P"),
    (26, "LEFTBRACE"),
    (27, "RIGHTBRACE"),
    (28, "ENTER"),
    (29, "LEFTCTRL"),
    (30, "A"),
    (31, "S"),
    (32, "D"),
    (33, "F"),
    (34, "G"),
    (35, "H"),
    (36, "J"),
    (37, "K"),
    (38, "L"),
    (39, "SEMICOLON"),
    (40, "APOSTROPHE"),
    (41, "GRAVE"),
    (42, "LEFTSHIFT"),
    (43, "BACKSLASH"),
    (44, "Z"),
    (45, "X"),
    (46, "C"),
    (47, "V"),
    (48, "B"),
    (49, "N"),
    (50, "M"),
    (51, "COMMA"),
    (52, "DOT"),
    (53, "SLASH"),
    (54, "RIGHTSHIFT"),
    (55, "KPASTERISK"),
    (56, "LEFTALT"),
    (57, "SPACE"),
    (58, "CAPSLOCK"),
    (59, "F1"),
    (60, "F2"),
    (61, "F3"),
    (62, "F4"),
    (63, "F5"),
    (64, "F6"),
    (65, "F7"),
    (66, "F8"),
    (67, "F9"),
    (68, "F10"),
    (69, "NUMLOCK"),
    (70, "SCROLLLOCK"),
    (71, "KP7"),
    (72, "KP8"),
    (73, "KP9"),
    (74, "KPMINUS"),
    (75, "KP4"),
    (76, "KP5"),
    (77, "KP6"),
    (78, "KPPLUS"),
    (79, "KP1"),
    (80, "KP2"),
    (81, "KP3"),
    (82, "KP0"),
    (83, "KPDOT"),
    (87, "F11"),
    (88, "F12"),
    (96, "KPENTER"),
    (97, "RIGHTCTRL"),
    (98, "KPSLASH"),
    (99, "SYSRQ"),
    (100, "RIGHTALT"),
    (102, "HOME"),
    (103, "UP"),
    (104, "PAGEUP"),
    (105, "LEFT"),
    (106, "RIGHT"),
    (107, "END"),
    (108, "DOWN"),
    (109, "PAGEDOWN"),
    (110, "INSERT"),
    (111, "DELETE"),
    (113, "MUTE"),
    (114, "VOLUMEDOWN"),
    (115, "VOLUMEUP"),
    (116, "POWER"),
    (119, "PAUSE"),
    (125, "LEFTMETA"),
    (126, "RIGHTMETA"),
    (127, "COMPOSE"),
    (139, "MENU"),
    (158, "BACK"),
    (163, "NEXTSONG"),
    (164, "PLAYPAUSE"),
    (165, "PREVIOUSSONG"),
    (166, "STOPCD"),
    (168, "REWIND"),
    (172, "HOMEPAGE"),
    (207, "PLAY"),
    (208, "FASTFORWARD"),
];

/// Prefix used for codes that have no entry in the name table.
const RAW_CODE_PREFIX: &str = "CODE_";

/// Returns the canonical name for `code`, if the table knows it.
pub fn name_for_code(code: u16) -> Option<&'static str> {
    KEY_NAMES
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|idx| KEY_NAMES[idx].1)
}

/// Translates a configured key name to its code.
///
/// Accepts the canonical name (`SPACE`), the same name with the kernel's
/// `KEY_` prefix (`KEY_SPACE`), any letter case, and the `CODE_<n>` form for
/// codes outside the table.
///
/// # Errors
///
/// Returns [`KeymapError::UnknownName`] if the name matches none of the above.
pub fn code_for_name(name: &str) -> Result<u16, KeymapError> {
    let upper = name.trim().to_ascii_uppercase();
    let bare = upper.strip_prefix("KEY_").unwrap_or(&upper);

    if let Some(raw) = bare.strip_prefix(RAW_CODE_PREFIX) {
        return raw
            .parse::<u16>()
            .map_err(|_| KeymapError::UnknownName(name.to_string()));
    }

    KEY_NAMES
        .iter()
        .find(|(_, n)| *n == bare)
        .map(|&(c, _)| c)
        .ok_or_else(|| KeymapError::UnknownName(name.to_string()))
}

/// Formats a code that has no table entry.
pub(crate) fn raw_code_name(code: u16) -> String {
    format!("{RAW_CODE_PREFIX}{code}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted_by_code_for_binary_search() {
        assert!(KEY_NAMES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_name_for_code_returns_space() {
        assert_eq!(name_for_code(57), Some("SPACE"));
    }

    #[test]
    fn test_name_for_code_unknown_returns_none() {
        assert_eq!(name_for_code(0), None);
        assert_eq!(name_for_code(999), None);
    }

    #[test]
    fn test_code_for_name_accepts_kernel_prefix_and_lowercase() {
        assert_eq!(code_for_name("KEY_A"), Ok(30));
        assert_eq!(code_for_name("a"), Ok(30));
        assert_eq!(code_for_name(" volumeup "), Ok(115));
    }

    #[test]
    fn test_code_for_name_accepts_raw_code_form() {
        assert_eq!(code_for_name("CODE_240"), Ok(240));
    }

    #[test]
    fn test_code_for_name_rejects_unknown_name() {
        assert_eq!(
            code_for_name("NOT_A_KEY"),
            Err(KeymapError::UnknownName("NOT_A_KEY".to_string()))
        );
        assert!(code_for_name("CODE_x").is_err());
    }

    #[test]
    fn test_every_table_name_round_trips() {
        for &(code, name) in KEY_NAMES {
            assert_eq!(code_for_name(name), Ok(code), "name {name}");
        }
    }
}

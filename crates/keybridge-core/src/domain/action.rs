//! Actions, their configuration syntax, and the key → action table.
//!
//! # Action spec strings
//!
//! Keys are bound to actions in the configuration file with short strings:
//!
//! | Spec              | Action                              |
//! |-------------------|-------------------------------------|
//! | `sound:<file>`    | [`Action::PlaySound`]               |
//! | `random`          | [`Action::PlayRandomSound`]         |
//! | `command:<name>`  | [`Action::SendCommand`]             |
//! | `toggle:<name>`   | [`Action::SideEffect`]              |
//! | `stop`            | [`Action::StopAll`]                 |
//! | `none`            | [`Action::NoOp`]                    |
//!
//! # Resolution
//!
//! [`ActionTable::resolve`] is the action resolver: the designated stop key
//! always resolves to [`Action::StopAll`], explicit entries win next, and
//! every other key gets the table's [`DefaultAction`].  The table is built
//! once at startup and never mutated afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::event::KeyId;

/// Name of an IRCC command in the catalog, e.g. `"volumeup"`.
pub type CommandId = String;

/// What a key press does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Play one specific audio file.
    PlaySound(PathBuf),
    /// Play a uniformly chosen file from the sound pool.
    PlayRandomSound,
    /// Send a named command to the networked appliance.
    SendCommand(CommandId),
    /// Stop every playback.  Never debounced.
    StopAll,
    /// Ask an external subscriber to perform a named side effect.
    SideEffect(String),
    /// Do nothing.
    NoOp,
}

impl Action {
    /// Parses an action spec string.  `sound:` paths are joined onto
    /// `sound_root` unless already absolute.
    ///
    /// # Errors
    ///
    /// Returns [`ActionParseError`] for empty specs, unknown kinds, and kinds
    /// that require an argument but have none.
    pub fn parse_spec(spec: &str, sound_root: &Path) -> Result<Self, ActionParseError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ActionParseError::Empty);
        }

        let (kind, arg) = match spec.split_once(':') {
            Some((kind, arg)) => (kind.trim(), Some(arg.trim())),
            None => (spec, None),
        };

        let required = |arg: Option<&str>| -> Result<String, ActionParseError> {
            match arg {
                Some(a) if !a.is_empty() => Ok(a.to_string()),
                _ => Err(ActionParseError::MissingArgument(kind.to_string())),
            }
        };

        match (kind.to_ascii_lowercase().as_str(), arg) {
            ("sound", arg) => Ok(Action::PlaySound(sound_root.join(required(arg)?))),
            ("command", arg) => Ok(Action::SendCommand(required(arg)?.to_ascii_lowercase())),
            ("toggle", arg) => Ok(Action::SideEffect(required(arg)?)),
            ("random", None) => Ok(Action::PlayRandomSound),
            ("stop", None) => Ok(Action::StopAll),
            ("none", None) => Ok(Action::NoOp),
            ("random" | "stop" | "none", Some(_)) => {
                Err(ActionParseError::UnexpectedArgument(kind.to_string()))
            }
            _ => Err(ActionParseError::UnknownKind(kind.to_string())),
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Action::StopAll)
    }

    /// Short human-readable form used in logs and telemetry.
    pub fn label(&self) -> String {
        match self {
            Action::PlaySound(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                format!("sound:{name}")
            }
            Action::PlayRandomSound => "random".to_string(),
            Action::SendCommand(id) => format!("command:{id}"),
            Action::StopAll => "stop".to_string(),
            Action::SideEffect(name) => format!("toggle:{name}"),
            Action::NoOp => "none".to_string(),
        }
    }
}

/// Error returned when an action spec string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionParseError {
    #[error("empty action spec")]
    Empty,
    #[error("unknown action kind {0:?}")]
    UnknownKind(String),
    #[error("action {0:?} requires an argument, e.g. \"{0}:<name>\"")]
    MissingArgument(String),
    #[error("action {0:?} does not take an argument")]
    UnexpectedArgument(String),
}

/// Fallback for keys with no explicit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultAction {
    /// Unmapped keys play a random sound.
    Random,
    /// Unmapped keys are ignored.
    #[default]
    None,
}

impl DefaultAction {
    fn to_action(self) -> Action {
        match self {
            DefaultAction::Random => Action::PlayRandomSound,
            DefaultAction::None => Action::NoOp,
        }
    }
}

/// Immutable key → action lookup.
#[derive(Debug, Clone)]
pub struct ActionTable {
    entries: HashMap<KeyId, Action>,
    stop_key: Option<KeyId>,
    default: DefaultAction,
}

impl ActionTable {
    pub fn builder(default: DefaultAction) -> ActionTableBuilder {
        ActionTableBuilder {
            table: ActionTable {
                entries: HashMap::new(),
                stop_key: None,
                default,
            },
        }
    }

    /// Resolves `key_id` to the action it triggers.
    pub fn resolve(&self, key_id: KeyId) -> Action {
        if self.stop_key == Some(key_id) {
            return Action::StopAll;
        }
        self.entries
            .get(&key_id)
            .cloned()
            .unwrap_or_else(|| self.default.to_action())
    }

    pub fn stop_key(&self) -> Option<KeyId> {
        self.stop_key
    }

    pub fn default_action(&self) -> DefaultAction {
        self.default
    }

    /// Number of explicit entries (the stop key is not counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates explicit entries in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = (&KeyId, &Action)> {
        self.entries.iter()
    }
}

/// Accumulates entries before freezing them into an [`ActionTable`].
#[derive(Debug)]
pub struct ActionTableBuilder {
    table: ActionTable,
}

impl ActionTableBuilder {
    pub fn stop_key(mut self, key_id: KeyId) -> Self {
        self.table.stop_key = Some(key_id);
        self
    }

    /// Adds or replaces the entry for `key_id`.
    pub fn entry(mut self, key_id: KeyId, action: Action) -> Self {
        self.table.entries.insert(key_id, action);
        self
    }

    /// Adds the entry only if `key_id` has none yet.
    pub fn entry_if_absent(mut self, key_id: KeyId, action: Action) -> Self {
        self.table.entries.entry(key_id).or_insert(action);
        self
    }

    pub fn build(self) -> ActionTable {
        self.table
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

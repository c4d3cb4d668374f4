//! Input capture infrastructure.
//!
//! On Linux the device is read through evdev: each `read()` yields
//! `(type, code, value)` triples.  Only `EV_KEY` events with value `1`
//! (key down) are of interest; releases (`0`) and auto-repeat (`2`) are
//! dropped here before anything reaches the dispatcher.
//!
//! # Device lifecycle
//!
//! A device is acquired in two steps so the supervisor can report where it
//! is: [`DeviceProvider::locate`] resolves a [`DeviceSpec`] to a node path,
//! then [`DeviceProvider::open`] turns that path into an [`EventSource`].
//! An event source is finite: it ends when the device is unplugged, and a
//! fresh one must be acquired afterwards.
//!
//! # Testability
//!
//! Both traits are implemented by [`mock::MockDeviceProvider`], which replays
//! scripted sessions without a real device.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use keybridge_core::{KeyEvent, KeyId};
use thiserror::Error;

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux;

/// `EV_KEY` from `linux/input-event-codes.h`.
pub const EV_KEY: u16 = 0x01;

/// Key event value for a press.
pub const KEY_VALUE_DOWN: i32 = 1;

/// One raw event as read from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    pub event_type: u16,
    pub code: u16,
    pub value: i32,
}

impl RawInputEvent {
    /// Convenience constructor for an `EV_KEY` event.
    pub const fn key(code: u16, value: i32) -> Self {
        Self {
            event_type: EV_KEY,
            code,
            value,
        }
    }

    pub fn is_key_down(&self) -> bool {
        self.event_type == EV_KEY && self.value == KEY_VALUE_DOWN
    }

    /// Converts a key-down into a [`KeyEvent`] stamped with `observed_at`.
    /// Every other event yields `None`.
    pub fn to_key_event(&self, observed_at: Instant) -> Option<KeyEvent> {
        self.is_key_down()
            .then(|| KeyEvent::new(KeyId::from_code(self.code), observed_at))
    }
}

/// Error type for device acquisition and reads.
#[derive(Debug, Error)]
pub enum InputError {
    /// The device could not be found or opened.  Retried on the poll cadence.
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device went away mid-stream (unplugged, `ENODEV`, read error).
    #[error("input device disconnected: {0}")]
    Disconnected(String),
}

/// How the configured device is identified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    /// A device node such as `/dev/input/by-id/usb-flirc.tv_flirc-if01-event-kbd`.
    Path(PathBuf),
    /// The device name reported by the kernel, e.g. `"flirc.tv flirc"`.
    Name(String),
}

impl DeviceSpec {
    /// Identifiers starting with `/` are paths; anything else is a name.
    pub fn parse(identifier: &str) -> Self {
        let identifier = identifier.trim();
        if identifier.starts_with('/') {
            DeviceSpec::Path(PathBuf::from(identifier))
        } else {
            DeviceSpec::Name(identifier.to_string())
        }
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSpec::Path(path) => write!(f, "{}", path.display()),
            DeviceSpec::Name(name) => write!(f, "name {name:?}"),
        }
    }
}

/// A live stream of raw events from one acquired device.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next raw event.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Disconnected`] when the device goes away.
    async fn next_event(&mut self) -> Result<Option<RawInputEvent>, InputError>;

    /// Human-readable device name for logs.
    fn device_name(&self) -> &str;
}

/// Locates and opens input devices.
///
/// The production implementation uses evdev; tests use
/// [`mock::MockDeviceProvider`].
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Resolves `spec` to a device node.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::DeviceUnavailable`] when no matching device is
    /// present.
    async fn locate(&self, spec: &DeviceSpec) -> Result<PathBuf, InputError>;

    /// Opens the device at `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::DeviceUnavailable`] on permission or I/O errors.
    async fn open(&self, path: &Path) -> Result<Box<dyn EventSource>, InputError>;
}

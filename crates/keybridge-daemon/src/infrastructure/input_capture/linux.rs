//! evdev-backed device provider (Linux only).
//!
//! Devices are matched either by node path or by the name the kernel
//! reports (`evdev::Device::name`).  Paths under `/dev/input/by-id/` are
//! stable across reboots and preferred for keyboards; IR receivers are
//! usually easier to find by name.
//!
//! Reads go through `evdev`'s tokio event stream.  Any read error, most
//! commonly `ENODEV` after the USB device is unplugged, is reported as
//! [`InputError::Disconnected`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use evdev::{Device, EventStream};
use tracing::debug;

use super::{DeviceProvider, DeviceSpec, EventSource, InputError, RawInputEvent};

/// [`DeviceProvider`] for real `/dev/input/event*` nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvdevProvider;

impl EvdevProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceProvider for EvdevProvider {
    async fn locate(&self, spec: &DeviceSpec) -> Result<PathBuf, InputError> {
        match spec {
            DeviceSpec::Path(path) => {
                if path.exists() {
                    Ok(path.clone())
                } else {
                    Err(InputError::DeviceUnavailable(format!(
                        "{} does not exist",
                        path.display()
                    )))
                }
            }
            DeviceSpec::Name(wanted) => evdev::enumerate()
                .find_map(|(path, device)| {
                    let name = device.name().unwrap_or_default();
                    debug!("evdev: candidate {:?} ({})", path, name);
                    (name == wanted.as_str()).then_some(path)
                })
                .ok_or_else(|| {
                    InputError::DeviceUnavailable(format!("no input device named {wanted:?}"))
                }),
        }
    }

    async fn open(&self, path: &Path) -> Result<Box<dyn EventSource>, InputError> {
        let device = Device::open(path).map_err(|e| {
            InputError::DeviceUnavailable(format!("failed to open {}: {e}", path.display()))
        })?;
        let name = device.name().unwrap_or("unknown").to_string();
        let stream = device.into_event_stream().map_err(|e| {
            InputError::DeviceUnavailable(format!(
                "failed to create event stream for {}: {e}",
                path.display()
            ))
        })?;

        Ok(Box::new(EvdevSource { stream, name }))
    }
}

/// Async event stream over one opened device.
pub struct EvdevSource {
    stream: EventStream,
    name: String,
}

#[async_trait]
impl EventSource for EvdevSource {
    async fn next_event(&mut self) -> Result<Option<RawInputEvent>, InputError> {
        let event = self
            .stream
            .next_event()
            .await
            .map_err(|e| InputError::Disconnected(e.to_string()))?;

        Ok(Some(RawInputEvent {
            event_type: event.event_type().0,
            code: event.code(),
            value: event.value(),
        }))
    }

    fn device_name(&self) -> &str {
        &self.name
    }
}

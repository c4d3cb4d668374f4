//! ActionExecutor: performs a resolved [`Action`].
//!
//! The executor owns the two effectors: the [`AudioPlayer`] (and with it
//! every playback handle) and the remote-control path (the IRCC catalog plus
//! a [`CommandSender`]).  Either may be absent; an action that needs a
//! missing effector fails with [`ExecError::Unsupported`].  Side effects are
//! handed to the bus through the [`TelemetryPublisher`].

use std::path::PathBuf;
use std::sync::Arc;

use keybridge_core::{Action, IrccCatalog, KeyId};
use thiserror::Error;

use super::audio::AudioPlayer;
use super::outbound::CommandSender;
use super::telemetry::TelemetryPublisher;

/// Error type for executing one action.  Always scoped to a single event.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The referenced sound file (or the whole pool) is missing.
    #[error("resource missing: {0}")]
    ResourceMissing(String),

    /// The effector process could not be started, or died at once.
    #[error("failed to start effector for {target}: {reason}")]
    SpawnFailed { target: String, reason: String },

    /// Delivery failed after every attempt.
    #[error("outbound command {command} failed after {attempts} attempt(s)")]
    OutboundFailed { command: String, attempts: u32 },

    /// The action needs an effector or command that is not configured.
    #[error("unsupported action: {0}")]
    Unsupported(String),

    /// A side effect could not be handed to the telemetry bus.
    #[error("side effect {name} not delivered: {reason}")]
    BusUnavailable { name: String, reason: String },
}

/// What an action did, for logs and telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Played(PathBuf),
    Stopped(usize),
    Sent(String),
    SideEffect(String),
    Nothing,
}

/// The remote-control effector: command catalog and delivery.
pub struct RemoteControl {
    pub catalog: IrccCatalog,
    pub sender: CommandSender,
}

/// Executes actions against the configured effectors.
pub struct ActionExecutor {
    audio: Option<AudioPlayer>,
    remote: Option<RemoteControl>,
    telemetry: Arc<TelemetryPublisher>,
}

impl ActionExecutor {
    pub fn new(
        audio: Option<AudioPlayer>,
        remote: Option<RemoteControl>,
        telemetry: Arc<TelemetryPublisher>,
    ) -> Self {
        Self {
            audio,
            remote,
            telemetry,
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Stops every playback.  Returns 0 when audio is not configured.
    pub fn stop_all(&mut self) -> usize {
        self.audio.as_mut().map(AudioPlayer::stop_all).unwrap_or(0)
    }

    /// Runs `action`, triggered by `key_id`, to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] describing why the effect did not happen.
    pub async fn execute(&mut self, action: &Action, key_id: KeyId) -> Result<ExecOutcome, ExecError> {
        match action {
            Action::StopAll => Ok(ExecOutcome::Stopped(self.stop_all())),
            Action::NoOp => Ok(ExecOutcome::Nothing),
            Action::PlaySound(path) => {
                let audio = self.audio_player()?;
                audio.play(path).await?;
                Ok(ExecOutcome::Played(path.clone()))
            }
            Action::PlayRandomSound => {
                let audio = self.audio_player()?;
                let path = audio.play_random().await?;
                Ok(ExecOutcome::Played(path))
            }
            Action::SendCommand(command_id) => {
                let remote = self
                    .remote
                    .as_ref()
                    .ok_or_else(|| ExecError::Unsupported("no IRCC target configured".to_string()))?;
                let command = remote.catalog.command(command_id).ok_or_else(|| {
                    ExecError::Unsupported(format!("unknown IRCC command {command_id:?}"))
                })?;

                if remote.sender.send(&command).await {
                    Ok(ExecOutcome::Sent(command.command_id))
                } else {
                    Err(ExecError::OutboundFailed {
                        command: command.command_id,
                        attempts: remote.sender.policy().retry_count.max(1),
                    })
                }
            }
            Action::SideEffect(name) => {
                self.telemetry
                    .publish_toggle(name, key_id)
                    .map_err(|e| ExecError::BusUnavailable {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(ExecOutcome::SideEffect(name.clone()))
            }
        }
    }

    fn audio_player(&mut self) -> Result<&mut AudioPlayer, ExecError> {
        self.audio
            .as_mut()
            .ok_or_else(|| ExecError::Unsupported("audio playback is not configured".to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! External player process (`paplay` by default).
//!
//! The command line is `<player…> --volume=<v> <file>` with stdin, stdout
//! and stderr detached.  Children are spawned with `kill_on_drop`, so a
//! dropped handle never leaves a sound playing.

use std::io;
use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::application::audio::{AudioSpawner, Playback};

/// `paplay` volume scale: 65536 is 100 %.  45875 is roughly 70 %.
pub const DEFAULT_VOLUME: u32 = 45875;

/// Spawns one player process per playback.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    command: Vec<String>,
    volume: u32,
}

impl ProcessSpawner {
    /// `command` is the program followed by any fixed arguments.  Must not be
    /// empty; configuration validation guarantees this.
    pub fn new(command: Vec<String>, volume: u32) -> Self {
        Self { command, volume }
    }

    fn build(&self, path: &Path) -> io::Result<Command> {
        let (program, fixed_args) = self.command.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "audio player command is empty")
        })?;
        let mut cmd = Command::new(program);
        cmd.args(fixed_args)
            .arg(format!("--volume={}", self.volume))
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

impl AudioSpawner for ProcessSpawner {
    fn spawn(&self, path: &Path) -> io::Result<Box<dyn Playback>> {
        let child = self.build(path)?.spawn()?;
        debug!(pid = ?child.id(), "spawned player for {}", path.display());
        Ok(Box::new(ProcessPlayback { child }))
    }
}

/// Handle on a running player process.
#[derive(Debug)]
pub struct ProcessPlayback {
    child: Child,
}

impl Playback for ProcessPlayback {
    fn try_status(&mut self) -> io::Result<Option<bool>> {
        Ok(self.child.try_wait()?.map(|status| status.success()))
    }

    fn terminate(&mut self) -> io::Result<()> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Already reaped.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Audio arbitration: at most one playback in flight.
//!
//! Every `play` first stops whatever is running, then spawns a new player
//! process.  A press of the stop key terminates everything.  Handles are
//! owned here and nowhere else; dropping the player (normal shutdown, panic
//! unwinding) drops the handles, and the process adapter kills the child on
//! drop.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use super::executor::ExecError;

/// Extensions eligible for the random sound pool.
const POOL_EXTENSIONS: &[&str] = &["wav", "mp3"];

/// One running playback.
pub trait Playback: Send {
    /// Non-blocking exit check: `Ok(None)` while running, `Ok(Some(success))`
    /// once the process has exited.
    fn try_status(&mut self) -> io::Result<Option<bool>>;

    /// Requests termination.  Must not block.
    fn terminate(&mut self) -> io::Result<()>;
}

/// Starts playbacks.  The production implementation spawns `paplay`.
pub trait AudioSpawner: Send + Sync {
    /// # Errors
    ///
    /// Returns the I/O error from the spawn attempt.
    fn spawn(&self, path: &Path) -> io::Result<Box<dyn Playback>>;
}

/// Audio files eligible for random playback, fixed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoundPool {
    files: Vec<PathBuf>,
}

impl SoundPool {
    /// Collects `*.wav` and `*.mp3` files directly inside `dir`, sorted.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if `dir` cannot be read.
    pub fn scan(dir: &Path) -> io::Result<Self> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let eligible = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| POOL_EXTENSIONS.iter().any(|ok| e.eq_ignore_ascii_case(ok)))
                .unwrap_or(false);
            if eligible && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(Self { files })
    }

    pub fn from_files(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Uniform random choice; `None` for an empty pool.
    pub fn choose(&self) -> Option<&Path> {
        self.files
            .choose(&mut rand::thread_rng())
            .map(PathBuf::as_path)
    }
}

/// Owns every playback handle and enforces at-most-one.
pub struct AudioPlayer {
    spawner: Arc<dyn AudioSpawner>,
    pool: SoundPool,
    /// How long to wait after spawning before checking for an early failure.
    grace: Duration,
    active: Vec<Box<dyn Playback>>,
}

impl AudioPlayer {
    pub fn new(spawner: Arc<dyn AudioSpawner>, pool: SoundPool, grace: Duration) -> Self {
        Self {
            spawner,
            pool,
            grace,
            active: Vec::new(),
        }
    }

    pub fn pool(&self) -> &SoundPool {
        &self.pool
    }

    /// Handles still tracked.  At most one after any `play`.
    pub fn tracked(&self) -> usize {
        self.active.len()
    }

    /// Terminates every tracked playback that is still running and forgets
    /// all handles.  Returns how many were terminated.  Idempotent.
    pub fn stop_all(&mut self) -> usize {
        let mut stopped = 0;
        for mut playback in self.active.drain(..) {
            match playback.try_status() {
                Ok(None) => match playback.terminate() {
                    Ok(()) => stopped += 1,
                    Err(e) => warn!("failed to terminate playback: {e}"),
                },
                Ok(Some(_)) => {}
                Err(e) => warn!("failed to poll playback: {e}"),
            }
        }
        if stopped > 0 {
            debug!("stopped {stopped} playback(s)");
        }
        stopped
    }

    /// Plays `path`, replacing any current playback.
    ///
    /// # Errors
    ///
    /// - [`ExecError::ResourceMissing`] if `path` is not a file.  Nothing is
    ///   stopped in that case.
    /// - [`ExecError::SpawnFailed`] if the player cannot be started or exits
    ///   unsuccessfully within the grace period.
    pub async fn play(&mut self, path: &Path) -> Result<(), ExecError> {
        if !path.is_file() {
            return Err(ExecError::ResourceMissing(path.display().to_string()));
        }

        self.stop_all();

        let mut playback = self.spawner.spawn(path).map_err(|e| ExecError::SpawnFailed {
            target: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if !self.grace.is_zero() {
            tokio::time::sleep(self.grace).await;
            if let Ok(Some(false)) = playback.try_status() {
                return Err(ExecError::SpawnFailed {
                    target: path.display().to_string(),
                    reason: "player exited with failure".to_string(),
                });
            }
        }

        self.active.push(playback);
        Ok(())
    }

    /// Plays a uniformly chosen file from the pool and returns it.
    ///
    /// # Errors
    ///
    /// [`ExecError::ResourceMissing`] for an empty pool, otherwise as
    /// [`AudioPlayer::play`].
    pub async fn play_random(&mut self) -> Result<PathBuf, ExecError> {
        let path = self
            .pool
            .choose()
            .map(Path::to_path_buf)
            .ok_or_else(|| ExecError::ResourceMissing("sound pool is empty".to_string()))?;
        self.play(&path).await?;
        Ok(path)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Mock device provider for unit and integration testing.
//!
//! Replays scripted [`MockSession`]s without `/dev/input`.  Each successful
//! `open` consumes one session; once the script runs out, the device is
//! reported as unavailable, exactly like an unplugged receiver.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{DeviceProvider, DeviceSpec, EventSource, InputError, RawInputEvent};

/// Node path reported by [`MockDeviceProvider::locate`].
pub const MOCK_DEVICE_PATH: &str = "/dev/input/mock0";

/// One scripted step of a session.
#[derive(Debug, Clone)]
pub enum MockStep {
    Event(RawInputEvent),
    Pause(Duration),
}

/// What happens after the last scripted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The stream ends cleanly.
    Eof,
    /// The read fails as if the device was unplugged.
    Disconnect,
    /// The stream stays open with no further events.
    Hang,
}

/// A scripted acquisition: events then an ending.
#[derive(Debug, Clone)]
pub struct MockSession {
    steps: VecDeque<MockStep>,
    end: SessionEnd,
}

impl MockSession {
    /// An empty session that hangs after its steps.
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            end: SessionEnd::Hang,
        }
    }

    /// Appends a full press: down then up.
    pub fn press(self, code: u16) -> Self {
        self.event(RawInputEvent::key(code, 1))
            .event(RawInputEvent::key(code, 0))
    }

    pub fn event(mut self, event: RawInputEvent) -> Self {
        self.steps.push_back(MockStep::Event(event));
        self
    }

    pub fn pause(mut self, duration: Duration) -> Self {
        self.steps.push_back(MockStep::Pause(duration));
        self
    }

    pub fn then_disconnect(mut self) -> Self {
        self.end = SessionEnd::Disconnect;
        self
    }

    pub fn then_eof(mut self) -> Self {
        self.end = SessionEnd::Eof;
        self
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct MockState {
    sessions: VecDeque<MockSession>,
    absent_polls: u32,
    locate_attempts: Vec<tokio::time::Instant>,
    opened: usize,
}

/// A [`DeviceProvider`] that serves scripted sessions.
#[derive(Debug, Default)]
pub struct MockDeviceProvider {
    state: Mutex<MockState>,
}

impl MockDeviceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a session for the next successful `open`.
    pub fn push_session(&self, session: MockSession) {
        self.state
            .lock()
            .expect("lock poisoned")
            .sessions
            .push_back(session);
    }

    /// Makes the next `polls` locate attempts fail even if sessions are queued.
    pub fn absent_for(&self, polls: u32) {
        self.state.lock().expect("lock poisoned").absent_polls = polls;
    }

    /// Times (on the tokio clock) at which `locate` was called.
    pub fn locate_attempts(&self) -> Vec<tokio::time::Instant> {
        self.state
            .lock()
            .expect("lock poisoned")
            .locate_attempts
            .clone()
    }

    /// Number of sessions handed out.
    pub fn open_count(&self) -> usize {
        self.state.lock().expect("lock poisoned").opened
    }
}

#[async_trait]
impl DeviceProvider for MockDeviceProvider {
    async fn locate(&self, spec: &DeviceSpec) -> Result<PathBuf, InputError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.locate_attempts.push(tokio::time::Instant::now());

        if state.absent_polls > 0 {
            state.absent_polls -= 1;
            return Err(InputError::DeviceUnavailable(format!("{spec} not present")));
        }
        if state.sessions.is_empty() {
            return Err(InputError::DeviceUnavailable(format!("{spec} not present")));
        }
        Ok(PathBuf::from(MOCK_DEVICE_PATH))
    }

    async fn open(&self, path: &Path) -> Result<Box<dyn EventSource>, InputError> {
        let mut state = self.state.lock().expect("lock poisoned");
        let session = state.sessions.pop_front().ok_or_else(|| {
            InputError::DeviceUnavailable(format!("{} vanished before open", path.display()))
        })?;
        state.opened += 1;
        Ok(Box::new(MockEventSource { session }))
    }
}

/// Event source replaying one [`MockSession`].
#[derive(Debug)]
pub struct MockEventSource {
    session: MockSession,
}

impl MockEventSource {
    pub fn new(session: MockSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn next_event(&mut self) -> Result<Option<RawInputEvent>, InputError> {
        while let Some(step) = self.session.steps.pop_front() {
            match step {
                MockStep::Event(event) => return Ok(Some(event)),
                MockStep::Pause(duration) => tokio::time::sleep(duration).await,
            }
        }

        match self.session.end {
            SessionEnd::Eof => Ok(None),
            SessionEnd::Disconnect => Err(InputError::Disconnected(
                "No such device (os error 19)".to_string(),
            )),
            SessionEnd::Hang => std::future::pending().await,
        }
    }

    fn device_name(&self) -> &str {
        "mock keyboard"
    }
}

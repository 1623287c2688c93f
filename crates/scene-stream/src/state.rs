//! Inspectable polling state

use std::fmt;

/// Where the polling state machine currently is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    RequestingAccess,
    Fetching,
    AwaitingPublish,
    Delaying,
    Stopped,
    Failed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::RequestingAccess => "Requesting access",
            Phase::Fetching => "Fetching a scene",
            Phase::AwaitingPublish => "Waiting to publish",
            Phase::Delaying => "Waiting for next poll",
            Phase::Stopped => "Stopped",
            Phase::Failed => "Failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Last capture failure, tagged with the phase it happened in
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollFailure {
    pub phase: Phase,
    pub message: String,
}

impl fmt::Display for PollFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.phase, self.message)
    }
}

/// Point-in-time view of a coordinator, for status surfaces
#[derive(Clone, Debug, PartialEq)]
pub struct PollStatus {
    pub phase: Phase,
    pub revision: u64,
    pub polling: bool,
    pub last_error: Option<PollFailure>,
    /// Raw payload size of the current snapshot
    pub scene_size: Option<usize>,
    /// Object count of the current snapshot, if it decodes
    pub object_count: Option<usize>,
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "State: {}", self.phase)?;
        match &self.last_error {
            Some(err) => writeln!(f, "Last Error: {err}")?,
            None => writeln!(f, "Last Error: none")?,
        }
        write!(f, "Scene: ")?;
        match (self.object_count, self.scene_size) {
            (Some(count), Some(size)) => write!(f, "{count} objects ({size} bytes)")?,
            (None, Some(size)) => write!(f, "undecodable ({size} bytes)")?,
            _ => write!(f, "none")?,
        }
        write!(f, " | revision {}", self.revision)
    }
}

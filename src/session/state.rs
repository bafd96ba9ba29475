use serde::Serialize;
use std::fmt;

use crate::error::SessionError;

/// Lifecycle of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Never connected
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    /// Whether `connect()` may start a new session from this state
    pub fn can_connect(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the UI reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,

    /// True while at least one model buffer is playing or queued
    pub is_speaking: bool,

    /// Output loudness in [0, 1]
    pub volume: f32,

    /// Last fatal error; cleared by the next `connect()`
    pub error: Option<SessionError>,

    /// Length of the transcript history
    pub turns: usize,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_preconditions() {
        assert!(SessionState::Idle.can_connect());
        assert!(SessionState::Closed.can_connect());
        assert!(SessionState::Failed.can_connect());
        assert!(!SessionState::Connecting.can_connect());
        assert!(!SessionState::Open.can_connect());
        assert!(!SessionState::Closing.can_connect());
    }

    #[test]
    fn test_default_snapshot() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.state, SessionState::Idle);
        assert!(!snapshot.is_connected());
        assert_eq!(snapshot.volume, 0.0);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Unique session identifier (e.g., "live-6f1c...")
    pub session_id: Option<String>,

    /// Whether the session is currently open
    pub is_connected: bool,

    /// When the session was opened
    pub started_at: Option<DateTime<Utc>>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Audio frames sent to the live service
    pub frames_sent: u64,

    /// Synthesized audio buffers scheduled for playback
    pub buffers_scheduled: u64,

    /// Barge-ins handled
    pub interruptions: u64,

    /// Transcript turns appended to the history
    pub turns: u64,
}

/// Counters shared between the controller and its session task
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub frames_sent: AtomicU64,
    pub buffers_scheduled: AtomicU64,
    pub interruptions: AtomicU64,
    pub turns: AtomicU64,
}

impl SessionCounters {
    pub fn reset(&self) {
        self.frames_sent.store(0, Ordering::SeqCst);
        self.buffers_scheduled.store(0, Ordering::SeqCst);
        self.interruptions.store(0, Ordering::SeqCst);
        self.turns.store(0, Ordering::SeqCst);
    }
}

/// Identity and wall-clock span of the current (or last) session
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionWindow {
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionWindow {
    pub fn open(session_id: String) -> Self {
        Self {
            session_id: Some(session_id),
            started_at: Some(Utc::now()),
            ended_at: None,
        }
    }

    pub fn close(&mut self) {
        if self.started_at.is_some() && self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn duration_secs(&self) -> f64 {
        match self.started_at {
            Some(started) => {
                let end = self.ended_at.unwrap_or_else(Utc::now);
                end.signed_duration_since(started).num_milliseconds() as f64 / 1000.0
            }
            None => 0.0,
        }
    }

    pub fn stats(&self, is_connected: bool, counters: &SessionCounters) -> SessionStats {
        SessionStats {
            session_id: self.session_id.clone(),
            is_connected,
            started_at: self.started_at,
            duration_secs: self.duration_secs(),
            frames_sent: counters.frames_sent.load(Ordering::SeqCst),
            buffers_scheduled: counters.buffers_scheduled.load(Ordering::SeqCst),
            interruptions: counters.interruptions.load(Ordering::SeqCst),
            turns: counters.turns.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_never_opened() {
        let window = SessionWindow::default();
        let stats = window.stats(false, &SessionCounters::default());
        assert!(stats.session_id.is_none());
        assert_eq!(stats.duration_secs, 0.0);
    }

    #[test]
    fn test_window_close_is_idempotent() {
        let mut window = SessionWindow::open("live-test".to_string());
        window.close();
        let first_end = window.ended_at;
        window.close();
        assert_eq!(window.ended_at, first_end);
        assert!(window.duration_secs() >= 0.0);
    }

    #[test]
    fn test_counters_reset() {
        let counters = SessionCounters::default();
        counters.frames_sent.fetch_add(3, Ordering::SeqCst);
        counters.turns.fetch_add(1, Ordering::SeqCst);
        counters.reset();

        let stats = SessionWindow::default().stats(false, &counters);
        assert_eq!(stats.frames_sent, 0);
        assert_eq!(stats.turns, 0);
    }
}

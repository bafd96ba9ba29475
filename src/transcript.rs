use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Model => write!(f, "model"),
        }
    }
}

/// One finished utterance in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    /// Normalized text, never empty
    pub text: String,

    /// Who spoke
    pub sender: Speaker,

    /// When the turn was finalized
    pub timestamp: DateTime<Utc>,
}

/// Collects transcription deltas until the service signals turn completion
///
/// Fragments are appended, never replaced: the service sends increments, not
/// running totals.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    pending_user: String,
    pending_model: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fragment(&mut self, speaker: Speaker, fragment: &str) {
        match speaker {
            Speaker::User => self.pending_user.push_str(fragment),
            Speaker::Model => self.pending_model.push_str(fragment),
        }
    }

    pub fn pending(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::User => &self.pending_user,
            Speaker::Model => &self.pending_model,
        }
    }

    /// Close the current turn
    ///
    /// Emits user then model, skipping whichever is blank, all stamped with
    /// `timestamp`. Both pending buffers are cleared either way.
    pub fn finalize(&mut self, timestamp: DateTime<Utc>) -> Vec<TranscriptTurn> {
        let user = normalize_text(&std::mem::take(&mut self.pending_user));
        let model = normalize_text(&std::mem::take(&mut self.pending_model));

        let turns: Vec<TranscriptTurn> = [(Speaker::User, user), (Speaker::Model, model)]
            .into_iter()
            .filter(|(_, text)| !text.is_empty())
            .map(|(sender, text)| TranscriptTurn {
                text,
                sender,
                timestamp,
            })
            .collect();

        debug!("Turn complete: {} transcript turn(s)", turns.len());

        turns
    }

    /// Drop any partial text
    pub fn reset(&mut self) {
        self.pending_user.clear();
        self.pending_model.clear();
    }
}

/// Trim and collapse whitespace runs to single spaces
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hi \n there  "), "Hi there");
        assert_eq!(normalize_text(" \t\n"), "");
    }

    #[test]
    fn test_pending_is_appended() {
        let mut aggregator = TranscriptAggregator::new();
        aggregator.push_fragment(Speaker::User, "Hel");
        aggregator.push_fragment(Speaker::User, "lo");
        assert_eq!(aggregator.pending(Speaker::User), "Hello");
        assert_eq!(aggregator.pending(Speaker::Model), "");
    }

    #[test]
    fn test_speaker_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Speaker::Model).unwrap(), "\"model\"");
    }
}

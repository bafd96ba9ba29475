//! Error taxonomy for live sessions

use thiserror::Error;

/// Errors surfaced by the session controller
///
/// `Device`, `ChannelOpen` and `ChannelRuntime` are fatal to the current session and are
/// shown to the user exactly once. `TransientStop` and `Payload` are only ever logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Microphone or speaker unavailable, or access denied
    #[error("Audio device error: {0}")]
    Device(String),

    /// Remote channel rejected the configuration or failed to open
    #[error("Failed to open live session: {0}")]
    ChannelOpen(String),

    /// Remote channel failed after it was open
    #[error("Connection error detected: {0}")]
    ChannelRuntime(String),

    /// Stopping a finished buffer or closing a closed channel
    #[error("Stop failed: {0}")]
    TransientStop(String),

    /// Malformed inbound audio payload
    #[error("Invalid audio payload: {0}")]
    Payload(String),

    /// `connect()` called while a session is connecting or open
    #[error("A session is already active")]
    AlreadyActive,

    /// `disconnect()` ran while `connect()` was still acquiring
    #[error("Connect cancelled by disconnect")]
    Cancelled,
}

impl SessionError {
    /// Whether this error ends the session and must be shown to the user
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Device(_) | SessionError::ChannelOpen(_) | SessionError::ChannelRuntime(_)
        )
    }

    pub(crate) fn device(err: anyhow::Error) -> Self {
        SessionError::Device(format!("{:#}", err))
    }

    pub(crate) fn channel_open(err: anyhow::Error) -> Self {
        SessionError::ChannelOpen(format!("{:#}", err))
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SessionError::Device("no mic".into()).is_fatal());
        assert!(SessionError::ChannelOpen("rejected".into()).is_fatal());
        assert!(SessionError::ChannelRuntime("reset".into()).is_fatal());
        assert!(!SessionError::TransientStop("already ended".into()).is_fatal());
        assert!(!SessionError::Payload("odd length".into()).is_fatal());
        assert!(!SessionError::AlreadyActive.is_fatal());
        assert!(!SessionError::Cancelled.is_fatal());
    }

    #[test]
    fn test_context_chain_is_kept() {
        let err = anyhow::anyhow!("permission denied").context("Failed to open input device");
        let session_err = SessionError::device(err);
        assert_eq!(
            session_err.to_string(),
            "Audio device error: Failed to open input device: permission denied"
        );
    }
}

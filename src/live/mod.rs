//! Contract with the remote conversational speech service
//!
//! The session only sees `LiveConnector` (open a channel) and `LiveSink` (send
//! audio, close). Everything the service says comes back as `LiveEvent`s on an
//! mpsc receiver, in arrival order.

pub mod gemini;
pub mod messages;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::audio::PcmChunk;
use crate::persona::{PersonaConfig, VoiceName};

pub use gemini::GeminiConnector;

/// What the remote channel is opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    pub voice_name: VoiceName,
    pub system_instruction: String,
    /// Ask the service to transcribe the user's speech
    pub input_transcription: bool,
    /// Ask the service to transcribe its own speech
    pub output_transcription: bool,
}

impl From<&PersonaConfig> for LiveConfig {
    fn from(persona: &PersonaConfig) -> Self {
        Self {
            voice_name: persona.voice_name,
            system_instruction: persona.system_instruction.clone(),
            input_transcription: true,
            output_transcription: true,
        }
    }
}

/// Inline synthesized audio, still encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAudio {
    /// Base64-encoded PCM16 LE bytes
    pub data: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// One server message; any combination of fields may be set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMessage {
    /// Delta of the user's speech transcription
    pub input_transcription: Option<String>,
    /// Delta of the model's speech transcription
    pub output_transcription: Option<String>,
    pub turn_complete: bool,
    /// Audio parts in message order
    pub audio: Vec<InlineAudio>,
    /// The user barged in; drop queued model speech
    pub interrupted: bool,
}

/// Everything the remote channel reports, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    Open,
    Message(ServerMessage),
    Close,
    Error(String),
}

/// Outbound half of an open channel
#[async_trait::async_trait]
pub trait LiveSink: Send {
    /// Send one audio chunk
    async fn send(&mut self, chunk: PcmChunk) -> Result<()>;

    /// Close the channel; fails when it is already closed
    async fn close(&mut self) -> Result<()>;
}

/// An opened channel
pub struct LiveChannel {
    pub sink: Box<dyn LiveSink>,
    pub events: mpsc::Receiver<LiveEvent>,
}

/// Opens channels to a live service
#[async_trait::async_trait]
pub trait LiveConnector: Send + Sync {
    /// Open a channel configured with `config`
    ///
    /// Success means the transport is up; the service confirms the configuration
    /// with `LiveEvent::Open` (or rejects it with `Error`/`Close`).
    async fn open(&self, config: &LiveConfig) -> Result<LiveChannel>;

    /// Get connector name for logging
    fn name(&self) -> &str;
}

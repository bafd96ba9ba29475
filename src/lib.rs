pub mod audio;
pub mod config;
pub mod error;
pub mod live;
pub mod meter;
pub mod persona;
pub mod playback;
pub mod session;
pub mod transcript;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioCaptureAdapter, AudioFile,
    AudioFrame, AudioOutput, AudioOutputFactory, AudioSource, ManualClock, OutputSink,
    PcmChunk, PlaybackBuffer, VirtualOutput,
};
pub use config::Config;
pub use error::{SessionError, SessionResult};
pub use live::{GeminiConnector, LiveChannel, LiveConfig, LiveConnector, LiveEvent, LiveSink, ServerMessage};
pub use meter::VolumeMeter;
pub use persona::{PersonaConfig, PersonaTemplate, VoiceName};
pub use playback::{InterruptionHandler, PlaybackScheduler};
pub use session::{
    AudioDevices, SessionConfig, SessionController, SessionSnapshot, SessionState, SessionStats,
    SystemDevices,
};
pub use transcript::{Speaker, TranscriptAggregator, TranscriptTurn};

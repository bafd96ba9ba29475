pub mod backend;
pub mod capture;
pub mod convert;
pub mod file;
pub mod output;

#[cfg(feature = "devices")]
pub mod microphone;
#[cfg(feature = "devices")]
pub mod speaker;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource,
    CAPTURE_CHANNEL_CAPACITY,
};
pub use capture::{AudioCaptureAdapter, PcmChunk};
pub use file::{AudioFile, WavFileBackend};
pub use output::{
    AudioOutput, AudioOutputFactory, BufferId, ClockSource, ManualClock, OutputSink,
    PlaybackBuffer, PlaybackTimeline, SystemClock, VirtualOutput,
};

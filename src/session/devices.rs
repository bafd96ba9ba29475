use anyhow::Result;

use crate::audio::{
    AudioBackendConfig, AudioCaptureAdapter, AudioOutput, AudioOutputFactory, AudioSource,
    OutputSink,
};

/// Where a session gets its capture and playback devices
///
/// Acquiring is synchronous and does not start capture; the controller starts the
/// capture stream only after the live channel is open.
pub trait AudioDevices: Send + Sync {
    fn open_output(&self, sample_rate: u32) -> Result<Box<dyn AudioOutput>>;

    fn open_capture(&self, config: AudioBackendConfig) -> Result<AudioCaptureAdapter>;
}

/// Devices picked by source and sink selection
#[derive(Debug, Clone)]
pub struct SystemDevices {
    pub source: AudioSource,
    pub sink: OutputSink,
}

impl SystemDevices {
    pub fn new(source: AudioSource, sink: OutputSink) -> Self {
        Self { source, sink }
    }
}

impl Default for SystemDevices {
    fn default() -> Self {
        Self::new(AudioSource::Microphone, OutputSink::Speaker)
    }
}

impl AudioDevices for SystemDevices {
    fn open_output(&self, sample_rate: u32) -> Result<Box<dyn AudioOutput>> {
        AudioOutputFactory::create(self.sink, sample_rate)
    }

    fn open_capture(&self, config: AudioBackendConfig) -> Result<AudioCaptureAdapter> {
        AudioCaptureAdapter::open(self.source.clone(), config)
    }
}

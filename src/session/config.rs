use std::time::Duration;

use crate::audio::AudioBackendConfig;
use crate::live::messages::DEFAULT_OUTPUT_SAMPLE_RATE;
use crate::meter::DEFAULT_FFT_SIZE;

/// Configuration for a live session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capture rate, frame size and file pacing
    pub capture: AudioBackendConfig,

    /// Sample rate of the playback output
    /// Default: 24000 (Live API output rate)
    pub output_sample_rate: u32,

    /// How often the volume meter samples the output and completions are retired
    /// Default: 1/60 s
    pub display_interval: Duration,

    /// Analyser FFT size for the volume meter
    pub fft_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture: AudioBackendConfig::default(),
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            display_interval: Duration::from_secs_f64(1.0 / 60.0),
            fft_size: DEFAULT_FFT_SIZE,
        }
    }
}

impl SessionConfig {
    /// Display interval for a refresh rate in frames per second
    pub fn with_display_fps(mut self, fps: u32) -> Self {
        self.display_interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        self
    }
}

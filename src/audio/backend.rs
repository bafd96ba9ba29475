use anyhow::Result;
use tokio::sync::mpsc;

/// Capacity of the capture → session hand-off
///
/// One frame in flight. Backends `try_send` and drop the frame when the session
/// has not picked up the previous one yet.
pub const CAPTURE_CHANNEL_CAPACITY: usize = 1;

/// One fixed-length frame of captured mono audio
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Configuration for audio capture backends
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate (will resample if needed)
    pub target_sample_rate: u32,
    /// Samples per emitted frame
    pub frame_size: usize,
    /// Pace file playback at real-time speed (file backend only)
    pub pace_realtime: bool,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // Live API input rate
            frame_size: 2048,          // ~128ms at 16kHz
            pace_realtime: true,
        }
    }
}

impl AudioBackendConfig {
    /// Duration of one frame in milliseconds
    pub fn frame_duration_ms(&self) -> u64 {
        if self.target_sample_rate == 0 {
            return 0;
        }
        self.frame_size as u64 * 1000 / self.target_sample_rate as u64
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device (`devices` feature)
/// - File: stream a WAV file as if it were a microphone
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone (requires the `devices` feature)
    Microphone,
    /// WAV file input (headless runs and testing)
    File(String),
}

impl std::str::FromStr for AudioSource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mic" | "microphone" => Ok(AudioSource::Microphone),
            path => Ok(AudioSource::File(path.to_string())),
        }
    }
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend for the given source
    ///
    /// Acquires the device (or opens the file) eagerly so that permission and
    /// availability problems surface before the remote channel is opened.
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "devices")]
                {
                    use super::microphone::MicrophoneBackend;
                    let backend = MicrophoneBackend::new(config)?;
                    Ok(Box::new(backend))
                }

                #[cfg(not(feature = "devices"))]
                {
                    let _ = config;
                    anyhow::bail!("Microphone capture requires building with the `devices` feature")
                }
            }

            AudioSource::File(path) => {
                use super::file::WavFileBackend;
                let backend = WavFileBackend::open(&path, config)?;
                Ok(Box::new(backend))
            }
        }
    }
}

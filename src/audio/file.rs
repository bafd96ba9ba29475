use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, CAPTURE_CHANNEL_CAPACITY};
use super::convert::{downmix_to_mono, i16_to_f32, resample, Framer};

/// A WAV file decoded to mono f32
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Int if spec.bits_per_sample == 16 => reader
                .into_samples::<i16>()
                .map(|s| s.map(i16_to_f32))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            _ => bail!(
                "Unsupported WAV format: {}-bit {:?}",
                spec.bits_per_sample,
                spec.sample_format
            ),
        };

        let samples = downmix_to_mono(&interleaved, spec.channels);
        let duration_seconds = samples.len() as f64 / spec.sample_rate as f64;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Samples at the requested rate
    pub fn resampled(&self, target_rate: u32) -> Result<Vec<f32>> {
        resample(&self.samples, self.sample_rate, target_rate)
            .with_context(|| format!("Failed to resample {} to {}Hz", self.path, target_rate))
    }
}

/// Streams a WAV file as if it were a microphone
///
/// With `pace_realtime` the frames are released at capture speed and dropped when
/// the session is not keeping up, exactly like a live device. Without pacing every
/// frame is delivered as fast as the receiver accepts it.
pub struct WavFileBackend {
    config: AudioBackendConfig,
    audio: AudioFile,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn open(path: &str, config: AudioBackendConfig) -> Result<Self> {
        let audio = AudioFile::open(path)?;

        Ok(Self {
            config,
            audio,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for WavFileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }

        let sample_rate = self.config.target_sample_rate;
        let frame_ms = self.config.frame_duration_ms().max(1);
        let pace = self.config.pace_realtime;

        let mut framer = Framer::new(self.config.frame_size);
        let mut frames = framer.push(&self.audio.resampled(sample_rate)?);
        frames.extend(framer.flush());

        info!(
            "Streaming {} ({} frames of {}ms, paced={})",
            self.audio.path,
            frames.len(),
            frame_ms,
            pace
        );

        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(frame_ms));

            for (index, samples) in frames.into_iter().enumerate() {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    timestamp_ms: index as u64 * frame_ms,
                };

                if pace {
                    ticker.tick().await;
                    match tx.try_send(frame) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!("Dropping file frame {}: session busy", index);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                } else if tx.send(frame).await.is_err() {
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
            info!("File capture finished");
        });

        self.task = Some(task);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            task.abort();
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

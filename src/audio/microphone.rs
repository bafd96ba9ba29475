// Microphone capture using cpal
//
// cpal streams are not Send, so the stream lives on a dedicated thread that
// parks until stop() is called. Frames cross to the session over a
// capacity-1 channel; when the session is busy the frame is dropped.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, CAPTURE_CHANNEL_CAPACITY};
use super::convert::{downmix_to_mono, i16_to_f32, Framer, StreamResampler};

/// Default input device backend
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    device_name: String,
    capturing: Arc<AtomicBool>,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_input_config()
            .context("Failed to query input device configuration")?;

        info!(
            "Microphone backend initialized: {} ({}Hz, {} channels → {}Hz mono)",
            device_name,
            supported.sample_rate().0,
            supported.channels(),
            config.target_sample_rate
        );

        Ok(Self {
            config,
            device_name,
            capturing: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            thread: None,
        })
    }
}

/// Converts device callbacks into fixed-size frames
struct FrameSink {
    channels: u16,
    resampler: StreamResampler,
    target_rate: u32,
    frame_ms: u64,
    emitted: u64,
    framer: Framer,
    tx: mpsc::Sender<AudioFrame>,
}

impl FrameSink {
    fn push(&mut self, data: &[f32]) {
        let mono = downmix_to_mono(data, self.channels);
        let resampled = match self.resampler.push(&mono) {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Dropping microphone block: {:#}", e);
                return;
            }
        };

        for samples in self.framer.push(&resampled) {
            let frame = AudioFrame {
                samples,
                sample_rate: self.target_rate,
                timestamp_ms: self.emitted * self.frame_ms,
            };
            self.emitted += 1;

            if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(frame) {
                debug!("Dropping microphone frame: session busy");
            }
        }
    }
}

fn build_input_stream(config: &AudioBackendConfig, tx: mpsc::Sender<AudioFrame>) -> Result<cpal::Stream> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    let supported = device
        .default_input_config()
        .context("Failed to query input device configuration")?;

    let device_rate = supported.sample_rate().0;
    let mut sink = FrameSink {
        channels: supported.channels(),
        resampler: StreamResampler::new(device_rate, config.target_sample_rate, config.frame_size)?,
        target_rate: config.target_sample_rate,
        frame_ms: config.frame_duration_ms(),
        emitted: 0,
        framer: Framer::new(config.frame_size),
        tx,
    };

    let stream_config: cpal::StreamConfig = supported.config();
    let err_fn = |err| warn!("Microphone stream error: {}", err);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| sink.push(data),
            err_fn,
            None,
        )?,
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let converted: Vec<f32> = data.iter().map(|&s| i16_to_f32(s)).collect();
                sink.push(&converted);
            },
            err_fn,
            None,
        )?,
        other => bail!("Unsupported input sample format: {:?}", other),
    };

    stream.play().context("Failed to start input stream")?;

    Ok(stream)
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }

        info!("Starting microphone capture on {}", self.device_name);

        let (frame_tx, frame_rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("loqa-microphone".to_string())
            .spawn(move || {
                let stream = match build_input_stream(&config, frame_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{:#}", e)));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Park until stop() or the backend is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .context("Failed to spawn microphone thread")?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => bail!(message),
            Err(_) => bail!("Microphone thread exited before the stream started"),
        }

        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);
        self.capturing.store(true, Ordering::SeqCst);

        info!("Microphone capture started");

        Ok(frame_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Stopping microphone capture");

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("Failed to join microphone thread")?
                .map_err(|_| anyhow!("Microphone thread panicked"))?;
        }

        info!("Microphone capture stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

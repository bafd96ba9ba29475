// Speaker output using cpal
//
// The device callback pulls from the shared playback timeline. The output clock
// is the number of frames the device has rendered, so scheduling and the volume
// tap follow what is actually audible.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::output::{AudioOutput, BufferId, PlaybackBuffer, PlaybackTimeline};
use crate::error::SessionError;

/// Samples of rendered history kept for the volume tap
const TAP_HISTORY: usize = 2048;

struct SpeakerState {
    timeline: PlaybackTimeline,
    /// Frames rendered since the stream started
    position: u64,
    history: VecDeque<f32>,
}

impl SpeakerState {
    fn render(&mut self, mono: &mut [f32]) {
        self.timeline.mix_into(self.position, mono);
        self.position += mono.len() as u64;
        self.timeline.prune(self.position);

        for &sample in mono.iter() {
            if self.history.len() == TAP_HISTORY {
                self.history.pop_front();
            }
            self.history.push_back(sample);
        }
    }
}

/// Default output device
pub struct SpeakerOutput {
    state: Arc<Mutex<SpeakerState>>,
    sample_rate: u32,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl SpeakerOutput {
    /// Open the default output device
    ///
    /// `preferred_rate` is used when the device accepts it; otherwise the device
    /// default rate is used and inbound buffers are resampled on scheduling.
    pub fn new(preferred_rate: u32) -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .supported_output_configs()
            .context("Failed to query output device configurations")?
            .find(|range| {
                range.sample_format() == cpal::SampleFormat::F32
                    && range.min_sample_rate().0 <= preferred_rate
                    && range.max_sample_rate().0 >= preferred_rate
            })
            .map(|range| range.with_sample_rate(cpal::SampleRate(preferred_rate)));

        let supported = match supported {
            Some(config) => config,
            None => device
                .default_output_config()
                .context("Failed to query output device configuration")?,
        };

        if supported.sample_format() != cpal::SampleFormat::F32 {
            bail!(
                "Unsupported output sample format: {:?}",
                supported.sample_format()
            );
        }

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let stream_config: cpal::StreamConfig = supported.config();

        let state = Arc::new(Mutex::new(SpeakerState {
            timeline: PlaybackTimeline::new(sample_rate),
            position: 0,
            history: VecDeque::with_capacity(TAP_HISTORY),
        }));

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
        let callback_state = Arc::clone(&state);

        let thread = std::thread::Builder::new()
            .name("loqa-speaker".to_string())
            .spawn(move || {
                let mut mono = Vec::new();
                let stream = device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let frames = data.len() / channels.max(1);
                        mono.resize(frames, 0.0);

                        match callback_state.lock() {
                            Ok(mut state) => state.render(&mut mono),
                            Err(_) => mono.iter_mut().for_each(|s| *s = 0.0),
                        }

                        for (frame, &sample) in data.chunks_mut(channels.max(1)).zip(mono.iter()) {
                            frame.iter_mut().for_each(|s| *s = sample);
                        }
                    },
                    |err| warn!("Speaker stream error: {}", err),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                let _ = stop_rx.recv();
                drop(stream);
            })
            .context("Failed to spawn speaker thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(message)) => bail!("Failed to start output stream: {}", message),
            Err(_) => bail!("Speaker thread exited before the stream started"),
        }

        info!(
            "Speaker output started: {} ({}Hz, {} channels)",
            device_name, sample_rate, channels
        );

        Ok(Self {
            state,
            sample_rate,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SpeakerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AudioOutput for SpeakerOutput {
    fn current_time(&self) -> f64 {
        self.lock().position as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(&mut self, id: BufferId, buffer: &PlaybackBuffer, start_time: f64) -> Result<()> {
        if self.thread.is_none() {
            bail!("Output is closed");
        }

        // Resample before taking the lock the render callback needs
        let buffer = buffer.at_rate(self.sample_rate)?;
        self.lock().timeline.add(id, &buffer, start_time)
    }

    fn stop(&mut self, id: BufferId) -> Result<(), SessionError> {
        if self.lock().timeline.remove(id) {
            Ok(())
        } else {
            Err(SessionError::TransientStop(format!(
                "buffer {} already finished",
                id
            )))
        }
    }

    fn tap(&mut self, window: &mut [f32]) {
        let state = self.lock();
        let available = state.history.len().min(window.len());
        let pad = window.len() - available;

        window[..pad].iter_mut().for_each(|s| *s = 0.0);
        for (dst, &src) in window[pad..]
            .iter_mut()
            .zip(state.history.iter().skip(state.history.len() - available))
        {
            *dst = src;
        }
    }

    fn close(&mut self) -> Result<()> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| anyhow!("Output already closed"))?;

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        thread
            .join()
            .map_err(|_| anyhow!("Speaker thread panicked"))?;

        info!("Speaker output closed");

        Ok(())
    }

    fn name(&self) -> &str {
        "cpal speaker"
    }
}

impl Drop for SpeakerOutput {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

// Playback output: clocks, the shared playback timeline and output sinks
//
// Every scheduled buffer becomes a voice on the timeline, positioned in samples
// on the output clock. Rendering mixes whatever voices overlap the requested
// window by adding samples with clipping. Outputs expose their most recent
// window through `tap()` so the volume meter sees exactly what is audible.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::convert::resample;
use crate::error::SessionError;

/// Identifier of a scheduled playback buffer
pub type BufferId = u64;

/// A decoded, immutable block of mono audio ready to be scheduled
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// The same audio at `sample_rate`, sharing samples when the rate already matches
    pub fn at_rate(&self, sample_rate: u32) -> Result<PlaybackBuffer> {
        if sample_rate == self.sample_rate {
            return Ok(self.clone());
        }

        let samples = resample(&self.samples, self.sample_rate, sample_rate)?;
        Ok(PlaybackBuffer::new(samples, sample_rate))
    }
}

/// Monotonic playback clock in seconds
pub trait ClockSource: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock time since the clock was created
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Externally driven clock for offline rendering and deterministic runs
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        self.set(self.now() + secs);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Playback sink the scheduler writes to
pub trait AudioOutput: Send {
    /// Current position of the output clock in seconds
    fn current_time(&self) -> f64;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Start `buffer` at `start_time` on the output clock
    fn schedule(&mut self, id: BufferId, buffer: &PlaybackBuffer, start_time: f64) -> Result<()>;

    /// Halt a scheduled buffer immediately
    ///
    /// Fails with `TransientStop` when the buffer already finished.
    fn stop(&mut self, id: BufferId) -> Result<(), SessionError>;

    /// Fill `window` with the most recent output, ending at the current time
    fn tap(&mut self, window: &mut [f32]);

    /// Release the device
    fn close(&mut self) -> Result<()>;

    /// Get output name for logging
    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
struct Voice {
    id: BufferId,
    start_sample: u64,
    samples: Arc<[f32]>,
}

impl Voice {
    fn end_sample(&self) -> u64 {
        self.start_sample + self.samples.len() as u64
    }
}

/// Scheduled voices positioned on one output clock
#[derive(Debug)]
pub struct PlaybackTimeline {
    sample_rate: u32,
    voices: Vec<Voice>,
}

impl PlaybackTimeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            voices: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Convert seconds on the output clock to a sample position
    pub fn position_of(&self, secs: f64) -> u64 {
        (secs.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Add a voice, resampling when the buffer rate differs from the output rate
    pub fn add(&mut self, id: BufferId, buffer: &PlaybackBuffer, start_time: f64) -> Result<()> {
        if buffer.sample_rate() != self.sample_rate {
            debug!(
                "Resampling buffer {} from {}Hz to {}Hz",
                id,
                buffer.sample_rate(),
                self.sample_rate
            );
        }
        let buffer = buffer.at_rate(self.sample_rate)?;

        self.voices.push(Voice {
            id,
            start_sample: self.position_of(start_time),
            samples: buffer.samples,
        });

        Ok(())
    }

    /// Remove a voice; false when it is not (or no longer) on the timeline
    pub fn remove(&mut self, id: BufferId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.id != id);
        self.voices.len() != before
    }

    /// Drop voices that ended at or before `position`
    pub fn prune(&mut self, position: u64) -> usize {
        let before = self.voices.len();
        self.voices.retain(|v| v.end_sample() > position);
        before - self.voices.len()
    }

    pub fn contains(&self, id: BufferId) -> bool {
        self.voices.iter().any(|v| v.id == id)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Render `out.len()` samples starting at `position`
    ///
    /// Overlapping voices are added together and clipped to [-1.0, 1.0].
    pub fn mix_into(&self, position: u64, out: &mut [f32]) {
        out.iter_mut().for_each(|s| *s = 0.0);

        let window_end = position + out.len() as u64;

        for voice in &self.voices {
            if voice.end_sample() <= position || voice.start_sample >= window_end {
                continue;
            }

            let from = voice.start_sample.max(position);
            let to = voice.end_sample().min(window_end);

            for pos in from..to {
                let out_idx = (pos - position) as usize;
                let voice_idx = (pos - voice.start_sample) as usize;
                out[out_idx] += voice.samples[voice_idx];
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

/// Output without a device, driven by a clock
///
/// Used for headless runs and for deterministic rendering with a `ManualClock`.
pub struct VirtualOutput<C: ClockSource> {
    clock: C,
    timeline: PlaybackTimeline,
    closed: bool,
}

impl<C: ClockSource> VirtualOutput<C> {
    pub fn new(clock: C, sample_rate: u32) -> Self {
        info!("Virtual output initialized ({}Hz)", sample_rate);
        Self {
            clock,
            timeline: PlaybackTimeline::new(sample_rate),
            closed: false,
        }
    }

    /// Voices still on the timeline
    pub fn scheduled(&self) -> usize {
        self.timeline.len()
    }

    fn current_position(&self) -> u64 {
        self.timeline.position_of(self.clock.now())
    }
}

impl<C: ClockSource> AudioOutput for VirtualOutput<C> {
    fn current_time(&self) -> f64 {
        self.clock.now()
    }

    fn sample_rate(&self) -> u32 {
        self.timeline.sample_rate()
    }

    fn schedule(&mut self, id: BufferId, buffer: &PlaybackBuffer, start_time: f64) -> Result<()> {
        if self.closed {
            bail!("Output is closed");
        }

        let position = self.current_position();
        self.timeline.prune(position);
        self.timeline.add(id, buffer, start_time)
    }

    fn stop(&mut self, id: BufferId) -> Result<(), SessionError> {
        if self.timeline.remove(id) {
            Ok(())
        } else {
            Err(SessionError::TransientStop(format!(
                "buffer {} already finished",
                id
            )))
        }
    }

    fn tap(&mut self, window: &mut [f32]) {
        let position = self.current_position();
        self.timeline.prune(position.saturating_sub(window.len() as u64));
        self.timeline
            .mix_into(position.saturating_sub(window.len() as u64), window);
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            bail!("Output already closed");
        }
        self.closed = true;
        self.timeline = PlaybackTimeline::new(self.timeline.sample_rate());
        Ok(())
    }

    fn name(&self) -> &str {
        "virtual output"
    }
}

/// Where synthesized speech goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSink {
    /// Default speaker (requires the `devices` feature)
    Speaker,
    /// No device, system clock
    Virtual,
}

impl std::str::FromStr for OutputSink {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "speaker" | "speakers" => Ok(OutputSink::Speaker),
            "virtual" | "none" => Ok(OutputSink::Virtual),
            other => bail!("Unknown output sink: {}", other),
        }
    }
}

/// Audio output factory
pub struct AudioOutputFactory;

impl AudioOutputFactory {
    pub fn create(sink: OutputSink, sample_rate: u32) -> Result<Box<dyn AudioOutput>> {
        match sink {
            OutputSink::Speaker => {
                #[cfg(feature = "devices")]
                {
                    use super::speaker::SpeakerOutput;
                    let output = SpeakerOutput::new(sample_rate)?;
                    Ok(Box::new(output))
                }

                #[cfg(not(feature = "devices"))]
                {
                    let _ = sample_rate;
                    bail!("Speaker output requires building with the `devices` feature")
                }
            }

            OutputSink::Virtual => Ok(Box::new(VirtualOutput::new(SystemClock::new(), sample_rate))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(value: f32, len: usize, rate: u32) -> PlaybackBuffer {
        PlaybackBuffer::new(vec![value; len], rate)
    }

    #[test]
    fn test_mix_non_overlapping_voices() {
        let mut timeline = PlaybackTimeline::new(10);
        timeline.add(1, &buffer(0.25, 5, 10), 0.0).unwrap();
        timeline.add(2, &buffer(0.5, 5, 10), 0.5).unwrap();

        let mut out = vec![0.0; 10];
        timeline.mix_into(0, &mut out);

        assert_eq!(&out[..5], &[0.25; 5]);
        assert_eq!(&out[5..], &[0.5; 5]);
    }

    #[test]
    fn test_mix_overlap_with_clipping() {
        let mut timeline = PlaybackTimeline::new(10);
        timeline.add(1, &buffer(0.75, 4, 10), 0.0).unwrap();
        timeline.add(2, &buffer(0.75, 4, 10), 0.0).unwrap();

        let mut out = vec![0.0; 4];
        timeline.mix_into(0, &mut out);

        assert_eq!(out, vec![1.0; 4]); // Clipped to max
    }

    #[test]
    fn test_mix_window_past_all_voices_is_silent() {
        let mut timeline = PlaybackTimeline::new(10);
        timeline.add(1, &buffer(0.5, 4, 10), 0.0).unwrap();

        let mut out = vec![1.0; 4];
        timeline.mix_into(100, &mut out);

        assert_eq!(out, vec![0.0; 4]);
    }

    #[test]
    fn test_prune_removes_finished_voices() {
        let mut timeline = PlaybackTimeline::new(10);
        timeline.add(1, &buffer(0.5, 5, 10), 0.0).unwrap();
        timeline.add(2, &buffer(0.5, 5, 10), 0.5).unwrap();

        assert_eq!(timeline.prune(5), 1);
        assert!(!timeline.contains(1));
        assert!(timeline.contains(2));
    }

    #[test]
    fn test_add_resamples_foreign_rate() {
        let mut timeline = PlaybackTimeline::new(24000);
        timeline.add(1, &buffer(0.5, 16000, 16000), 0.0).unwrap();

        let mut out = vec![0.0; 24000];
        timeline.mix_into(0, &mut out);
        assert!(out[1000..23000].iter().all(|&s| (s - 0.5).abs() < 0.01));
        assert_eq!(timeline.prune(24000), 1);
    }

    #[test]
    fn test_at_rate_shares_matching_samples() {
        let original = buffer(0.5, 10, 10);
        let same = original.at_rate(10).unwrap();
        assert!(Arc::ptr_eq(&original.samples, &same.samples));

        let doubled = original.at_rate(20).unwrap();
        assert_eq!(doubled.len(), 20);
        assert_eq!(doubled.sample_rate(), 20);
    }

    #[test]
    fn test_virtual_output_stop_finished_buffer_is_transient() {
        let clock = ManualClock::new();
        let mut output = VirtualOutput::new(clock.clone(), 10);
        output.schedule(7, &buffer(0.5, 10, 10), 0.0).unwrap();

        assert!(output.stop(7).is_ok());
        assert!(matches!(output.stop(7), Err(SessionError::TransientStop(_))));
    }

    #[test]
    fn test_virtual_output_tap_follows_clock() {
        let clock = ManualClock::new();
        let mut output = VirtualOutput::new(clock.clone(), 10);
        output.schedule(1, &buffer(0.5, 10, 10), 0.0).unwrap();

        clock.set(0.5);
        let mut window = vec![0.0; 5];
        output.tap(&mut window);
        assert_eq!(window, vec![0.5; 5]);

        clock.set(3.0);
        output.tap(&mut window);
        assert_eq!(window, vec![0.0; 5]);
        assert_eq!(output.scheduled(), 0);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(1.5);
        other.advance(0.25);
        assert_eq!(clock.now(), 1.75);
    }

    #[test]
    fn test_virtual_output_rejects_schedule_after_close() {
        let mut output = VirtualOutput::new(ManualClock::new(), 10);
        output.close().unwrap();
        assert!(output.schedule(1, &buffer(0.5, 1, 10), 0.0).is_err());
        assert!(output.close().is_err());
    }
}

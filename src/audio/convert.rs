// Sample format helpers shared by capture and playback
//
// Capture devices hand us whatever rate and channel layout they like; the live
// service wants 16kHz mono PCM16 in, and sends 24kHz mono PCM16 back.

use anyhow::{bail, Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Convert interleaved multi-channel samples to mono by averaging channels
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}

/// Resample mono audio from `from_rate` to `to_rate`
///
/// Integer down-ratios (48kHz → 16kHz) use decimation. Every other ratio goes
/// through a windowed-sinc resampler, band-limited to the lower of the two rates.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Ok(samples.to_vec());
    }

    if from_rate > to_rate && from_rate % to_rate == 0 {
        let ratio = (from_rate / to_rate) as usize;
        return Ok(samples.iter().step_by(ratio).copied().collect());
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let chunk_size = samples.len().max(MIN_SINC_CHUNK);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, sinc_parameters(ratio), chunk_size, 1)
        .context("Failed to build resampler")?;

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();

    let input = [samples];
    let mut out = resampler
        .process_partial(Some(&input[..]), None)
        .context("Resampling failed")?
        .remove(0);

    // Flush the filter tail so the delayed end of the signal comes out
    for _ in 0..MAX_FLUSHES {
        if out.len() >= delay + expected {
            break;
        }
        let tail = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .context("Resampling failed")?;
        out.extend_from_slice(&tail[0]);
    }

    out.drain(..delay.min(out.len()));
    out.resize(expected, 0.0);

    debug!(
        "Resampled {} samples at {}Hz to {} samples at {}Hz",
        samples.len(),
        from_rate,
        out.len(),
        to_rate
    );

    Ok(out)
}

const MIN_SINC_CHUNK: usize = 1024;
const MAX_FLUSHES: usize = 8;

fn sinc_parameters(ratio: f64) -> SincInterpolationParameters {
    // Large ratio changes need the longer, cubic-interpolated filter
    let (sinc_len, interpolation) = if ratio >= 2.0 || ratio <= 0.5 {
        (256, SincInterpolationType::Cubic)
    } else {
        (128, SincInterpolationType::Linear)
    };

    SincInterpolationParameters {
        sinc_len,
        f_cutoff: 0.95,
        interpolation,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Incremental resampler for device callbacks of arbitrary size
///
/// Keeps filter state between calls, so consecutive blocks join without edges.
/// Output lags input by the filter delay.
pub struct StreamResampler {
    resampler: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            bail!("Invalid resampling rates: {}Hz → {}Hz", from_rate, to_rate);
        }

        let resampler = if from_rate == to_rate {
            None
        } else {
            let ratio = to_rate as f64 / from_rate as f64;
            Some(
                SincFixedIn::<f32>::new(ratio, 1.0, sinc_parameters(ratio), chunk_size.max(1), 1)
                    .context("Failed to build resampler")?,
            )
        };

        Ok(Self {
            resampler,
            pending: Vec::new(),
        })
    }

    /// Feed samples, returning whatever output the completed chunks produced
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk = [&self.pending[..needed]];
            let processed = resampler
                .process(&chunk[..], None)
                .context("Resampling failed")?;
            out.extend_from_slice(&processed[0]);
            self.pending.drain(..needed);
        }

        Ok(out)
    }
}

/// f32 in [-1.0, 1.0] to PCM16, clipping out-of-range input
pub fn f32_to_i16(sample: f32) -> i16 {
    let scaled = (sample * 32768.0).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// PCM16 to f32 in [-1.0, 1.0)
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Encode f32 samples as little-endian PCM16 bytes
pub fn encode_pcm16_le(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| f32_to_i16(s).to_le_bytes())
        .collect()
}

/// Decode little-endian PCM16 bytes to f32 samples
///
/// Returns `None` when the byte count is odd.
pub fn decode_pcm16_le(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    Some(
        bytes
            .chunks_exact(2)
            .map(|chunk| i16_to_f32(i16::from_le_bytes([chunk[0], chunk[1]])))
            .collect(),
    )
}

/// Re-chunks arbitrary sample blocks into fixed-size frames
#[derive(Debug)]
pub struct Framer {
    frame_size: usize,
    pending: Vec<f32>,
}

impl Framer {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Append samples and return every frame completed by them
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();

        for &sample in samples {
            self.pending.push(sample);
            if self.pending.len() == self.frame_size {
                frames.push(std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.frame_size),
                ));
            }
        }

        frames
    }

    /// Zero-pad and return the partial frame left over at end of input
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        if self.pending.is_empty() {
            return None;
        }

        let mut last = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
        last.resize(self.frame_size, 0.0);
        Some(last)
    }

    /// Samples waiting for the next frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

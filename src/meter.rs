// Output loudness for visualization
//
// Once per display frame the meter taps the most recent output window, runs it
// through a byte-frequency analyser and averages the bins into one value in
// [0, 1]. No history is kept beyond the analyser's smoothing state.

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;
use tracing::warn;

use crate::audio::AudioOutput;

/// Default analyser FFT size (128 frequency bins)
pub const DEFAULT_FFT_SIZE: usize = 256;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;
const SMOOTHING: f32 = 0.8;

/// Average byte-frequency bins into a loudness value in [0, 1]
pub fn normalize_bins(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }

    let sum: u64 = bins.iter().map(|&b| b as u64).sum();
    let average = sum as f32 / bins.len() as f32;
    (average / 255.0).clamp(0.0, 1.0)
}

/// Blackman-windowed FFT producing byte magnitudes in the -100..-30 dB range
pub struct Analyser {
    fft: Arc<dyn RealToComplex<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl Analyser {
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);

        let window = (0..fft_size)
            .map(|n| {
                let x = 2.0 * std::f32::consts::PI * n as f32 / fft_size as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        Self {
            input: fft.make_input_vec(),
            spectrum: fft.make_output_vec(),
            fft,
            fft_size,
            window,
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyse `samples` (the last `fft_size` output samples) into `bins`
    pub fn byte_frequency_data(&mut self, samples: &[f32], bins: &mut [u8]) {
        for (i, slot) in self.input.iter_mut().enumerate() {
            *slot = samples.get(i).copied().unwrap_or(0.0) * self.window[i];
        }

        if let Err(e) = self.fft.process(&mut self.input, &mut self.spectrum) {
            warn!("Analyser FFT failed: {}", e);
            bins.iter_mut().for_each(|b| *b = 0);
            return;
        }

        let scale = 1.0 / self.fft_size as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;

        for (k, bin) in bins.iter_mut().enumerate().take(self.smoothed.len()) {
            let magnitude = self.spectrum[k].norm() * scale;
            let smoothed = SMOOTHING * self.smoothed[k] + (1.0 - SMOOTHING) * magnitude;
            self.smoothed[k] = smoothed;

            let db = if smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };

            let scaled = 255.0 * (db - MIN_DECIBELS) / range;
            *bin = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}

/// Per-frame loudness of what the output is playing
pub struct VolumeMeter {
    analyser: Analyser,
    window: Vec<f32>,
    bins: Vec<u8>,
    volume: f32,
}

impl VolumeMeter {
    pub fn new(fft_size: usize) -> Self {
        let analyser = Analyser::new(fft_size);
        Self {
            window: vec![0.0; analyser.fft_size()],
            bins: vec![0; analyser.bin_count()],
            analyser,
            volume: 0.0,
        }
    }

    /// Sample the output once; call every display frame
    pub fn sample(&mut self, output: &mut dyn AudioOutput) -> f32 {
        output.tap(&mut self.window);
        self.analyser.byte_frequency_data(&self.window, &mut self.bins);
        self.volume = normalize_bins(&self.bins);
        self.volume
    }

    /// Last sampled value
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Byte-frequency bins from the last sample
    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn reset(&mut self) {
        self.analyser.reset();
        self.bins.iter_mut().for_each(|b| *b = 0);
        self.volume = 0.0;
    }
}

impl Default for VolumeMeter {
    fn default() -> Self {
        Self::new(DEFAULT_FFT_SIZE)
    }
}

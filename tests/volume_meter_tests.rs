// Integration tests for the output volume meter

use loqa_live::audio::{AudioOutput, ManualClock, PlaybackBuffer, VirtualOutput};
use loqa_live::meter::{normalize_bins, Analyser, VolumeMeter, DEFAULT_FFT_SIZE};

const RATE: u32 = 24000;

fn sine(freq: f32, amplitude: f32, secs: f64) -> PlaybackBuffer {
    let len = (secs * RATE as f64) as usize;
    let samples = (0..len)
        .map(|n| amplitude * (2.0 * std::f32::consts::PI * freq * n as f32 / RATE as f32).sin())
        .collect();
    PlaybackBuffer::new(samples, RATE)
}

#[test]
fn test_normalize_bins_bounds() {
    assert_eq!(normalize_bins(&[]), 0.0);
    assert_eq!(normalize_bins(&[0; 128]), 0.0);
    assert_eq!(normalize_bins(&[255; 128]), 1.0);

    let every_value: Vec<u8> = (0..=255).collect();
    let volume = normalize_bins(&every_value);
    assert!((volume - 0.5).abs() < 1e-6);

    // Skewed distributions stay in range too
    for fill in [1u8, 17, 128, 200, 254] {
        let mut bins = vec![fill; 127];
        bins.push(255);
        let v = normalize_bins(&bins);
        assert!((0.0..=1.0).contains(&v), "volume {} out of range", v);
    }
}

#[test]
fn test_silent_output_reads_zero() {
    let clock = ManualClock::new();
    let mut output = VirtualOutput::new(clock.clone(), RATE);
    let mut meter = VolumeMeter::new(DEFAULT_FFT_SIZE);

    clock.set(1.0);
    assert_eq!(meter.sample(&mut output), 0.0);
    assert!(meter.bins().iter().all(|&b| b == 0));
}

#[test]
fn test_loud_output_reads_above_zero() {
    let clock = ManualClock::new();
    let mut output = VirtualOutput::new(clock.clone(), RATE);
    let mut meter = VolumeMeter::new(DEFAULT_FFT_SIZE);

    output.schedule(0, &sine(1000.0, 0.8, 1.0), 0.0).unwrap();
    clock.set(0.5);

    let mut volume = 0.0;
    for _ in 0..10 {
        volume = meter.sample(&mut output);
    }

    assert!(volume > 0.0, "expected non-zero volume, got {}", volume);
    assert!(volume <= 1.0);
    assert_eq!(meter.volume(), volume);
}

#[test]
fn test_volume_drops_after_playback_ends() {
    let clock = ManualClock::new();
    let mut output = VirtualOutput::new(clock.clone(), RATE);
    let mut meter = VolumeMeter::new(DEFAULT_FFT_SIZE);

    output.schedule(0, &sine(440.0, 0.9, 0.25), 0.0).unwrap();
    clock.set(0.2);
    let loud = meter.sample(&mut output);

    clock.set(2.0);
    meter.reset();
    let quiet = meter.sample(&mut output);

    assert!(loud > quiet);
    assert_eq!(quiet, 0.0);
}

#[test]
fn test_analyser_bins_match_fft_size() {
    let mut analyser = Analyser::new(512);
    assert_eq!(analyser.fft_size(), 512);
    assert_eq!(analyser.bin_count(), 256);

    let noise: Vec<f32> = (0..512).map(|n| if n % 2 == 0 { 1.0 } else { -1.0 }).collect();
    let mut bins = vec![0u8; analyser.bin_count()];
    analyser.byte_frequency_data(&noise, &mut bins);

    let volume = normalize_bins(&bins);
    assert!((0.0..=1.0).contains(&volume));
}

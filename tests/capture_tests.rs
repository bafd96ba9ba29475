// Integration tests for audio capture and outbound frame encoding
//
// WAV fixtures are generated into a temp directory with hound.

use anyhow::Result;
use base64::Engine;
use hound::{SampleFormat, WavSpec, WavWriter};
use loqa_live::audio::{
    AudioBackendConfig, AudioBackendFactory, AudioCaptureAdapter, AudioFile, AudioFrame,
    AudioSource, PcmChunk,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_wav(dir: &Path, name: &str, sample_rate: u32, channels: u16, frames: usize) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(&path, spec)?;
    for n in 0..frames {
        let value = ((n % 100) as i16 - 50) * 200;
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }
    writer.finalize()?;

    Ok(path)
}

fn write_tone(dir: &Path, name: &str, sample_rate: u32, freq: f32, secs: f32) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(&path, spec)?;
    let frames = (sample_rate as f32 * secs) as usize;
    for n in 0..frames {
        let t = n as f32 / sample_rate as f32;
        let value = 0.5 * (2.0 * std::f32::consts::PI * freq * t).sin();
        writer.write_sample((value * 32767.0) as i16)?;
    }
    writer.finalize()?;

    Ok(path)
}

fn rms(samples: &[f32]) -> f32 {
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

fn unpaced() -> AudioBackendConfig {
    AudioBackendConfig {
        pace_realtime: false,
        ..AudioBackendConfig::default()
    }
}

fn decode_chunk(chunk: &PcmChunk) -> Vec<i16> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&chunk.data)
        .unwrap();
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

#[test]
fn test_chunk_encoding() {
    let frame = AudioFrame {
        samples: vec![0.0, 0.5, -1.0, 1.0],
        sample_rate: 16000,
        timestamp_ms: 0,
    };

    let chunk = PcmChunk::from_frame(frame);

    assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
    assert_eq!(decode_chunk(&chunk), vec![0, 16384, -32768, 32767]);
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "stereo.wav", 48000, 2, 48000)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len(), 48000);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-9);
    assert!(audio.path.contains("stereo.wav"));

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");
    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[tokio::test]
async fn test_file_capture_emits_fixed_frames() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "voice.wav", 16000, 1, 2048 * 2 + 100)?;

    let mut capture = AudioCaptureAdapter::open(
        AudioSource::File(path.display().to_string()),
        unpaced(),
    )?;
    let mut frames = capture.start().await?;

    let mut chunks = Vec::new();
    while let Some(frame) = frames.recv().await {
        assert_eq!(frame.samples.len(), 2048);
        assert_eq!(frame.sample_rate, 16000);
        chunks.push(capture.encode(frame));
    }

    // Two full frames plus the zero-padded tail
    assert_eq!(chunks.len(), 3);
    assert_eq!(capture.frames_encoded(), 3);
    for chunk in &chunks {
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
        assert_eq!(decode_chunk(chunk).len(), 2048);
    }

    let tail = decode_chunk(&chunks[2]);
    assert_ne!(tail[0], 0);
    assert!(tail[100..].iter().all(|&s| s == 0));

    capture.stop().await?;
    assert!(!capture.is_capturing());

    Ok(())
}

#[tokio::test]
async fn test_file_capture_resamples_to_input_rate() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "hifi.wav", 48000, 2, 2048 * 3 * 3)?;

    let mut capture = AudioCaptureAdapter::open(
        AudioSource::File(path.display().to_string()),
        unpaced(),
    )?;
    let mut frames = capture.start().await?;

    let mut count = 0;
    let mut last_timestamp = None;
    while let Some(frame) = frames.recv().await {
        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.samples.len(), 2048);
        if let Some(previous) = last_timestamp {
            assert!(frame.timestamp_ms > previous);
        }
        last_timestamp = Some(frame.timestamp_ms);
        count += 1;
    }

    assert_eq!(count, 3);

    Ok(())
}

#[test]
fn test_audio_file_44k_resamples_to_16k() -> Result<()> {
    let dir = TempDir::new()?;
    let voice = write_tone(dir.path(), "voice.wav", 44100, 1000.0, 1.0)?;
    let hiss = write_tone(dir.path(), "hiss.wav", 44100, 10000.0, 1.0)?;

    let voice = AudioFile::open(&voice)?.resampled(16000)?;
    let hiss = AudioFile::open(&hiss)?.resampled(16000)?;

    assert_eq!(voice.len(), 16000);
    assert_eq!(hiss.len(), 16000);

    // In-band speech keeps its level (0.5 peak sine → ~0.35 RMS)
    let voice_rms = rms(&voice[1000..15000]);
    assert!((voice_rms - 0.354).abs() < 0.02, "voice rms {}", voice_rms);

    // 10kHz is above the 8kHz Nyquist limit and must not fold back into the band
    let hiss_rms = rms(&hiss[1000..15000]);
    assert!(hiss_rms < 0.01, "aliased rms {}", hiss_rms);

    Ok(())
}

#[tokio::test]
async fn test_file_capture_from_44k_source() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_tone(dir.path(), "cd.wav", 44100, 440.0, 1.0)?;

    let mut capture = AudioCaptureAdapter::open(
        AudioSource::File(path.display().to_string()),
        unpaced(),
    )?;
    let mut frames = capture.start().await?;

    let mut count = 0;
    while let Some(frame) = frames.recv().await {
        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.samples.len(), 2048);
        count += 1;
    }

    // 16000 samples: seven full frames and a padded eighth
    assert_eq!(count, 8);

    Ok(())
}

#[test]
fn test_capture_open_missing_file_fails() {
    let result = AudioCaptureAdapter::open(
        AudioSource::File("/nonexistent/voice.wav".to_string()),
        AudioBackendConfig::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_file_backend_name() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "short.wav", 16000, 1, 160)?;

    let backend = AudioBackendFactory::create(
        AudioSource::File(path.display().to_string()),
        AudioBackendConfig::default(),
    )?;

    assert_eq!(backend.name(), "WAV file");
    assert!(!backend.is_capturing());

    Ok(())
}

#[cfg(not(feature = "devices"))]
#[test]
fn test_microphone_needs_devices_feature() {
    let result = AudioCaptureAdapter::open(AudioSource::Microphone, AudioBackendConfig::default());
    assert!(result.is_err());
}

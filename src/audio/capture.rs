// Capture side of a live session
//
// Owns the capture backend and turns each captured frame into the wire chunk the
// live service expects: PCM16 little-endian, base64, tagged with its rate.

use anyhow::{Context, Result};
use base64::Engine;
use tokio::sync::mpsc;
use tracing::info;

use super::backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
use super::convert::encode_pcm16_le;

/// One outbound audio chunk in wire format
#[derive(Debug, Clone, PartialEq)]
pub struct PcmChunk {
    /// e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Base64-encoded PCM16 LE bytes
    pub data: String,
}

impl PcmChunk {
    pub fn from_frame(frame: AudioFrame) -> Self {
        let bytes = encode_pcm16_le(&frame.samples);
        Self {
            mime_type: format!("audio/pcm;rate={}", frame.sample_rate),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// Acquires the capture device and converts its frames to wire chunks
pub struct AudioCaptureAdapter {
    backend: Box<dyn AudioBackend>,
    frames_encoded: u64,
}

impl AudioCaptureAdapter {
    /// Acquire the capture device without starting it
    pub fn open(source: AudioSource, config: AudioBackendConfig) -> Result<Self> {
        let backend = AudioBackendFactory::create(source, config)
            .context("Failed to acquire capture device")?;
        Ok(Self::from_backend(backend))
    }

    pub fn from_backend(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            frames_encoded: 0,
        }
    }

    /// Start capturing; frames arrive on the returned receiver
    pub async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        info!("Starting capture via {}", self.backend.name());
        self.backend
            .start()
            .await
            .context("Failed to start audio capture")
    }

    /// Convert one frame for sending; the frame is consumed
    pub fn encode(&mut self, frame: AudioFrame) -> PcmChunk {
        self.frames_encoded += 1;
        PcmChunk::from_frame(frame)
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.backend.stop().await
    }

    pub fn is_capturing(&self) -> bool {
        self.backend.is_capturing()
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }
}

use base64::Engine;

use crate::audio::convert::decode_pcm16_le;
use crate::audio::PlaybackBuffer;
use crate::error::SessionError;

/// Decode an inline base64 PCM16 LE payload into a playback buffer
///
/// Runs synchronously on the session task, so buffers are always scheduled in
/// the order their messages arrived.
pub fn decode_inline_audio(data: &str, sample_rate: u32) -> Result<PlaybackBuffer, SessionError> {
    if sample_rate == 0 {
        return Err(SessionError::Payload("sample rate is zero".to_string()));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| SessionError::Payload(format!("invalid base64: {}", e)))?;

    let samples = decode_pcm16_le(&bytes).ok_or_else(|| {
        SessionError::Payload(format!("odd PCM16 byte count ({})", bytes.len()))
    })?;

    Ok(PlaybackBuffer::new(samples, sample_rate))
}

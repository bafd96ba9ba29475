// Wire messages for the Gemini Live BidiGenerateContent WebSocket

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{InlineAudio, LiveConfig, LiveEvent, ServerMessage};
use crate::audio::PcmChunk;

/// Output rate assumed when an audio part carries no `rate=` parameter
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24000;

// ============================================================================
// Client → server
// ============================================================================

/// First message on the socket
#[derive(Debug, Serialize, Deserialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Empty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<Empty>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// `{}`: enables a feature without options
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Empty {}

impl SetupMessage {
    pub fn new(model: &str, config: &LiveConfig) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };

        Self {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: config.voice_name.to_string(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    parts: vec![TextPart {
                        text: config.system_instruction.clone(),
                    }],
                },
                input_audio_transcription: config.input_transcription.then(Empty::default),
                output_audio_transcription: config.output_transcription.then(Empty::default),
            },
        }
    }
}

/// Microphone audio
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String, // Base64-encoded bytes
}

impl RealtimeInputMessage {
    pub fn audio(chunk: PcmChunk) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![Blob {
                    mime_type: chunk.mime_type,
                    data: chunk.data,
                }],
            },
        }
    }
}

// ============================================================================
// Server → client
// ============================================================================

/// Any message received on the socket; unknown fields are ignored
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEnvelope {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub inline_data: Option<Blob>,
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    pub time_left: Option<String>,
}

/// Extract `rate=NNNN` from a mime type such as `audio/pcm;rate=24000`
pub fn parse_sample_rate(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse().ok())
}

impl ServerContent {
    pub fn into_message(self) -> ServerMessage {
        let audio = self
            .model_turn
            .map(|turn| turn.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.inline_data)
            .filter(|blob| blob.mime_type.starts_with("audio/"))
            .map(|blob| InlineAudio {
                sample_rate: parse_sample_rate(&blob.mime_type).unwrap_or(DEFAULT_OUTPUT_SAMPLE_RATE),
                data: blob.data,
            })
            .collect();

        ServerMessage {
            input_transcription: self.input_transcription.map(|t| t.text),
            output_transcription: self.output_transcription.map(|t| t.text),
            turn_complete: self.turn_complete,
            audio,
            interrupted: self.interrupted,
        }
    }
}

impl ServerEnvelope {
    /// Map to a session event; `None` for messages the session does not act on
    pub fn into_event(self) -> Option<LiveEvent> {
        if self.setup_complete.is_some() {
            return Some(LiveEvent::Open);
        }

        if let Some(go_away) = self.go_away {
            warn!(
                "Live service is closing the session soon (time left: {})",
                go_away.time_left.as_deref().unwrap_or("unknown")
            );
        }

        self.server_content
            .map(|content| LiveEvent::Message(content.into_message()))
    }
}

/// Parse one socket payload into an event
pub fn parse_server_event(payload: &[u8]) -> serde_json::Result<Option<LiveEvent>> {
    let envelope: ServerEnvelope = serde_json::from_slice(payload)?;
    Ok(envelope.into_event())
}

// Tests for the Gemini Live wire messages
//
// Outbound messages are checked field by field against the JSON the service
// expects; inbound payloads are parsed from literal server JSON.

use loqa_live::audio::PcmChunk;
use loqa_live::live::messages::{
    parse_sample_rate, parse_server_event, RealtimeInputMessage, SetupMessage,
    DEFAULT_OUTPUT_SAMPLE_RATE,
};
use loqa_live::live::{InlineAudio, LiveConfig, LiveEvent, ServerMessage};
use loqa_live::persona::{PersonaConfig, VoiceName, TEMPLATES};

fn message(event: Option<LiveEvent>) -> ServerMessage {
    match event {
        Some(LiveEvent::Message(message)) => message,
        other => panic!("expected a message, got {:?}", other),
    }
}

#[test]
fn test_setup_message_shape() {
    let config = LiveConfig::from(&PersonaConfig::default());
    let json = serde_json::to_value(SetupMessage::new("gemini-test", &config)).unwrap();
    let setup = &json["setup"];

    assert_eq!(setup["model"], "models/gemini-test");
    assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
    assert_eq!(
        setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
        "Zephyr"
    );
    assert_eq!(setup["systemInstruction"]["parts"][0]["text"], TEMPLATES[0].prompt);
    assert!(setup["inputAudioTranscription"].is_object());
    assert!(setup["outputAudioTranscription"].is_object());
}

#[test]
fn test_setup_keeps_model_prefix() {
    let config = LiveConfig::from(&PersonaConfig::default());
    let json = serde_json::to_value(SetupMessage::new("models/gemini-test", &config)).unwrap();
    assert_eq!(json["setup"]["model"], "models/gemini-test");
}

#[test]
fn test_setup_without_transcription() {
    let persona = PersonaConfig {
        system_instruction: "Be brief.".to_string(),
        voice_name: VoiceName::Charon,
    };
    let config = LiveConfig {
        input_transcription: false,
        output_transcription: false,
        ..LiveConfig::from(&persona)
    };

    let json = serde_json::to_value(SetupMessage::new("gemini-test", &config)).unwrap();
    let setup = &json["setup"];

    assert!(setup.get("inputAudioTranscription").is_none());
    assert!(setup.get("outputAudioTranscription").is_none());
    assert_eq!(
        setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
        "Charon"
    );
}

#[test]
fn test_realtime_input_shape() {
    let chunk = PcmChunk {
        mime_type: "audio/pcm;rate=16000".to_string(),
        data: "AAAA".to_string(),
    };

    let json = serde_json::to_value(RealtimeInputMessage::audio(chunk)).unwrap();
    let media = &json["realtimeInput"]["mediaChunks"][0];

    assert_eq!(media["mimeType"], "audio/pcm;rate=16000");
    assert_eq!(media["data"], "AAAA");
}

#[test]
fn test_setup_complete_is_open() {
    let event = parse_server_event(br#"{"setupComplete":{}}"#).unwrap();
    assert_eq!(event, Some(LiveEvent::Open));
}

#[test]
fn test_server_content_with_audio_and_transcription() {
    let payload = br#"{
        "serverContent": {
            "modelTurn": {
                "parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}},
                    {"text": "thinking..."},
                    {"inlineData": {"mimeType": "audio/pcm", "data": "BBBB"}},
                    {"inlineData": {"mimeType": "image/png", "data": "CCCC"}}
                ]
            },
            "outputTranscription": {"text": "Hi "},
            "turnComplete": true
        }
    }"#;

    let message = message(parse_server_event(payload).unwrap());

    assert_eq!(
        message.audio,
        vec![
            InlineAudio {
                data: "AAAA".to_string(),
                sample_rate: 24000
            },
            InlineAudio {
                data: "BBBB".to_string(),
                sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE
            },
        ]
    );
    assert_eq!(message.output_transcription.as_deref(), Some("Hi "));
    assert_eq!(message.input_transcription, None);
    assert!(message.turn_complete);
    assert!(!message.interrupted);
}

#[test]
fn test_interrupted_and_input_transcription() {
    let payload = br#"{"serverContent":{"interrupted":true,"inputTranscription":{"text":"wait"}}}"#;

    let message = message(parse_server_event(payload).unwrap());

    assert!(message.interrupted);
    assert!(message.audio.is_empty());
    assert_eq!(message.input_transcription.as_deref(), Some("wait"));
    assert!(!message.turn_complete);
}

#[test]
fn test_unrelated_messages_are_ignored() {
    let event = parse_server_event(br#"{"usageMetadata":{"totalTokenCount":12}}"#).unwrap();
    assert_eq!(event, None);

    let event = parse_server_event(br#"{"goAway":{"timeLeft":"10s"}}"#).unwrap();
    assert_eq!(event, None);
}

#[test]
fn test_malformed_payload_is_an_error() {
    assert!(parse_server_event(b"not json").is_err());
}

#[test]
fn test_parse_sample_rate() {
    assert_eq!(parse_sample_rate("audio/pcm;rate=24000"), Some(24000));
    assert_eq!(parse_sample_rate("audio/pcm; rate=16000"), Some(16000));
    assert_eq!(parse_sample_rate("audio/pcm"), None);
    assert_eq!(parse_sample_rate("audio/pcm;rate=fast"), None);
}

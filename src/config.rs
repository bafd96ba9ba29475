use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::AudioBackendConfig;
use crate::live::gemini::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::persona::{PersonaConfig, PersonaTemplate, VoiceName};
use crate::session::SessionConfig;

/// Environment variable prefix, e.g. `LOQA_LIVE__SERVICE__MODEL`
pub const ENV_PREFIX: &str = "LOQA_LIVE";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub persona: PersonaSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Live API WebSocket endpoint
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-live".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub frame_size: usize,
    pub display_fps: u32,
    /// Stream WAV input at real-time speed
    pub pace_realtime: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            frame_size: 2048,
            display_fps: 60,
            pace_realtime: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersonaSection {
    /// Built-in template key (assistant, doctor, support)
    pub template: Option<String>,
    /// Overrides the template's prompt
    pub system_instruction: Option<String>,
    pub voice: Option<VoiceName>,
}

impl Config {
    /// Load `path` (any format the config crate knows, extension optional) if it
    /// exists, then apply `LOQA_LIVE__*` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// API key from the configured environment variable, falling back to `API_KEY`
    pub fn api_key(&self) -> Option<String> {
        [self.service.api_key_env.as_str(), "API_KEY"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|key| !key.trim().is_empty())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            capture: AudioBackendConfig {
                target_sample_rate: self.audio.input_sample_rate,
                frame_size: self.audio.frame_size,
                pace_realtime: self.audio.pace_realtime,
            },
            output_sample_rate: self.audio.output_sample_rate,
            ..SessionConfig::default()
        }
        .with_display_fps(self.audio.display_fps)
    }

    /// Persona from the template, instruction and voice settings
    pub fn persona(&self) -> Result<PersonaConfig> {
        let mut persona = match self.persona.template.as_deref() {
            Some(key) => {
                let template = PersonaTemplate::find(key)
                    .with_context(|| format!("Unknown persona template: {}", key))?;
                PersonaConfig::from_template(template, PersonaConfig::default().voice_name)
            }
            None => PersonaConfig::default(),
        };

        if let Some(instruction) = &self.persona.system_instruction {
            persona.system_instruction = instruction.clone();
        }
        if let Some(voice) = self.persona.voice {
            persona.voice_name = voice;
        }

        Ok(persona)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::load("config/does-not-exist").unwrap();
        assert_eq!(cfg.audio.input_sample_rate, 16000);
        assert_eq!(cfg.audio.output_sample_rate, 24000);
        assert_eq!(cfg.service.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_persona_overrides() {
        let mut cfg = Config::default();
        cfg.persona.template = Some("support".to_string());
        cfg.persona.voice = Some(VoiceName::Kore);

        let persona = cfg.persona().unwrap();
        assert_eq!(persona.voice_name, VoiceName::Kore);
        assert!(persona.system_instruction.contains("TechFlow"));

        cfg.persona.system_instruction = Some("Be brief.".to_string());
        assert_eq!(cfg.persona().unwrap().system_instruction, "Be brief.");
    }

    #[test]
    fn test_unknown_template_is_an_error() {
        let mut cfg = Config::default();
        cfg.persona.template = Some("pirate".to_string());
        assert!(cfg.persona().is_err());
    }

    #[test]
    fn test_session_config_from_audio_section() {
        let mut cfg = Config::default();
        cfg.audio.frame_size = 1024;
        cfg.audio.display_fps = 30;

        let session = cfg.session_config();
        assert_eq!(session.capture.frame_size, 1024);
        assert_eq!(session.output_sample_rate, 24000);
        assert!((session.display_interval.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
    }
}

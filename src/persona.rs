// Persona configuration handed to the live service at connect time

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prebuilt voices offered by the live service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum VoiceName {
    Puck,
    Charon,
    Kore,
    Fenrir,
    Zephyr,
}

impl VoiceName {
    pub const ALL: [VoiceName; 5] = [
        VoiceName::Puck,
        VoiceName::Charon,
        VoiceName::Kore,
        VoiceName::Fenrir,
        VoiceName::Zephyr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceName::Puck => "Puck",
            VoiceName::Charon => "Charon",
            VoiceName::Kore => "Kore",
            VoiceName::Fenrir => "Fenrir",
            VoiceName::Zephyr => "Zephyr",
        }
    }
}

impl fmt::Display for VoiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VoiceName::ALL
            .iter()
            .copied()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Unknown voice: {}", s))
    }
}

/// A named starting point for the system instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonaTemplate {
    pub key: &'static str,
    pub name: &'static str,
    pub prompt: &'static str,
}

pub const TEMPLATES: [PersonaTemplate; 3] = [
    PersonaTemplate {
        key: "assistant",
        name: "Helpful Assistant",
        prompt: "You are a friendly and knowledgeable AI assistant. Keep your responses concise and conversational. You are helpful and polite.",
    },
    PersonaTemplate {
        key: "doctor",
        name: "Medical Roleplay (Doctor)",
        prompt: "You are playing the role of a compassionate doctor conducting a patient interview. Use medical terminology correctly but explain things simply. Ask clarifying questions about symptoms. Be professional, empathetic, and strictly adhere to medical ethics. Do not diagnose real conditions, always advise seeing a real professional.",
    },
    PersonaTemplate {
        key: "support",
        name: "Customer Support",
        prompt: "You are a customer support agent for 'TechFlow'. You are patient, apologetic when things go wrong, and focused on solving technical issues efficiently.",
    },
];

impl PersonaTemplate {
    pub fn find(key: &str) -> Option<&'static PersonaTemplate> {
        TEMPLATES.iter().find(|t| t.key.eq_ignore_ascii_case(key))
    }
}

/// Immutable persona record consumed by `connect()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Behavioral instruction given to the model at session start
    pub system_instruction: String,

    /// Prebuilt voice for synthesized speech
    pub voice_name: VoiceName,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_instruction: TEMPLATES[0].prompt.to_string(),
            voice_name: VoiceName::Zephyr,
        }
    }
}

impl PersonaConfig {
    pub fn from_template(template: &PersonaTemplate, voice_name: VoiceName) -> Self {
        Self {
            system_instruction: template.prompt.to_string(),
            voice_name,
        }
    }
}

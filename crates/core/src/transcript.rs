use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Customer,
    Agent,
    System,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Customer => write!(f, "Customer"),
            Speaker::Agent => write!(f, "Agent"),
            Speaker::System => write!(f, "System"),
        }
    }
}

/// How the simulated customer sounds on a given line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Frustrated,
    Anxious,
    Confused,
    Neutral,
    Calm,
    Satisfied,
    Grateful,
}

impl Emotion {
    /// Maps a free-form tag from the LLM onto a known emotion.
    ///
    /// Anything unrecognised becomes [`Emotion::Neutral`].
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "angry" | "furious" => Emotion::Angry,
            "frustrated" | "annoyed" | "upset" => Emotion::Frustrated,
            "anxious" | "worried" | "stressed" | "nervous" => Emotion::Anxious,
            "confused" => Emotion::Confused,
            "calm" | "relieved" => Emotion::Calm,
            "satisfied" | "happy" | "pleased" => Emotion::Satisfied,
            "grateful" | "thankful" => Emotion::Grateful,
            _ => Emotion::Neutral,
        }
    }
}

/// One line of the call transcript.
///
/// Entries are only ever appended; an Agent entry carries the score and
/// feedback for that response once the remote assessment has returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueStep {
    /// Sequence number, starting at 1.
    pub id: u32,
    pub speaker: Speaker,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl DialogueStep {
    pub fn customer(id: u32, message: impl Into<String>, emotion: Emotion) -> Self {
        Self {
            id,
            speaker: Speaker::Customer,
            message: message.into(),
            emotion: Some(emotion),
            score: None,
            feedback: None,
        }
    }

    pub fn agent(id: u32, message: impl Into<String>) -> Self {
        Self {
            id,
            speaker: Speaker::Agent,
            message: message.into(),
            emotion: None,
            score: None,
            feedback: None,
        }
    }

    pub fn system(id: u32, message: impl Into<String>) -> Self {
        Self {
            id,
            speaker: Speaker::System,
            message: message.into(),
            emotion: None,
            score: None,
            feedback: None,
        }
    }
}

/// Renders the transcript as `Speaker: message` lines for prompting.
pub fn format_history(transcript: &[DialogueStep]) -> String {
    transcript
        .iter()
        .map(|step| format!("{}: {}", step.speaker, step.message))
        .collect::<Vec<_>>()
        .join("\n")
}

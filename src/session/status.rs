use serde::{Deserialize, Serialize};
use std::fmt;

use super::transcript::TranscriptEntry;
use crate::onboarding::OnboardingStage;

/// What the agent is doing, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    #[default]
    Idle,
    Connecting,
    Listening,
    Thinking,
    Speaking,
    Error,
}

impl AgentStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Maya is idle",
            Self::Connecting => "Connecting to Maya...",
            Self::Listening => "Listening...",
            Self::Thinking => "Thinking...",
            Self::Speaking => "Maya is speaking...",
            Self::Error => "Connection error",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Label of the single connect/disconnect control
pub fn button_label(status: AgentStatus, connected: bool) -> &'static str {
    if status == AgentStatus::Connecting {
        "Connecting..."
    } else if connected {
        "End Conversation"
    } else {
        "Start with Maya"
    }
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub status: AgentStatus,
    pub transcripts: Vec<TranscriptEntry>,
    pub stage: OnboardingStage,
    pub connected: bool,
    pub last_error: Option<String>,
}

impl AgentSnapshot {
    pub fn button_label(&self) -> &'static str {
        button_label(self.status, self.connected)
    }
}

/// Discrete changes, in the order they happened
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    StatusChanged(AgentStatus),
    TranscriptUpdated(Vec<TranscriptEntry>),
    StageChanged(OnboardingStage),
    ConnectionChanged(bool),
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_label() {
        assert_eq!(button_label(AgentStatus::Connecting, false), "Connecting...");
        assert_eq!(button_label(AgentStatus::Listening, true), "End Conversation");
        assert_eq!(button_label(AgentStatus::Idle, false), "Start with Maya");
    }

    #[test]
    fn test_labels() {
        assert_eq!(AgentStatus::Speaking.to_string(), "Maya is speaking...");
        assert_eq!(AgentStatus::Error.label(), "Connection error");
    }
}

//! Message types for conversation turns and model requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::agent::AgentId;

/// How a turn came to be recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnOrigin {
    /// Opening message of the conversation.
    Initiated,
    /// Auto-generated by the speaking agent.
    Auto,
    /// Supplied by a human in place of the auto reply.
    Human,
    /// Injected from outside the conversation (e.g. a message bus).
    External,
}

/// One recorded turn of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub sender: AgentId,
    pub content: String,
    /// Display name override for the sender (bridged counterparts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub origin: TurnOrigin,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: AgentId, content: impl Into<String>, origin: TurnOrigin) -> Self {
        Self {
            sender,
            content: content.into(),
            name: None,
            origin,
            timestamp: Utc::now(),
        }
    }

    /// Opening message from `sender`.
    pub fn initiate(sender: AgentId, content: impl Into<String>) -> Self {
        Self::new(sender, content, TurnOrigin::Initiated)
    }

    /// Externally supplied message from `sender`.
    pub fn external(sender: AgentId, content: impl Into<String>) -> Self {
        Self::new(sender, content, TurnOrigin::External)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name to present for the sender.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.sender.as_str())
    }
}

/// Role of a message in a completion request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message as sent to the completion backend.
///
/// Deliberately carries no timestamp so identical requests fingerprint
/// identically across runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ModelMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            name: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Render a conversation turn from the point of view of `speaker`:
    /// its own turns are assistant messages, everyone else's are user messages.
    pub fn from_turn(turn: &ChatMessage, speaker: &AgentId) -> Self {
        let message = if &turn.sender == speaker {
            Self::assistant(turn.content.clone())
        } else {
            Self::user(turn.content.clone())
        };
        message.with_name(turn.display_name())
    }
}

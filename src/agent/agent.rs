//! The agent capability interface.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConfabError;
use crate::types::ChatMessage;

/// Unique name of a conversation participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for AgentId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A conversation participant.
///
/// The orchestration core never constructs agents; it only references them
/// by [`AgentId`] and calls these two capabilities.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &AgentId;

    fn description(&self) -> &str {
        ""
    }

    /// Produce the next reply given the conversation so far.
    ///
    /// `Ok(None)` means the agent deliberately has nothing to say.
    async fn generate_reply(
        &self,
        history: &[ChatMessage],
        sender: Option<&AgentId>,
    ) -> Result<Option<String>, ConfabError>;

    /// Accept a message recorded by another participant.
    async fn receive(
        &self,
        _message: &ChatMessage,
        _request_reply: bool,
        _silent: bool,
    ) -> Result<(), ConfabError> {
        Ok(())
    }

    /// Reset any per-counterpart state before a new chat.
    async fn prepare_chat(&self, _counterpart: &AgentId, _clear_history: bool, _prepare_recipient: bool) {}
}

//! Error types for Confab.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

use crate::agent::AgentId;

/// Topology errors. Both are fatal to graph construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown agent '{0}' in speaker transition graph")]
    UnknownAgent(String),

    #[error("agent '{0}' has a self-loop but is not allowed to repeat as speaker")]
    UnauthorizedSelfLoop(AgentId),

    #[error("agent '{0}' is declared more than once")]
    DuplicateAgent(AgentId),
}

/// Next-speaker selection errors. Fatal to the turn, never to the conversation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no eligible speaker after {}", .after.as_ref().map(AgentId::as_str).unwrap_or("<start>"))]
    NoEligibleSpeaker { after: Option<AgentId> },

    #[error("manual selection requires an explicit speaker")]
    ManualPickRequired,

    #[error("speaker '{pick}' may not follow {}", .after.as_ref().map(AgentId::as_str).unwrap_or("<start>"))]
    IneligiblePick {
        pick: AgentId,
        after: Option<AgentId>,
    },

    #[error("speaker proposal '{proposal}' is not among the eligible speakers")]
    InvalidProposal { proposal: String },
}

/// Conversation state machine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    #[error("conversation already terminated")]
    AlreadyTerminated,

    #[error("conversation has not been initiated")]
    NotStarted,

    #[error("conversation was already initiated")]
    AlreadyStarted,

    #[error("agent '{0}' is not a participant of this conversation")]
    NotParticipant(AgentId),
}

/// Completion backend errors. Always transient from the conversation's view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("completion timed out after {0}ms")]
    Timeout(u64),

    #[error("completion cancelled")]
    Cancelled,

    #[error("rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("completion backend error: {message}")]
    Backend { message: String, transient: bool },
}

/// Primary error type for all Confab operations.
#[derive(Error, Debug)]
pub enum ConfabError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "bridge")]
    #[error("Envelope decode error: {0}")]
    Codec(#[from] prost::DecodeError),

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Process error: {0}")]
    Process(String),
}

impl ConfabError {
    /// Create a non-transient backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Completion(CompletionError::Backend {
            message: message.into(),
            transient: false,
        })
    }

    /// Create a transient backend error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Completion(CompletionError::Backend {
            message: message.into(),
            transient: true,
        })
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Graph(_) | Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Selection(_) => ErrorCategory::Selection,
            Self::Conversation(_) => ErrorCategory::Conversation,
            Self::Completion(_) => ErrorCategory::Completion,
            Self::Io(_) => ErrorCategory::Storage,
            Self::Serialization(_) => ErrorCategory::Serialization,
            #[cfg(feature = "bridge")]
            Self::Codec(_) => ErrorCategory::Bridge,
            Self::Bridge(_) => ErrorCategory::Bridge,
            Self::Process(_) => ErrorCategory::Process,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Completion(CompletionError::Backend { transient, .. }) => *transient,
            Self::Completion(_) => true,
            _ => false,
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            Self::Conversation(ConversationError::AlreadyTerminated) => {
                RecoverySuggestion::DiscardConversation
            }
            Self::Conversation(_) => RecoverySuggestion::Ignore,
            err if err.is_retryable() => RecoverySuggestion::RetryTurn,
            err => match err.category() {
                ErrorCategory::Configuration | ErrorCategory::Selection => {
                    RecoverySuggestion::FixConfiguration
                }
                ErrorCategory::Storage | ErrorCategory::Serialization => {
                    RecoverySuggestion::CheckStorage
                }
                ErrorCategory::Process => RecoverySuggestion::CheckProcess,
                _ => RecoverySuggestion::Ignore,
            },
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ConfabError>;

//! Convenience re-exports for common use.

pub use crate::agent::{Agent, AgentId, CompletionAgent};
pub use crate::cache::{CacheSeed, DiskCache, InMemoryCache, ReplyCache};
pub use crate::completion::{CompletionClient, CompletionRequest, CompletionResponse, CompletionService};
pub use crate::config::ConfabConfig;
pub use crate::conversation::{
    ConversationConfig, ConversationController, HumanInput, HumanInputMode, TerminationReason, TurnOutcome,
};
pub use crate::error::{ConfabError, Result};
pub use crate::graph::{GraphConfig, TransitionGraph};
pub use crate::selector::{SelectionStrategy, SpeakerSelector};
pub use crate::types::{ChatMessage, GenerationSettings, ModelMessage, Usage};

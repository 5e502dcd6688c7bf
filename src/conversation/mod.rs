//! Per-conversation turn state machine.
//!
//! A [`ConversationController`] owns one conversation: its history, current
//! speaker and termination status. Turns are strictly sequential; every
//! mutating method takes `&mut self`, so callers serialize access by owning
//! the controller (typically one task per conversation).

pub mod config;
pub mod controller;
pub mod termination;

pub use config::ConversationConfig;
pub use controller::{ConversationController, TurnOutcome};
pub use termination::{
    PhraseTermination, PredicateTermination, RegexTermination, TerminationCondition, TerminationReason,
    DEFAULT_TERMINATION_PHRASE, HUMAN_EXIT,
};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::agent::AgentId;
use crate::error::{ConfabError, ConversationError};
use crate::types::ChatMessage;

/// Identifies one conversation in logs and events.
pub type ConversationId = Uuid;

/// Lifecycle of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationState {
    /// No turn exchanged yet.
    Init,
    /// At least one turn exchanged.
    Conversing,
    /// Terminal: no further turns accepted.
    Terminated,
}

/// Input to [`ConversationState::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// Opening turn.
    Initiate,
    /// Externally supplied turn.
    Inject,
    /// Turn produced by `advance`.
    Turn,
    Terminate,
    Reset,
}

impl ConversationState {
    /// Next state after `event`, or the error that rejects it.
    pub fn transition(self, event: StateEvent) -> Result<Self, ConversationError> {
        use ConversationState::*;
        match (self, event) {
            (_, StateEvent::Reset) => Ok(Init),
            (_, StateEvent::Terminate) => Ok(Terminated),
            (Terminated, _) => Err(ConversationError::AlreadyTerminated),
            (Init, StateEvent::Initiate | StateEvent::Inject) => Ok(Conversing),
            (Init, StateEvent::Turn) => Err(ConversationError::NotStarted),
            (Conversing, StateEvent::Initiate) => Err(ConversationError::AlreadyStarted),
            (Conversing, StateEvent::Inject | StateEvent::Turn) => Ok(Conversing),
        }
    }
}

/// When a human is asked to replace the auto reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HumanInputMode {
    /// Ask before every turn.
    Always,
    /// Ask only when a termination condition was just met.
    Terminate,
    /// Never ask.
    #[default]
    Never,
}

/// Source of human replies.
#[async_trait]
pub trait HumanInput: Send + Sync {
    /// Ask the human; an empty answer means "no override".
    async fn get_human_input(&self, prompt: &str) -> Result<String, ConfabError>;
}

/// Notification emitted by a controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    TurnRecorded { turn: ChatMessage },
    /// A human reply replaced the auto reply of `speaker`.
    HumanOverride { speaker: AgentId },
    /// A termination condition held but a human will be asked first.
    TerminationPending { reason: TerminationReason },
    Terminated { reason: TerminationReason },
}

/// Callback used for conversation events.
pub type ConversationEventSink = Arc<dyn Fn(ConversationEvent) + Send + Sync>;

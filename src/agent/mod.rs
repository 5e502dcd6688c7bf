//! Conversation participants.

pub mod agent;
pub mod completion_agent;

pub use agent::{Agent, AgentId};
pub use completion_agent::CompletionAgent;

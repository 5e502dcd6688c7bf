//! Bridge between a conversation and an actor-style message bus.
//!
//! The bus delivers typed binary [`Envelope`]s. An [`ActorBridge`] turns
//! inbound envelopes into calls on a local
//! [`ConversationController`](crate::conversation::ConversationController)
//! and the local agent; a [`RemoteAgent`] sends the local side's turns back out.

pub mod envelope;
pub mod remote;
pub mod session;

pub use envelope::{BridgeMessage, Envelope, GenReplyReq, GenReplyResp, MessageKind, PrepChat, ReceiveReq, Terminate};
pub use remote::{AliasGuard, RemoteAgent};
pub use session::{ActorBridge, BridgeState};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ConfabError;

/// Sends messages to one actor topic.
#[async_trait]
pub trait ActorConnector: Send + Sync {
    /// Fire-and-forget send.
    async fn send_bin_msg(&self, msg_type: &str, payload: Vec<u8>) -> Result<(), ConfabError>;

    /// Send and wait for the actor's response envelope.
    async fn binary_request(&self, msg_type: &str, _payload: Vec<u8>) -> Result<Envelope, ConfabError> {
        Err(ConfabError::Bridge(format!(
            "connector does not support request/response ({msg_type})"
        )))
    }
}

/// Resolves topics to connectors.
#[async_trait]
pub trait ActorNetwork: Send + Sync {
    async fn connector_by_topic(&self, topic: &str) -> Result<Arc<dyn ActorConnector>, ConfabError>;
}

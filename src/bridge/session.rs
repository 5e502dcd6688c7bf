//! One bridge session: a local agent talking to one remote counterpart.

use std::collections::HashMap;
use std::sync::Arc;

use prost::Message;
use strum::Display;

use crate::agent::{Agent, AgentId};
use crate::conversation::{ConversationController, PhraseTermination, TurnOutcome};
use crate::error::{ConfabError, ConversationError};
use crate::graph::TransitionGraph;
use crate::selector::{SelectionStrategy, SpeakerSelector};
use crate::types::ChatMessage;

use super::envelope::{BridgeMessage, Envelope, GenReplyResp, MessageKind, PrepChat, ReceiveReq};
use super::remote::RemoteAgent;
use super::{ActorConnector, ActorNetwork};

/// Whether the session has exchanged anything yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeState {
    Init,
    Conversing,
}

impl BridgeState {
    /// State after an inbound conversation message.
    pub fn on_receive(self) -> Self {
        Self::Conversing
    }
}

/// Adapts inbound bus envelopes into conversation transitions.
///
/// [`handle`](Self::handle) returns `false` when the session should stop.
pub struct ActorBridge {
    name: String,
    local: Arc<dyn Agent>,
    remote: Arc<RemoteAgent>,
    controller: ConversationController,
    network: Arc<dyn ActorNetwork>,
    connectors: HashMap<String, Arc<dyn ActorConnector>>,
    state: BridgeState,
    init_chat: bool,
    self_recursive: bool,
}

impl ActorBridge {
    /// Bridge `local` to the remote actor named `counterpart`.
    pub async fn connect(
        local: Arc<dyn Agent>,
        counterpart: impl Into<AgentId>,
        network: Arc<dyn ActorNetwork>,
    ) -> Result<Self, ConfabError> {
        let remote = Arc::new(RemoteAgent::connect(network.as_ref(), counterpart).await?);
        Self::new(local, remote, network)
    }

    pub fn new(
        local: Arc<dyn Agent>,
        remote: Arc<RemoteAgent>,
        network: Arc<dyn ActorNetwork>,
    ) -> Result<Self, ConfabError> {
        let agents = vec![local.id().clone(), remote.id().clone()];
        let selector = SpeakerSelector::new(
            agents.clone(),
            TransitionGraph::fully_connected(&agents),
            SelectionStrategy::RoundRobin,
        );
        let participants: Vec<Arc<dyn Agent>> = vec![local.clone(), remote.clone()];
        let controller = ConversationController::new(participants, selector)?
            .with_termination(PhraseTermination::default());
        Ok(Self {
            name: format!("{}.bridge", local.id()),
            local,
            remote,
            controller,
            network,
            connectors: HashMap::new(),
            state: BridgeState::Init,
            init_chat: false,
            self_recursive: true,
        })
    }

    /// Open the conversation from the local side on the first Receive.
    pub fn with_init_chat(mut self, init_chat: bool) -> Self {
        self.init_chat = init_chat;
        self
    }

    /// Stop the counterpart when the local agent produces no reply.
    pub fn with_self_recursive(mut self, self_recursive: bool) -> Self {
        self.self_recursive = self_recursive;
        self
    }

    /// Replace the controller's policy, e.g. termination or human input.
    pub fn configure(mut self, f: impl FnOnce(ConversationController) -> ConversationController) -> Self {
        self.controller = f(self.controller);
        self
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn controller(&self) -> &ConversationController {
        &self.controller
    }

    pub fn remote(&self) -> &Arc<RemoteAgent> {
        &self.remote
    }

    /// Dispatch one inbound envelope. `false` means stop the session.
    pub async fn handle(&mut self, envelope: Envelope) -> bool {
        tracing::info!(
            bridge = %self.name,
            topic = %envelope.topic,
            msg_type = %envelope.msg_type,
            "bridge message received"
        );
        let message = match BridgeMessage::decode(&envelope) {
            Ok(message) => message,
            Err(error) => {
                tracing::error!(bridge = %self.name, msg_type = %envelope.msg_type, %error, "undecodable envelope");
                return true;
            }
        };

        match message {
            BridgeMessage::Receive(req) => self.on_receive(req).await,
            BridgeMessage::GenerateReplyRequest(_) => self.on_generate_reply(&envelope.sender).await,
            BridgeMessage::PrepareChat(prep) => self.on_prepare_chat(prep).await,
            BridgeMessage::Terminate => {
                tracing::warn!(bridge = %self.name, topic = %envelope.topic, "terminate received");
                false
            }
            BridgeMessage::GenerateReplyResponse(_) => {
                tracing::debug!(bridge = %self.name, "ignoring unsolicited reply response");
                true
            }
            BridgeMessage::Unknown(tag) => {
                tracing::error!(bridge = %self.name, topic = %envelope.topic, msg_type = %tag, "unhandled message type");
                true
            }
        }
    }

    /// Plain-text delivery from the counterpart, always asking for a reply.
    pub async fn handle_text(&mut self, text: &str) -> bool {
        self.deliver(ReceiveReq::text(String::new(), text)).await
    }

    async fn on_receive(&mut self, req: ReceiveReq) -> bool {
        self.deliver(req).await
    }

    async fn deliver(&mut self, req: ReceiveReq) -> bool {
        self.remote.reset_receive_called();

        let opening = self.state == BridgeState::Init && self.init_chat;
        self.state = self.state.on_receive();
        let result = if opening {
            let message = ChatMessage::initiate(self.local.id().clone(), req.content());
            self.controller.initiate(message).await
        } else {
            self.converse(&req).await
        };

        match result {
            Ok(()) => {}
            Err(ConfabError::Conversation(ConversationError::AlreadyTerminated)) => {
                tracing::info!(bridge = %self.name, "conversation already terminated");
                return false;
            }
            Err(error) => tracing::error!(bridge = %self.name, %error, "failed to process receive"),
        }

        // No reply went out: treat the exchange as finished.
        if !self.remote.was_receive_called() && self.self_recursive {
            tracing::warn!(bridge = %self.name, "no reply produced, terminating counterpart");
            if let Err(error) = self.remote.send_terminate(self.local.id()).await {
                tracing::warn!(bridge = %self.name, %error, "failed to send terminate");
            }
            return false;
        }
        true
    }

    /// Record the counterpart's turn under its inbound name, then let the
    /// local agent answer if asked to.
    async fn converse(&mut self, req: &ReceiveReq) -> Result<(), ConfabError> {
        let remote = self.remote.clone();
        let _alias = (!req.sender.is_empty()).then(|| remote.alias(req.sender.as_str()));

        let message = ChatMessage::external(remote.id().clone(), req.content()).with_name(remote.name());
        self.controller
            .receive_with(message, req.silent.unwrap_or(false))
            .await?;

        if req.request_reply.unwrap_or(true) && !self.controller.is_terminated() {
            let local = self.local.id().clone();
            if let TurnOutcome::Silent(_) = self.controller.advance_as(&local).await? {
                tracing::debug!(bridge = %self.name, "local agent stayed silent");
            }
        }
        Ok(())
    }

    async fn on_generate_reply(&mut self, sender_topic: &str) -> bool {
        let reply = match self
            .local
            .generate_reply(self.controller.history(), Some(self.remote.id()))
            .await
        {
            Ok(reply) => reply.unwrap_or_default(),
            Err(error) => {
                tracing::error!(bridge = %self.name, %error, "failed to generate reply");
                String::new()
            }
        };

        let connector = match self.connector(sender_topic).await {
            Ok(connector) => connector,
            Err(error) => {
                tracing::error!(bridge = %self.name, topic = sender_topic, %error, "no connector for reply");
                return true;
            }
        };
        let response = GenReplyResp {
            data: reply.into_bytes(),
        };
        if let Err(error) = connector
            .send_bin_msg(&MessageKind::GenerateReplyResponse.to_string(), response.encode_to_vec())
            .await
        {
            tracing::error!(bridge = %self.name, topic = sender_topic, %error, "failed to send reply");
        }
        true
    }

    async fn on_prepare_chat(&mut self, prep: PrepChat) -> bool {
        self.local
            .prepare_chat(self.remote.id(), prep.clear_history, prep.prepare_recipient)
            .await;
        if prep.clear_history {
            self.controller.reset();
        }
        true
    }

    /// Connector for `topic`, looked up once per session.
    pub async fn connector(&mut self, topic: &str) -> Result<Arc<dyn ActorConnector>, ConfabError> {
        if let Some(connector) = self.connectors.get(topic) {
            return Ok(connector.clone());
        }
        let connector = self.network.connector_by_topic(topic).await?;
        self.connectors.insert(topic.to_string(), connector.clone());
        Ok(connector)
    }
}

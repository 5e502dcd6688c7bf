//! Local stand-in for a participant living on the actor bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use prost::Message;

use crate::agent::{Agent, AgentId};
use crate::error::ConfabError;
use crate::types::ChatMessage;

use super::envelope::{GenReplyReq, GenReplyResp, MessageKind, PrepChat, ReceiveReq, Terminate};
use super::{ActorConnector, ActorNetwork};

/// Proxy agent that forwards conversation traffic to a remote actor.
///
/// Turns it receives are sent as `ReceiveReq` envelopes; its own replies are
/// requested with `GenReplyReq`.
pub struct RemoteAgent {
    id: AgentId,
    connector: Arc<dyn ActorConnector>,
    alias: Mutex<Option<String>>,
    receive_called: AtomicBool,
}

impl RemoteAgent {
    pub fn new(id: impl Into<AgentId>, connector: Arc<dyn ActorConnector>) -> Self {
        Self {
            id: id.into(),
            connector,
            alias: Mutex::new(None),
            receive_called: AtomicBool::new(false),
        }
    }

    /// Proxy for the actor listening on the topic named after `id`.
    pub async fn connect(network: &dyn ActorNetwork, id: impl Into<AgentId>) -> Result<Self, ConfabError> {
        let id = id.into();
        let connector = network.connector_by_topic(id.as_str()).await?;
        Ok(Self::new(id, connector))
    }

    /// Current display name: the active alias, else the id.
    pub fn name(&self) -> String {
        self.alias
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Present as `name` until the returned guard is dropped.
    pub fn alias(&self, name: impl Into<String>) -> AliasGuard<'_> {
        let mut alias = self.alias.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = alias.replace(name.into());
        AliasGuard { agent: self, previous }
    }

    pub fn reset_receive_called(&self) {
        self.receive_called.store(false, Ordering::SeqCst);
    }

    /// Whether anything was forwarded since the last reset.
    pub fn was_receive_called(&self) -> bool {
        self.receive_called.load(Ordering::SeqCst)
    }

    /// Tell the remote actor to stop.
    pub async fn send_terminate(&self, sender: &AgentId) -> Result<(), ConfabError> {
        tracing::debug!(remote = %self.id, %sender, "sending terminate");
        self.connector
            .send_bin_msg(&MessageKind::Terminate.to_string(), Terminate {}.encode_to_vec())
            .await
    }
}

#[async_trait]
impl Agent for RemoteAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn generate_reply(
        &self,
        _history: &[ChatMessage],
        _sender: Option<&AgentId>,
    ) -> Result<Option<String>, ConfabError> {
        let response = self
            .connector
            .binary_request(&MessageKind::GenerateReplyRequest.to_string(), GenReplyReq {}.encode_to_vec())
            .await?;
        if response.kind() != MessageKind::GenerateReplyResponse {
            return Err(ConfabError::Bridge(format!(
                "expected {} from {}, got {}",
                MessageKind::GenerateReplyResponse,
                self.id,
                response.msg_type
            )));
        }
        let reply = GenReplyResp::decode(response.payload.as_slice())?;
        let text = String::from_utf8_lossy(&reply.data).into_owned();
        Ok((!text.is_empty()).then_some(text))
    }

    async fn receive(&self, message: &ChatMessage, request_reply: bool, silent: bool) -> Result<(), ConfabError> {
        self.receive_called.store(true, Ordering::SeqCst);
        let req = ReceiveReq {
            data: Some(message.content.clone()),
            sender: message.display_name().to_string(),
            request_reply: Some(request_reply),
            silent: Some(silent),
            ..ReceiveReq::default()
        };
        self.connector
            .send_bin_msg(&MessageKind::Receive.to_string(), req.encode_to_vec())
            .await
    }

    async fn prepare_chat(&self, _counterpart: &AgentId, clear_history: bool, prepare_recipient: bool) {
        let msg = PrepChat {
            clear_history,
            prepare_recipient,
        };
        if let Err(error) = self
            .connector
            .send_bin_msg(&MessageKind::PrepareChat.to_string(), msg.encode_to_vec())
            .await
        {
            tracing::warn!(remote = %self.id, %error, "failed to forward prepare chat");
        }
    }
}

/// Restores the previous display name of a [`RemoteAgent`] on drop.
pub struct AliasGuard<'a> {
    agent: &'a RemoteAgent,
    previous: Option<String>,
}

impl Drop for AliasGuard<'_> {
    fn drop(&mut self) {
        *self.agent.alias.lock().unwrap_or_else(PoisonError::into_inner) = self.previous.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Envelope;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ActorConnector for Recorder {
        async fn send_bin_msg(&self, msg_type: &str, payload: Vec<u8>) -> Result<(), ConfabError> {
            self.sent.lock().unwrap().push((msg_type.to_string(), payload));
            Ok(())
        }

        async fn binary_request(&self, _msg_type: &str, _payload: Vec<u8>) -> Result<Envelope, ConfabError> {
            let resp = GenReplyResp {
                data: b"pong".to_vec(),
            };
            Ok(Envelope::new(&MessageKind::GenerateReplyResponse, resp.encode_to_vec(), "me", "remote"))
        }
    }

    #[test]
    fn alias_is_restored_on_drop() {
        let remote = RemoteAgent::new("bob", Arc::new(Recorder::default()));
        {
            let _outer = remote.alias("carol");
            assert_eq!(remote.name(), "carol");
            {
                let _inner = remote.alias("dave");
                assert_eq!(remote.name(), "dave");
            }
            assert_eq!(remote.name(), "carol");
        }
        assert_eq!(remote.name(), "bob");
    }

    #[tokio::test]
    async fn receive_forwards_turn_and_marks_called() {
        let recorder = Arc::new(Recorder::default());
        let remote = RemoteAgent::new("bob", recorder.clone());
        assert!(!remote.was_receive_called());

        let turn = ChatMessage::external(AgentId::new("alice"), "hello");
        remote.receive(&turn, true, false).await.unwrap();
        assert!(remote.was_receive_called());

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "ReceiveReq");
        let req = ReceiveReq::decode(sent[0].1.as_slice()).unwrap();
        assert_eq!(req.content(), "hello");
        assert_eq!(req.sender, "alice");
        assert_eq!(req.request_reply, Some(true));
    }

    #[tokio::test]
    async fn generate_reply_round_trips_through_connector() {
        let remote = RemoteAgent::new("bob", Arc::new(Recorder::default()));
        let reply = remote.generate_reply(&[], None).await.unwrap();
        assert_eq!(reply.as_deref(), Some("pong"));
    }
}

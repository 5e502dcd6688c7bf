//! Bridge envelopes and their protobuf payloads.

use std::collections::{BTreeMap, HashMap};

use prost::Message;
use strum::{Display, EnumString};

/// A typed binary message as carried by the actor bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Type tag naming the payload message.
    pub msg_type: String,
    pub payload: Vec<u8>,
    pub topic: String,
    /// Topic of the sending actor, used to route responses.
    pub sender: String,
}

impl Envelope {
    pub fn new(kind: &MessageKind, payload: Vec<u8>, topic: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            msg_type: kind.to_string(),
            payload,
            topic: topic.into(),
            sender: sender.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.msg_type
            .parse()
            .unwrap_or_else(|_| MessageKind::Unknown(self.msg_type.clone()))
    }
}

/// Envelope type tags. Outbound tags are the payload message names; the
/// long names are accepted inbound as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, EnumString)]
pub enum MessageKind {
    #[strum(to_string = "ReceiveReq", serialize = "Receive")]
    Receive,
    #[strum(to_string = "GenReplyReq", serialize = "GenerateReplyRequest")]
    GenerateReplyRequest,
    #[strum(to_string = "GenReplyResp", serialize = "GenerateReplyResponse")]
    GenerateReplyResponse,
    #[strum(to_string = "PrepChat", serialize = "PrepareChat")]
    PrepareChat,
    #[strum(to_string = "Terminate")]
    Terminate,
    #[strum(default)]
    Unknown(String),
}

/// Deliver a message to the receiving agent.
#[derive(Clone, PartialEq, Message)]
pub struct ReceiveReq {
    #[prost(string, optional, tag = "1")]
    pub data: Option<String>,
    /// Structured content; takes precedence over `data` when non-empty.
    #[prost(map = "string, string", tag = "2")]
    pub data_map: HashMap<String, String>,
    #[prost(string, tag = "3")]
    pub sender: String,
    #[prost(bool, optional, tag = "4")]
    pub request_reply: Option<bool>,
    #[prost(bool, optional, tag = "5")]
    pub silent: Option<bool>,
}

impl ReceiveReq {
    pub fn text(sender: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            sender: sender.into(),
            ..Self::default()
        }
    }

    /// Message content as text. Structured content is rendered as JSON with
    /// sorted keys.
    pub fn content(&self) -> String {
        if self.data_map.is_empty() {
            return self.data.clone().unwrap_or_default();
        }
        let sorted: BTreeMap<_, _> = self.data_map.iter().collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    }
}

/// Ask the receiver for a reply without advancing its history.
#[derive(Clone, PartialEq, Message)]
pub struct GenReplyReq {}

#[derive(Clone, PartialEq, Message)]
pub struct GenReplyResp {
    /// UTF-8 reply text; empty when the agent had nothing to say.
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PrepChat {
    #[prost(bool, tag = "1")]
    pub clear_history: bool,
    #[prost(bool, tag = "2")]
    pub prepare_recipient: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct Terminate {}

/// An envelope with its payload decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeMessage {
    Receive(ReceiveReq),
    GenerateReplyRequest(GenReplyReq),
    GenerateReplyResponse(GenReplyResp),
    PrepareChat(PrepChat),
    Terminate,
    Unknown(String),
}

impl BridgeMessage {
    pub fn decode(envelope: &Envelope) -> Result<Self, prost::DecodeError> {
        let payload = envelope.payload.as_slice();
        Ok(match envelope.kind() {
            MessageKind::Receive => Self::Receive(ReceiveReq::decode(payload)?),
            MessageKind::GenerateReplyRequest => Self::GenerateReplyRequest(GenReplyReq::decode(payload)?),
            MessageKind::GenerateReplyResponse => Self::GenerateReplyResponse(GenReplyResp::decode(payload)?),
            MessageKind::PrepareChat => Self::PrepareChat(PrepChat::decode(payload)?),
            MessageKind::Terminate => Self::Terminate,
            MessageKind::Unknown(tag) => Self::Unknown(tag),
        })
    }
}

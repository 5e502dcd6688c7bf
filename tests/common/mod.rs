//! Shared test helpers: mock completion service, scripted agents and a mock bus.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;

use confab::agent::{Agent, AgentId};
use confab::bridge::{ActorConnector, ActorNetwork, Envelope, GenReplyResp, MessageKind};
use confab::completion::{CompletionRequest, CompletionResponse, CompletionService};
use confab::conversation::HumanInput;
use confab::error::ConfabError;
use confab::types::*;

pub fn ids(names: &[&str]) -> Vec<AgentId> {
    names.iter().map(|name| AgentId::new(*name)).collect()
}

/// A completion service that returns canned responses and counts calls.
pub struct MockCompletionService {
    responses: Mutex<VecDeque<Result<CompletionResponse, ConfabError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletionService {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a text response with fixed usage.
    pub fn queue_response(&self, text: &str) {
        self.responses.lock().unwrap().push_back(Ok(CompletionResponse {
            text: text.to_string(),
            usage: Usage::new(10, 20),
            cost: Cost::new(0.5),
            model: Some("mock-model".to_string()),
            finish_reason: Some(FinishReason::Stop),
        }));
    }

    pub fn queue_error(&self, error: ConfabError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for MockCompletionService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ConfabError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(CompletionResponse {
                text: "Mock response".to_string(),
                usage: Usage::new(10, 20),
                cost: Cost::new(0.5),
                model: Some("mock-model".to_string()),
                finish_reason: Some(FinishReason::Stop),
            })
        })
    }
}

/// An agent that replies from a script and records what it receives.
pub struct ScriptedAgent {
    id: AgentId,
    replies: Mutex<VecDeque<Result<Option<String>, String>>>,
    received: Mutex<Vec<(ChatMessage, bool)>>,
    silent: Mutex<Vec<bool>>,
    prepared: Mutex<Vec<(AgentId, bool, bool)>>,
    generate_calls: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(id: &str) -> Self {
        Self {
            id: AgentId::new(id),
            replies: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
            silent: Mutex::new(Vec::new()),
            prepared: Mutex::new(Vec::new()),
            generate_calls: AtomicUsize::new(0),
        }
    }

    /// Queue replies; `None` means "nothing to say".
    pub fn with_replies<'a>(self, replies: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .extend(replies.into_iter().map(|reply| Ok(reply.map(str::to_string))));
        self
    }

    pub fn queue_failure(&self, message: &str) {
        self.replies.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn received(&self) -> Vec<(ChatMessage, bool)> {
        self.received.lock().unwrap().clone()
    }

    /// The `silent` flag of every delivery, in order.
    pub fn silent_flags(&self) -> Vec<bool> {
        self.silent.lock().unwrap().clone()
    }

    pub fn prepared(&self) -> Vec<(AgentId, bool, bool)> {
        self.prepared.lock().unwrap().clone()
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn description(&self) -> &str {
        "scripted test agent"
    }

    async fn generate_reply(
        &self,
        _history: &[ChatMessage],
        _sender: Option<&AgentId>,
    ) -> Result<Option<String>, ConfabError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(ConfabError::transient(message)),
            None => Ok(Some(format!("{} says hi", self.id))),
        }
    }

    async fn receive(&self, message: &ChatMessage, request_reply: bool, silent: bool) -> Result<(), ConfabError> {
        self.received.lock().unwrap().push((message.clone(), request_reply));
        self.silent.lock().unwrap().push(silent);
        Ok(())
    }

    async fn prepare_chat(&self, counterpart: &AgentId, clear_history: bool, prepare_recipient: bool) {
        self.prepared
            .lock()
            .unwrap()
            .push((counterpart.clone(), clear_history, prepare_recipient));
    }
}

/// Human input from a script; records every prompt.
pub struct ScriptedHuman {
    inputs: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedHuman {
    pub fn new(inputs: &[&str]) -> Self {
        Self {
            inputs: Mutex::new(inputs.iter().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl HumanInput for ScriptedHuman {
    async fn get_human_input(&self, prompt: &str) -> Result<String, ConfabError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.inputs.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Records outbound envelopes; answers reply requests from a queue.
#[derive(Default)]
pub struct MockConnector {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    replies: Mutex<VecDeque<String>>,
}

impl MockConnector {
    pub fn queue_reply(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(reply.to_string());
    }

    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent().into_iter().map(|(msg_type, _)| msg_type).collect()
    }
}

#[async_trait]
impl ActorConnector for MockConnector {
    async fn send_bin_msg(&self, msg_type: &str, payload: Vec<u8>) -> Result<(), ConfabError> {
        self.sent.lock().unwrap().push((msg_type.to_string(), payload));
        Ok(())
    }

    async fn binary_request(&self, msg_type: &str, payload: Vec<u8>) -> Result<Envelope, ConfabError> {
        self.sent.lock().unwrap().push((msg_type.to_string(), payload));
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_default();
        let response = GenReplyResp {
            data: reply.into_bytes(),
        };
        Ok(Envelope::new(
            &MessageKind::GenerateReplyResponse,
            response.encode_to_vec(),
            "local",
            "remote",
        ))
    }
}

/// Hands out one connector per topic and counts lookups.
#[derive(Default)]
pub struct MockNetwork {
    connectors: Mutex<HashMap<String, Arc<MockConnector>>>,
    lookups: AtomicUsize,
}

impl MockNetwork {
    pub fn connector(&self, topic: &str) -> Arc<MockConnector> {
        self.connectors
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActorNetwork for MockNetwork {
    async fn connector_by_topic(&self, topic: &str) -> Result<Arc<dyn ActorConnector>, ConfabError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.connector(topic))
    }
}

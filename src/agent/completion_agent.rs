//! Agent whose replies come from the completion backend.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheSeed;
use crate::completion::{CompletionClient, CompletionRequest};
use crate::error::ConfabError;
use crate::types::{ChatMessage, GenerationSettings, ModelMessage};

use super::agent::{Agent, AgentId};

/// An agent backed by a [`CompletionClient`].
///
/// Every reply goes through the client's cache first, so replaying the same
/// conversation under the same seed costs nothing after the first run.
pub struct CompletionAgent {
    id: AgentId,
    description: String,
    system_prompt: Option<String>,
    settings: GenerationSettings,
    seed: CacheSeed,
    client: Arc<CompletionClient>,
}

impl CompletionAgent {
    pub fn new(id: impl Into<AgentId>, client: Arc<CompletionClient>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            system_prompt: None,
            settings: GenerationSettings::default(),
            seed: CacheSeed::Default,
            client,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_seed(mut self, seed: CacheSeed) -> Self {
        self.seed = seed;
        self
    }

    /// Build the request this agent would send for `history`.
    pub fn build_request(&self, history: &[ChatMessage]) -> CompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(ref sys) = self.system_prompt {
            messages.push(ModelMessage::system(sys.clone()));
        }
        messages.extend(history.iter().map(|turn| ModelMessage::from_turn(turn, &self.id)));
        CompletionRequest::new(messages).with_settings(self.settings.clone())
    }
}

#[async_trait]
impl Agent for CompletionAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn generate_reply(
        &self,
        history: &[ChatMessage],
        _sender: Option<&AgentId>,
    ) -> Result<Option<String>, ConfabError> {
        let request = self.build_request(history);
        let response = self.client.create(&request, self.seed).await?;
        if response.text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(response.text))
    }
}

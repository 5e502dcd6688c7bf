//! Completion requests, the backend contract, and the caching client.

pub mod client;

pub use client::CompletionClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ConfabError;
use crate::types::{Cost, FinishReason, GenerationSettings, ModelMessage, Usage};

/// Tool definition offered to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A request for one reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ModelMessage>,
    #[serde(default)]
    pub settings: GenerationSettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ModelMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Canonical form: message order kept, settings canonicalized, tools
    /// sorted by name with later duplicates dropped.
    pub fn normalized(&self) -> Self {
        let mut tools = self.tools.clone();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools.dedup_by(|a, b| a.name == b.name);
        Self {
            messages: self.messages.clone(),
            settings: self.settings.normalized(),
            tools,
        }
    }

    /// Stable SHA-256 hex digest of the normalized request.
    ///
    /// Serialized through `serde_json::Value`, whose object keys are ordered,
    /// so the digest does not depend on field or map insertion order.
    pub fn fingerprint(&self) -> Result<String, ConfabError> {
        let canonical = serde_json::to_value(self.normalized())?;
        let bytes = serde_json::to_vec(&canonical)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }
}

/// A reply produced by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionResponse {
    pub text: String,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub cost: Cost,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: Usage::default(),
            cost: Cost::default(),
            model: None,
            finish_reason: Some(FinishReason::Stop),
        }
    }
}

/// The external model-completion backend.
///
/// Implementations own cancellation of their in-flight calls; a cancelled
/// call should surface as [`CompletionError::Cancelled`](crate::error::CompletionError).
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str {
        "completion"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ConfabError>;
}

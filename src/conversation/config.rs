//! Declarative conversation setup.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentId};
use crate::cache::CacheSeed;
use crate::completion::CompletionClient;
use crate::error::{ConfabError, GraphError};
use crate::graph::{self, invert, GraphConfig, GraphWarning};
use crate::selector::{SelectionStrategy, SpeakerSelector};

use super::termination::{PhraseTermination, DEFAULT_TERMINATION_PHRASE};
use super::{ConversationController, HumanInputMode};

/// Conversation topology and policy.
///
/// ```toml
/// agents = ["planner", "coder", "critic"]
/// speaker_selection = "round_robin"
/// max_consecutive_auto_reply = 10
///
/// [graph.allowed]
/// planner = ["coder"]
/// coder = ["critic"]
/// critic = ["planner", "coder"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Declaration order; empty means "participants in the order given".
    pub agents: Vec<String>,
    pub graph: Option<GraphConfig>,
    /// Agents allowed to speak twice in a row; `None` leaves it unrestricted.
    pub allow_repeat_speakers: Option<Vec<String>>,
    pub speaker_selection: SelectionStrategy,
    pub max_consecutive_auto_reply: Option<u32>,
    pub human_input_mode: HumanInputMode,
    /// `None` disables phrase termination.
    pub termination_phrase: Option<String>,
    /// Cache seed for `auto` selection; `None` disables caching of it.
    pub seed: Option<u64>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            graph: None,
            allow_repeat_speakers: None,
            speaker_selection: SelectionStrategy::default(),
            max_consecutive_auto_reply: None,
            human_input_mode: HumanInputMode::default(),
            termination_phrase: Some(DEFAULT_TERMINATION_PHRASE.to_string()),
            seed: Some(crate::cache::LEGACY_DEFAULT_SEED),
        }
    }
}

impl ConversationConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfabError> {
        toml::from_str(raw).map_err(|e| ConfabError::Configuration(e.to_string()))
    }

    /// Build a controller over `participants`. Graph problems fail here,
    /// before any turn is exchanged; warnings are returned alongside.
    pub fn build(
        &self,
        participants: Vec<Arc<dyn Agent>>,
        completion: Option<Arc<CompletionClient>>,
    ) -> Result<(ConversationController, Vec<GraphWarning>), ConfabError> {
        let agents = self.declared_agents(&participants)?;
        let allow_repeat: Option<Vec<AgentId>> = self
            .allow_repeat_speakers
            .as_ref()
            .map(|names| names.iter().map(|name| AgentId::new(name.as_str())).collect());

        let validated = match &self.graph {
            Some(graph) => graph.build(&agents, allow_repeat.as_deref())?,
            None => {
                // No explicit graph: everyone may follow everyone, minus
                // self-loops for agents not allowed to repeat.
                let disallowed = match &allow_repeat {
                    Some(allowed) => agents
                        .iter()
                        .filter(|agent| !allowed.contains(agent))
                        .map(|agent| (agent.clone(), vec![agent.clone()]))
                        .collect(),
                    None => Default::default(),
                };
                let full = invert(&disallowed, &agents);
                graph::validate(&full.to_transitions(), &agents, allow_repeat.as_deref())?
            }
        };

        let descriptions = agents
            .iter()
            .map(|id| {
                participants
                    .iter()
                    .find(|agent| agent.id() == id)
                    .map(|agent| agent.description().to_string())
                    .unwrap_or_default()
            })
            .collect();
        let mut selector = SpeakerSelector::new(agents, validated.graph, self.speaker_selection)
            .with_descriptions(descriptions)
            .with_seed(CacheSeed::from(self.seed));
        if let Some(client) = completion {
            selector = selector.with_completion(client);
        }

        let mut controller = ConversationController::new(participants, selector)?
            .with_max_consecutive_auto_reply(self.max_consecutive_auto_reply);
        if let Some(phrase) = &self.termination_phrase {
            controller = controller.with_termination(PhraseTermination::new(phrase.clone()));
        }
        Ok((controller, validated.warnings))
    }

    fn declared_agents(&self, participants: &[Arc<dyn Agent>]) -> Result<Vec<AgentId>, ConfabError> {
        if self.agents.is_empty() {
            return Ok(participants.iter().map(|agent| agent.id().clone()).collect());
        }
        self.agents
            .iter()
            .map(|name| {
                participants
                    .iter()
                    .find(|agent| agent.id().as_str() == name)
                    .map(|agent| agent.id().clone())
                    .ok_or_else(|| GraphError::UnknownAgent(name.clone()).into())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_full_config() {
        let config = ConversationConfig::from_toml_str(
            r#"
            agents = ["a", "b"]
            speaker_selection = "round_robin"
            human_input_mode = "TERMINATE"
            max_consecutive_auto_reply = 4
            allow_repeat_speakers = ["a"]

            [graph.disallowed]
            a = ["b"]
            "#,
        )
        .unwrap();

        assert_eq!(config.agents, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(config.speaker_selection, SelectionStrategy::RoundRobin);
        assert_eq!(config.human_input_mode, HumanInputMode::Terminate);
        assert_eq!(config.max_consecutive_auto_reply, Some(4));
        assert_eq!(config.termination_phrase.as_deref(), Some("TERMINATE"));
        assert!(matches!(config.graph, Some(GraphConfig::Disallowed(_))));
    }

    #[test]
    fn defaults_are_sensible() {
        let config = ConversationConfig::from_toml_str("").unwrap();
        assert_eq!(config, ConversationConfig::default());
        assert_eq!(config.human_input_mode, HumanInputMode::Never);
        assert_eq!(config.speaker_selection, SelectionStrategy::Auto);
    }
}

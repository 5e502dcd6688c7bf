//! Next-speaker selection under a speaker-transition graph.
//!
//! Eligibility always comes from the graph; the strategy only decides which
//! eligible agent speaks. Candidate order is the agent declaration order.

use std::sync::Arc;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::agent::AgentId;
use crate::cache::CacheSeed;
use crate::completion::{CompletionClient, CompletionRequest};
use crate::error::{ConfabError, SelectionError};
use crate::graph::TransitionGraph;
use crate::types::{ChatMessage, GenerationSettings, ModelMessage};

/// How the next speaker is picked among the eligible agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SelectionStrategy {
    /// Ask the completion backend to pick.
    #[default]
    Auto,
    /// Next eligible agent in declaration order, wrapping.
    RoundRobin,
    /// Uniformly random eligible agent.
    Random,
    /// Caller supplies the pick.
    Manual,
}

/// Picks the next speaker for a conversation.
pub struct SpeakerSelector {
    agents: Vec<AgentId>,
    descriptions: Vec<String>,
    graph: TransitionGraph,
    strategy: SelectionStrategy,
    client: Option<Arc<CompletionClient>>,
    settings: GenerationSettings,
    seed: CacheSeed,
}

impl SpeakerSelector {
    /// `agents` is the declaration order used for tie-breaks.
    pub fn new(agents: Vec<AgentId>, graph: TransitionGraph, strategy: SelectionStrategy) -> Self {
        let descriptions = vec![String::new(); agents.len()];
        Self {
            agents,
            descriptions,
            graph,
            strategy,
            client: None,
            settings: GenerationSettings::default(),
            seed: CacheSeed::Default,
        }
    }

    /// Completion client consulted by [`SelectionStrategy::Auto`].
    pub fn with_completion(mut self, client: Arc<CompletionClient>) -> Self {
        self.client = Some(client);
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

    /// Role descriptions shown to the backend, one per agent in declaration order.
    pub fn with_descriptions(mut self, descriptions: Vec<String>) -> Self {
        self.descriptions = descriptions;
        self.descriptions.resize(self.agents.len(), String::new());
        self
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    pub fn graph(&self) -> &TransitionGraph {
        &self.graph
    }

    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    /// Agents allowed to speak after `current`, in declaration order.
    /// Before the first turn every agent is eligible.
    pub fn eligible(&self, current: Option<&AgentId>) -> Vec<AgentId> {
        match current {
            None => self.agents.clone(),
            Some(current) => self
                .agents
                .iter()
                .filter(|agent| self.graph.allows(current, agent))
                .cloned()
                .collect(),
        }
    }

    /// Pick the speaker that follows `current`.
    ///
    /// `pick` is required by [`SelectionStrategy::Manual`] and ignored by the
    /// other strategies.
    pub async fn select_next(
        &self,
        current: Option<&AgentId>,
        history: &[ChatMessage],
        pick: Option<&AgentId>,
    ) -> Result<AgentId, ConfabError> {
        let eligible = self.eligible(current);
        if eligible.is_empty() {
            return Err(SelectionError::NoEligibleSpeaker {
                after: current.cloned(),
            }
            .into());
        }

        let next = match self.strategy {
            SelectionStrategy::RoundRobin => self.round_robin(current, &eligible),
            SelectionStrategy::Random => random(&eligible),
            SelectionStrategy::Manual => self.validate_pick(current, pick, &eligible)?,
            SelectionStrategy::Auto => self.auto(&eligible, history).await?,
        };
        tracing::debug!(strategy = %self.strategy, speaker = %next, "selected next speaker");
        Ok(next)
    }

    /// Check an explicit pick against the graph.
    pub fn validate_pick(
        &self,
        current: Option<&AgentId>,
        pick: Option<&AgentId>,
        eligible: &[AgentId],
    ) -> Result<AgentId, ConfabError> {
        let pick = pick.ok_or(SelectionError::ManualPickRequired)?;
        if eligible.contains(pick) {
            Ok(pick.clone())
        } else {
            Err(SelectionError::IneligiblePick {
                pick: pick.clone(),
                after: current.cloned(),
            }
            .into())
        }
    }

    fn round_robin(&self, current: Option<&AgentId>, eligible: &[AgentId]) -> AgentId {
        let start = current
            .and_then(|current| self.agents.iter().position(|agent| agent == current))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        let n = self.agents.len();
        (0..n)
            .map(|offset| &self.agents[(start + offset) % n])
            .find(|agent| eligible.contains(agent))
            .cloned()
            .unwrap_or_else(|| eligible[0].clone())
    }

    async fn auto(&self, eligible: &[AgentId], history: &[ChatMessage]) -> Result<AgentId, ConfabError> {
        if let [only] = eligible {
            return Ok(only.clone());
        }
        let client = self.client.as_ref().ok_or_else(|| {
            ConfabError::Configuration("auto speaker selection requires a completion client".into())
        })?;

        let mut messages = self.selection_prompt(eligible, history);
        let mut proposal = String::new();
        for attempt in 0..2 {
            let request = CompletionRequest::new(messages.clone()).with_settings(self.settings.clone());
            proposal = client.create(&request, self.seed).await?.text;
            if let Some(agent) = mentioned_agent(&proposal, eligible) {
                return Ok(agent);
            }
            tracing::warn!(attempt = attempt + 1, proposal = %proposal, "speaker proposal is not an eligible agent");
            messages.push(ModelMessage::assistant(proposal.clone()));
            messages.push(ModelMessage::user(format!(
                "You must answer with exactly one of {}. Only return the role.",
                list(eligible)
            )));
        }
        Err(SelectionError::InvalidProposal { proposal }.into())
    }

    fn selection_prompt(&self, eligible: &[AgentId], history: &[ChatMessage]) -> Vec<ModelMessage> {
        let roles = self
            .agents
            .iter()
            .zip(&self.descriptions)
            .filter(|(agent, _)| eligible.contains(agent))
            .map(|(agent, description)| format!("{agent}: {description}"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ModelMessage::system(format!(
            "You are in a role play game. The following roles are available:\n{roles}\n\n\
             Read the following conversation. Then select the next role from {} to play. \
             Only return the role.",
            list(eligible)
        )));
        messages.extend(
            history
                .iter()
                .map(|turn| ModelMessage::user(turn.content.clone()).with_name(turn.display_name())),
        );
        messages.push(ModelMessage::user(format!(
            "Read the above conversation. Then select the next role from {} to play. Only return the role.",
            list(eligible)
        )));
        messages
    }
}

fn random(eligible: &[AgentId]) -> AgentId {
    let mut rng = rand::thread_rng();
    eligible
        .choose(&mut rng)
        .cloned()
        .unwrap_or_else(|| eligible[0].clone())
}

/// The single eligible agent named in `text`, if exactly one is.
fn mentioned_agent(text: &str, eligible: &[AgentId]) -> Option<AgentId> {
    let mut mentioned = eligible.iter().filter(|agent| {
        let pattern = format!(r"(^|\W){}(\W|$)", regex::escape(agent.as_str()));
        regex::Regex::new(&pattern)
            .map(|re| re.is_match(text))
            .unwrap_or(false)
    });
    match (mentioned.next(), mentioned.next()) {
        (Some(agent), None) => Some(agent.clone()),
        _ => None,
    }
}

fn list(agents: &[AgentId]) -> String {
    let names: Vec<_> = agents.iter().map(AgentId::as_str).collect();
    format!("[{}]", names.join(", "))
}

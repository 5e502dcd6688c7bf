//! Name-based graph configuration.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::GraphError;

use super::{invert, validate, Node, SpeakerTransitions, ValidationResult};

/// Graph topology as written in configuration, keyed by agent name.
///
/// ```toml
/// [graph.disallowed]
/// critic = ["critic"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphConfig {
    /// Agent → agents that may speak next.
    Allowed(BTreeMap<String, Vec<String>>),
    /// Agent → agents that may not speak next; inverted before validation.
    Disallowed(BTreeMap<String, Vec<String>>),
}

impl GraphConfig {
    /// Normalize either form into raw transitions over `agents`.
    pub fn to_transitions(&self, agents: &[AgentId]) -> SpeakerTransitions {
        match self {
            Self::Allowed(map) => map
                .iter()
                .map(|(key, next)| {
                    let next = next.iter().map(|name| resolve(name, agents)).collect();
                    (AgentId::new(key.as_str()), next)
                })
                .collect(),
            Self::Disallowed(map) => {
                let disallowed: HashMap<AgentId, Vec<AgentId>> = map
                    .iter()
                    .map(|(key, next)| {
                        let next = next.iter().map(|name| AgentId::new(name.as_str())).collect();
                        (AgentId::new(key.as_str()), next)
                    })
                    .collect();
                invert(&disallowed, agents).to_transitions()
            }
        }
    }

    /// Normalize and validate in one step.
    pub fn build(
        &self,
        agents: &[AgentId],
        allow_repeat: Option<&[AgentId]>,
    ) -> Result<ValidationResult, GraphError> {
        validate(&self.to_transitions(agents), agents, allow_repeat)
    }
}

fn resolve(name: &str, agents: &[AgentId]) -> Node {
    match agents.iter().find(|agent| agent.as_str() == name) {
        Some(agent) => Node::Agent(agent.clone()),
        None => Node::Name(name.to_string()),
    }
}

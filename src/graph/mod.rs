//! Speaker-transition graphs: validation, normalization and inversion.
//!
//! A graph maps each agent to the ordered list of agents allowed to speak
//! immediately after it. Raw input ([`SpeakerTransitions`]) may reference
//! unresolved names; [`validate`] turns it into a [`TransitionGraph`] that only
//! mentions declared agents, or fails with a [`GraphError`].

pub mod config;

pub use config::GraphConfig;

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::agent::AgentId;
use crate::error::GraphError;

/// A successor entry as written in a raw graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    /// A resolved agent reference.
    Agent(AgentId),
    /// A bare identifier that did not resolve to any agent.
    Name(String),
}

impl From<AgentId> for Node {
    fn from(id: AgentId) -> Self {
        Self::Agent(id)
    }
}

impl From<&AgentId> for Node {
    fn from(id: &AgentId) -> Self {
        Self::Agent(id.clone())
    }
}

/// Unvalidated adjacency input.
pub type SpeakerTransitions = HashMap<AgentId, Vec<Node>>;

/// A validated, immutable speaker-transition graph.
///
/// Every declared agent has an entry; adjacency lists contain no duplicates
/// and only declared agents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransitionGraph {
    edges: HashMap<AgentId, Vec<AgentId>>,
}

impl TransitionGraph {
    pub fn new(edges: HashMap<AgentId, Vec<AgentId>>) -> Self {
        Self { edges }
    }

    /// Every agent may follow every agent, itself included.
    pub fn fully_connected(agents: &[AgentId]) -> Self {
        invert(&HashMap::new(), agents)
    }

    /// Agents allowed to speak right after `agent`.
    pub fn successors(&self, agent: &AgentId) -> &[AgentId] {
        self.edges.get(agent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn allows(&self, from: &AgentId, to: &AgentId) -> bool {
        self.successors(from).contains(to)
    }

    pub fn has_self_loops(&self) -> bool {
        self.edges.iter().any(|(agent, next)| next.contains(agent))
    }

    pub fn edges(&self) -> &HashMap<AgentId, Vec<AgentId>> {
        &self.edges
    }

    /// Raw form of this graph, e.g. to re-validate against another agent set.
    pub fn to_transitions(&self) -> SpeakerTransitions {
        self.edges
            .iter()
            .map(|(agent, next)| (agent.clone(), next.iter().map(Node::from).collect()))
            .collect()
    }
}

/// Non-fatal anomaly found while validating a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphWarning {
    /// Agent with no outgoing and no incoming edges.
    Isolated(AgentId),
    /// Graph agents differ from the declared agent set.
    AgentMismatch {
        missing: Vec<AgentId>,
        extra: Vec<AgentId>,
    },
    /// An adjacency list names the same agent more than once.
    Duplicate { agent: AgentId, successor: AgentId },
}

impl fmt::Display for GraphWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isolated(agent) => write!(
                f,
                "agent '{agent}' is isolated: it can neither speak next nor be followed"
            ),
            Self::AgentMismatch { missing, extra } => write!(
                f,
                "allowed_speaker_transitions do not match agents (missing: [{}], extra: [{}])",
                join(missing),
                join(extra)
            ),
            Self::Duplicate { agent, successor } => write!(
                f,
                "duplicate successor '{successor}' in transitions of '{agent}'"
            ),
        }
    }
}

fn join(ids: &[AgentId]) -> String {
    ids.iter().map(AgentId::as_str).collect::<Vec<_>>().join(", ")
}

/// Outcome of a successful [`validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub graph: TransitionGraph,
    pub warnings: Vec<GraphWarning>,
}

/// True iff some agent lists itself as a successor.
pub fn has_self_loops(transitions: &SpeakerTransitions) -> bool {
    transitions
        .iter()
        .any(|(agent, next)| next.iter().any(|node| matches!(node, Node::Agent(id) if id == agent)))
}

/// Validate `transitions` against the declared `agents`.
///
/// `allow_repeat` restricts which agents may have a self-loop; `None` leaves
/// self-loops unrestricted. Warnings are returned and logged, never raised.
pub fn validate(
    transitions: &SpeakerTransitions,
    agents: &[AgentId],
    allow_repeat: Option<&[AgentId]>,
) -> Result<ValidationResult, GraphError> {
    let mut declared = HashSet::with_capacity(agents.len());
    for agent in agents {
        if !declared.insert(agent) {
            return Err(GraphError::DuplicateAgent(agent.clone()));
        }
    }

    // Visit keys in declaration order first so error reporting is stable.
    let mut keys: Vec<&AgentId> = transitions.keys().collect();
    keys.sort_by_key(|key| (agents.iter().position(|a| a == *key).unwrap_or(usize::MAX), *key));

    for key in &keys {
        if !declared.contains(key) {
            return Err(GraphError::UnknownAgent(key.to_string()));
        }
        for node in &transitions[*key] {
            if let Node::Name(name) = node {
                return Err(GraphError::UnknownAgent(name.clone()));
            }
        }
    }

    if let Some(allowed) = allow_repeat {
        for key in &keys {
            let self_loop = transitions[*key]
                .iter()
                .any(|node| matches!(node, Node::Agent(id) if id == *key));
            if self_loop && !allowed.contains(*key) {
                return Err(GraphError::UnauthorizedSelfLoop((*key).clone()));
            }
        }
    }

    let mut warnings = Vec::new();
    let mut extra: Vec<AgentId> = Vec::new();
    let mut edges = HashMap::with_capacity(agents.len());

    for key in &keys {
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for node in &transitions[*key] {
            let Node::Agent(id) = node else { continue };
            if !seen.insert(id) {
                warnings.push(GraphWarning::Duplicate {
                    agent: (*key).clone(),
                    successor: id.clone(),
                });
                continue;
            }
            if declared.contains(id) {
                next.push(id.clone());
            } else if !extra.contains(id) {
                extra.push(id.clone());
            }
        }
        edges.insert((*key).clone(), next);
    }

    let missing: Vec<AgentId> = agents
        .iter()
        .filter(|agent| !transitions.contains_key(*agent))
        .cloned()
        .collect();
    if !missing.is_empty() || !extra.is_empty() {
        extra.sort();
        warnings.push(GraphWarning::AgentMismatch { missing, extra });
    }

    for agent in agents {
        let outgoing = edges.entry(agent.clone()).or_insert_with(Vec::new);
        if !outgoing.is_empty() {
            continue;
        }
        let incoming = transitions
            .values()
            .any(|next| next.iter().any(|node| matches!(node, Node::Agent(id) if id == agent)));
        if !incoming {
            warnings.push(GraphWarning::Isolated(agent.clone()));
        }
    }

    for warning in &warnings {
        tracing::warn!(%warning, "speaker transition graph");
    }

    Ok(ValidationResult {
        graph: TransitionGraph::new(edges),
        warnings,
    })
}

/// Turn a graph of disallowed transitions into the allowed graph.
///
/// Each agent may be followed by every agent (itself included) that is not
/// listed as disallowed for it. Entries naming agents outside `agents` are
/// ignored. Adjacency lists follow the order of `agents`.
pub fn invert(disallowed: &HashMap<AgentId, Vec<AgentId>>, agents: &[AgentId]) -> TransitionGraph {
    let edges = agents
        .iter()
        .map(|agent| {
            let blocked = disallowed.get(agent).map(Vec::as_slice).unwrap_or(&[]);
            let allowed = agents
                .iter()
                .filter(|candidate| !blocked.contains(candidate))
                .cloned()
                .collect();
            (agent.clone(), allowed)
        })
        .collect();
    TransitionGraph::new(edges)
}

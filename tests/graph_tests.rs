//! Speaker-transition graph validation and inversion.

mod common;

use std::collections::HashMap;

use pretty_assertions::assert_eq;

use common::ids;
use confab::agent::AgentId;
use confab::error::GraphError;
use confab::graph::{has_self_loops, invert, validate, GraphConfig, GraphWarning, Node, SpeakerTransitions};

fn a(name: &str) -> AgentId {
    AgentId::new(name)
}

fn transitions(entries: &[(&str, &[&str])]) -> SpeakerTransitions {
    entries
        .iter()
        .map(|(key, next)| (a(key), next.iter().map(|n| Node::Agent(a(n))).collect()))
        .collect()
}

fn edges(entries: &[(&str, &[&str])]) -> HashMap<AgentId, Vec<AgentId>> {
    entries.iter().map(|(key, next)| (a(key), ids(next))).collect()
}

#[test]
fn self_loop_detection() {
    let without = transitions(&[("A", &["B", "C"]), ("B", &["C"]), ("C", &["A"])]);
    assert!(!has_self_loops(&without));

    let with = transitions(&[("A", &["A", "B", "C"]), ("B", &["B", "C"]), ("C", &["A"])]);
    assert!(has_self_loops(&with));
}

#[test]
fn unknown_key_is_rejected() {
    let agents = ids(&["agent1", "agent2", "agent3"]);
    let graph = transitions(&[("unseen", &["stranger"])]);
    let err = validate(&graph, &agents, None).unwrap_err();
    assert_eq!(err, GraphError::UnknownAgent("unseen".into()));
}

#[test]
fn bare_identifier_successor_is_rejected() {
    let agents = ids(&["agent1", "agent2", "agent3"]);
    let graph: SpeakerTransitions = agents
        .iter()
        .map(|agent| (agent.clone(), vec![Node::Name("agent1".into())]))
        .collect();
    let err = validate(&graph, &agents, None).unwrap_err();
    assert_eq!(err, GraphError::UnknownAgent("agent1".into()));
}

#[test]
fn self_loop_outside_allow_list_is_rejected() {
    let agents = ids(&["a1", "a2", "a3", "a4"]);
    let graph: SpeakerTransitions = agents
        .iter()
        .map(|agent| (agent.clone(), vec![Node::Agent(agent.clone())]))
        .collect();
    let allowed = &agents[..2];
    let err = validate(&graph, &agents, Some(allowed)).unwrap_err();
    assert_eq!(err, GraphError::UnauthorizedSelfLoop(a("a3")));

    // Without an allow-list self-loops are unrestricted.
    assert!(validate(&graph, &agents, None).is_ok());
}

#[test]
fn isolated_agent_warns() {
    let agents = ids(&["A", "B", "C"]);
    let graph = transitions(&[("A", &["A", "B"]), ("B", &["A"])]);
    let result = validate(&graph, &agents, None).unwrap();
    assert!(result.warnings.contains(&GraphWarning::Isolated(a("C"))));
    assert!(result
        .warnings
        .iter()
        .any(|w| w.to_string().contains("isolated")));
    assert_eq!(result.graph.successors(&a("C")), &[] as &[AgentId]);
}

#[test]
fn successor_outside_agent_set_warns_mismatch() {
    let agents = ids(&["A", "B"]);
    let graph = transitions(&[("A", &["B", "Z"]), ("B", &["A"])]);
    let result = validate(&graph, &agents, None).unwrap();
    let mismatch = result
        .warnings
        .iter()
        .find(|w| matches!(w, GraphWarning::AgentMismatch { .. }))
        .expect("mismatch warning");
    assert!(mismatch
        .to_string()
        .contains("allowed_speaker_transitions do not match agents"));
    // The stray agent never reaches the normalized graph.
    assert_eq!(result.graph.successors(&a("A")), &ids(&["B"])[..]);
}

#[test]
fn duplicate_successor_warns_and_is_collapsed() {
    let agents = ids(&["A", "B"]);
    let graph = transitions(&[("A", &["B", "B"]), ("B", &["A"])]);
    let result = validate(&graph, &agents, None).unwrap();
    assert!(result.warnings.iter().any(|w| w.to_string().contains("duplicate")));
    assert_eq!(result.graph.successors(&a("A")), &ids(&["B"])[..]);
}

#[test]
fn duplicate_declared_agent_is_rejected() {
    let agents = ids(&["A", "B", "A"]);
    let err = validate(&HashMap::new(), &agents, None).unwrap_err();
    assert_eq!(err, GraphError::DuplicateAgent(a("A")));
}

#[test]
fn invert_complements_within_agent_set() {
    let agents = ids(&["A", "B", "C"]);
    let inverted = invert(&edges(&[("A", &["B"]), ("B", &["A", "C"]), ("C", &[])]), &agents);
    assert_eq!(
        inverted.edges(),
        &edges(&[("A", &["A", "C"]), ("B", &["B"]), ("C", &["A", "B", "C"])])
    );
}

#[test]
fn invert_empty_is_fully_connected() {
    let agents = ids(&["A", "B", "C"]);
    let inverted = invert(&HashMap::new(), &agents);
    assert_eq!(
        inverted.edges(),
        &edges(&[("A", &["A", "B", "C"]), ("B", &["A", "B", "C"]), ("C", &["A", "B", "C"])])
    );
}

#[test]
fn invert_everything_disallowed_is_empty() {
    let agents = ids(&["A", "B", "C"]);
    let all = &["A", "B", "C"][..];
    let inverted = invert(&edges(&[("A", all), ("B", all), ("C", all)]), &agents);
    assert_eq!(inverted.edges(), &edges(&[("A", &[]), ("B", &[]), ("C", &[])]));
}

#[test]
fn invert_ignores_unknown_agents() {
    let agents = ids(&["A", "B", "C"]);
    let inverted = invert(&edges(&[("A", &["unknown"])]), &agents);
    assert_eq!(inverted, invert(&HashMap::new(), &agents));
}

#[test]
fn allowed_and_disallowed_config_agree() {
    let agents = ids(&["A", "B", "C"]);
    let allowed: GraphConfig = toml::from_str(
        r#"
        [allowed]
        A = ["A", "C"]
        B = ["B"]
        C = ["A", "B", "C"]
        "#,
    )
    .unwrap();
    let disallowed: GraphConfig = toml::from_str(
        r#"
        [disallowed]
        A = ["B"]
        B = ["A", "C"]
        "#,
    )
    .unwrap();

    let left = allowed.build(&agents, None).unwrap();
    let right = disallowed.build(&agents, None).unwrap();
    assert_eq!(left.graph, right.graph);
}

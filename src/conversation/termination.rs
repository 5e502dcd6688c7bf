//! Termination conditions evaluated after every recorded turn.

use std::fmt;

use async_trait::async_trait;

use crate::types::ChatMessage;

/// Phrase that ends a conversation unless configured otherwise.
pub const DEFAULT_TERMINATION_PHRASE: &str = "TERMINATE";

/// Reply that always ends the conversation when typed by a human.
pub const HUMAN_EXIT: &str = "exit";

/// Why a conversation ended (or is about to).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// A termination condition matched the latest turn.
    Condition(String),
    /// The consecutive auto-reply counter reached its maximum.
    MaxConsecutiveAutoReply(u32),
    /// A human asked to stop.
    Human,
    /// The owner signalled termination from outside.
    External,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition(name) => write!(f, "termination condition matched: {name}"),
            Self::MaxConsecutiveAutoReply(max) => {
                write!(f, "reached {max} consecutive auto replies")
            }
            Self::Human => f.write_str("human requested exit"),
            Self::External => f.write_str("terminated externally"),
        }
    }
}

/// A predicate over the latest turn that ends the conversation when true.
#[async_trait]
pub trait TerminationCondition: Send + Sync {
    /// Short label for logs and [`TerminationReason::Condition`].
    fn describe(&self) -> String;

    async fn should_terminate(&self, message: &ChatMessage) -> bool;
}

/// Terminate when the content contains a phrase.
pub struct PhraseTermination {
    phrase: String,
}

impl PhraseTermination {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
        }
    }
}

impl Default for PhraseTermination {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINATION_PHRASE)
    }
}

#[async_trait]
impl TerminationCondition for PhraseTermination {
    fn describe(&self) -> String {
        format!("phrase '{}'", self.phrase)
    }

    async fn should_terminate(&self, message: &ChatMessage) -> bool {
        message.content.contains(&self.phrase)
    }
}

/// Terminate when a regex matches the content.
pub struct RegexTermination {
    regex: regex::Regex,
}

impl RegexTermination {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: regex::Regex::new(pattern)?,
        })
    }
}

#[async_trait]
impl TerminationCondition for RegexTermination {
    fn describe(&self) -> String {
        format!("pattern /{}/", self.regex.as_str())
    }

    async fn should_terminate(&self, message: &ChatMessage) -> bool {
        self.regex.is_match(&message.content)
    }
}

/// Terminate when a custom predicate returns true.
pub struct PredicateTermination<F: Fn(&ChatMessage) -> bool + Send + Sync> {
    label: String,
    predicate: F,
}

impl<F: Fn(&ChatMessage) -> bool + Send + Sync> PredicateTermination<F> {
    pub fn new(label: impl Into<String>, predicate: F) -> Self {
        Self {
            label: label.into(),
            predicate,
        }
    }
}

#[async_trait]
impl<F: Fn(&ChatMessage) -> bool + Send + Sync> TerminationCondition for PredicateTermination<F> {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn should_terminate(&self, message: &ChatMessage) -> bool {
        (self.predicate)(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use crate::types::TurnOrigin;

    fn turn(content: &str) -> ChatMessage {
        ChatMessage::new(AgentId::new("a"), content, TurnOrigin::Auto)
    }

    #[tokio::test]
    async fn phrase_matches_anywhere_in_content() {
        let cond = PhraseTermination::default();
        assert!(!cond.should_terminate(&turn("keep going")).await);
        assert!(cond.should_terminate(&turn("done. TERMINATE")).await);
        assert!(!cond.should_terminate(&turn("terminate")).await);
    }

    #[tokio::test]
    async fn regex_matches() {
        let cond = RegexTermination::new(r"(?i)^\s*goodbye").unwrap();
        assert!(!cond.should_terminate(&turn("hello")).await);
        assert!(cond.should_terminate(&turn("  Goodbye all")).await);
    }

    #[tokio::test]
    async fn predicate_sees_whole_turn() {
        let cond = PredicateTermination::new("empty", |m: &ChatMessage| m.content.trim().is_empty());
        assert!(cond.should_terminate(&turn("   ")).await);
        assert_eq!(cond.describe(), "empty");
    }
}

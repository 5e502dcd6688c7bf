//! The conversation controller.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::{Agent, AgentId};
use crate::error::{ConfabError, ConversationError, GraphError, SelectionError};
use crate::selector::SpeakerSelector;
use crate::types::{ChatMessage, TurnOrigin};

use super::termination::{TerminationCondition, TerminationReason, HUMAN_EXIT};
use super::{
    ConversationEvent, ConversationEventSink, ConversationId, ConversationState, HumanInput, HumanInputMode,
    StateEvent,
};

/// Result of one [`ConversationController::advance`].
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// A turn was recorded.
    Spoke(ChatMessage),
    /// The selected speaker had nothing to say; nothing was recorded.
    Silent(AgentId),
    /// The conversation ended instead of recording a turn.
    Terminated(TerminationReason),
}

/// Drives one conversation between a fixed set of agents.
pub struct ConversationController {
    id: ConversationId,
    participants: Vec<Arc<dyn Agent>>,
    selector: SpeakerSelector,
    termination: Vec<Box<dyn TerminationCondition>>,
    human: Option<Arc<dyn HumanInput>>,
    human_input_mode: HumanInputMode,
    max_consecutive_auto_reply: Option<u32>,
    event_sink: Option<ConversationEventSink>,
    cancel: CancellationToken,

    state: ConversationState,
    history: Vec<ChatMessage>,
    current_speaker: Option<AgentId>,
    consecutive_auto_replies: u32,
    pending_termination: Option<TerminationReason>,
    termination_reason: Option<TerminationReason>,
}

impl ConversationController {
    /// Every agent known to `selector` must be among `participants`, and
    /// vice versa.
    pub fn new(participants: Vec<Arc<dyn Agent>>, selector: SpeakerSelector) -> Result<Self, ConfabError> {
        for (idx, agent) in participants.iter().enumerate() {
            if participants[..idx].iter().any(|other| other.id() == agent.id()) {
                return Err(GraphError::DuplicateAgent(agent.id().clone()).into());
            }
            if !selector.agents().contains(agent.id()) {
                return Err(ConversationError::NotParticipant(agent.id().clone()).into());
            }
        }
        if let Some(missing) = selector
            .agents()
            .iter()
            .find(|id| !participants.iter().any(|agent| agent.id() == *id))
        {
            return Err(ConversationError::NotParticipant(missing.clone()).into());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            participants,
            selector,
            termination: Vec::new(),
            human: None,
            human_input_mode: HumanInputMode::Never,
            max_consecutive_auto_reply: None,
            event_sink: None,
            cancel: CancellationToken::new(),
            state: ConversationState::Init,
            history: Vec::new(),
            current_speaker: None,
            consecutive_auto_replies: 0,
            pending_termination: None,
            termination_reason: None,
        })
    }

    pub fn with_termination(mut self, condition: impl TerminationCondition + 'static) -> Self {
        self.termination.push(Box::new(condition));
        self
    }

    pub fn with_human_input(mut self, human: Arc<dyn HumanInput>, mode: HumanInputMode) -> Self {
        self.human = Some(human);
        self.human_input_mode = mode;
        self
    }

    pub fn with_max_consecutive_auto_reply(mut self, max: Option<u32>) -> Self {
        self.max_consecutive_auto_reply = max;
        self
    }

    pub fn with_event_sink(mut self, sink: ConversationEventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ConversationState::Terminated
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn current_speaker(&self) -> Option<&AgentId> {
        self.current_speaker.as_ref()
    }

    pub fn consecutive_auto_replies(&self) -> u32 {
        self.consecutive_auto_replies
    }

    /// Reason a human will be asked to confirm on the next turn.
    pub fn pending_termination(&self) -> Option<&TerminationReason> {
        self.pending_termination.as_ref()
    }

    pub fn termination_reason(&self) -> Option<&TerminationReason> {
        self.termination_reason.as_ref()
    }

    pub fn selector(&self) -> &SpeakerSelector {
        &self.selector
    }

    pub fn agent(&self, id: &AgentId) -> Option<&Arc<dyn Agent>> {
        self.participants.iter().find(|agent| agent.id() == id)
    }

    /// Token another task may cancel to terminate this conversation between turns.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record the opening turn.
    pub async fn initiate(&mut self, message: ChatMessage) -> Result<(), ConfabError> {
        self.check_cancelled();
        self.state.transition(StateEvent::Initiate)?;
        self.require_participant(&message.sender)?;
        self.consecutive_auto_replies = 0;
        self.record(message, StateEvent::Initiate).await
    }

    /// Record a turn supplied from outside, e.g. by a bridged counterpart.
    pub async fn receive(&mut self, message: ChatMessage) -> Result<(), ConfabError> {
        self.receive_with(message, false).await
    }

    /// Like [`receive`](Self::receive); `silent` is passed on to every
    /// notified participant.
    pub async fn receive_with(&mut self, message: ChatMessage, silent: bool) -> Result<(), ConfabError> {
        self.check_cancelled();
        self.state.transition(StateEvent::Inject)?;
        self.require_participant(&message.sender)?;
        self.consecutive_auto_replies = 0;
        self.pending_termination = None;
        self.record_with(message, StateEvent::Inject, silent).await
    }

    /// Let the selector pick the next speaker and record its reply.
    pub async fn advance(&mut self) -> Result<TurnOutcome, ConfabError> {
        self.turn(None).await
    }

    /// Record the next reply from `speaker`, which must be graph-eligible.
    pub async fn advance_as(&mut self, speaker: &AgentId) -> Result<TurnOutcome, ConfabError> {
        self.turn(Some(speaker)).await
    }

    /// Advance until the conversation ends, a speaker stays silent, or
    /// `max_turns` turns were attempted. Returns the number of recorded turns.
    pub async fn run(&mut self, max_turns: usize) -> Result<usize, ConfabError> {
        let mut recorded = 0;
        for _ in 0..max_turns {
            match self.advance().await? {
                TurnOutcome::Spoke(_) => recorded += 1,
                TurnOutcome::Silent(_) | TurnOutcome::Terminated(_) => break,
            }
            if self.is_terminated() {
                break;
            }
        }
        Ok(recorded)
    }

    /// End the conversation now. Idempotent.
    pub fn terminate(&mut self) {
        if !self.is_terminated() {
            self.finish(TerminationReason::External);
        }
    }

    /// Drop all history and return to `INIT`.
    pub fn reset(&mut self) {
        self.state = ConversationState::Init;
        self.history.clear();
        self.current_speaker = None;
        self.consecutive_auto_replies = 0;
        self.pending_termination = None;
        self.termination_reason = None;
        self.cancel = CancellationToken::new();
        tracing::debug!("conversation reset");
    }

    async fn turn(&mut self, pick: Option<&AgentId>) -> Result<TurnOutcome, ConfabError> {
        self.check_cancelled();
        self.state.transition(StateEvent::Turn)?;

        let previous = self.current_speaker.clone();
        let human_reply = self.confirm_termination(previous.as_ref()).await?;
        if self.is_terminated() {
            if let Some(reason) = self.termination_reason.clone() {
                return Ok(TurnOutcome::Terminated(reason));
            }
        }

        let speaker = match pick {
            Some(pick) => {
                let eligible = self.selector.eligible(previous.as_ref());
                if eligible.is_empty() {
                    return Err(SelectionError::NoEligibleSpeaker { after: previous }.into());
                }
                self.selector.validate_pick(previous.as_ref(), Some(pick), &eligible)?
            }
            None => {
                self.selector
                    .select_next(previous.as_ref(), &self.history, None)
                    .await?
            }
        };
        let agent = self.require_participant(&speaker)?.clone();

        if let Some(input) = human_reply {
            return self.record_human_turn(speaker, input).await;
        }
        if let Some(outcome) = self.consult_human(&speaker).await? {
            return Ok(outcome);
        }

        let Some(content) = agent.generate_reply(&self.history, previous.as_ref()).await? else {
            tracing::debug!(%speaker, "speaker produced no reply");
            return Ok(TurnOutcome::Silent(speaker));
        };
        let turn = ChatMessage::new(speaker, content, TurnOrigin::Auto);
        self.consecutive_auto_replies += 1;
        self.record(turn.clone(), StateEvent::Turn).await?;
        Ok(TurnOutcome::Spoke(turn))
    }

    /// Settle a pending termination before any speaker is picked.
    ///
    /// Empty input or `exit` ends the conversation. Anything else is returned
    /// as the next speaker's turn; the termination stays pending until that
    /// turn is recorded.
    async fn confirm_termination(&mut self, previous: Option<&AgentId>) -> Result<Option<String>, ConfabError> {
        let (Some(human), Some(reason)) = (self.human.clone(), self.pending_termination.clone()) else {
            return Ok(None);
        };
        let sender = previous.map(AgentId::as_str).unwrap_or("the last speaker");
        let prompt =
            format!("Please give feedback to {sender}. Press enter or type '{HUMAN_EXIT}' to stop the conversation: ");
        let input = human.get_human_input(&prompt).await?;
        let input = input.trim();

        if input.eq_ignore_ascii_case(HUMAN_EXIT) {
            self.finish(TerminationReason::Human);
            return Ok(None);
        }
        if input.is_empty() {
            self.finish(reason);
            return Ok(None);
        }
        Ok(Some(input.to_string()))
    }

    /// Ask the human before every turn in `ALWAYS` mode. `Some` means the turn is decided.
    async fn consult_human(&mut self, speaker: &AgentId) -> Result<Option<TurnOutcome>, ConfabError> {
        let Some(human) = self.human.clone() else {
            return Ok(None);
        };
        if self.human_input_mode != HumanInputMode::Always {
            return Ok(None);
        }

        let prompt = format!(
            "Provide feedback to {speaker}. Press enter to skip and use auto-reply, \
             or type '{HUMAN_EXIT}' to end the conversation: "
        );
        let input = human.get_human_input(&prompt).await?;
        let input = input.trim();

        if input.eq_ignore_ascii_case(HUMAN_EXIT) {
            self.finish(TerminationReason::Human);
            return Ok(Some(TurnOutcome::Terminated(TerminationReason::Human)));
        }
        if input.is_empty() {
            return Ok(None);
        }
        self.record_human_turn(speaker.clone(), input.to_string())
            .await
            .map(Some)
    }

    async fn record_human_turn(&mut self, speaker: AgentId, input: String) -> Result<TurnOutcome, ConfabError> {
        self.pending_termination = None;
        self.consecutive_auto_replies = 0;
        self.emit(ConversationEvent::HumanOverride {
            speaker: speaker.clone(),
        });
        let turn = ChatMessage::new(speaker, input, TurnOrigin::Human);
        self.record(turn.clone(), StateEvent::Turn).await?;
        Ok(TurnOutcome::Spoke(turn))
    }

    async fn record(&mut self, turn: ChatMessage, event: StateEvent) -> Result<(), ConfabError> {
        self.record_with(turn, event, false).await
    }

    async fn record_with(&mut self, turn: ChatMessage, event: StateEvent, silent: bool) -> Result<(), ConfabError> {
        self.state = self.state.transition(event)?;
        self.history.push(turn.clone());
        self.current_speaker = Some(turn.sender.clone());
        tracing::debug!(
            conversation = %self.id,
            speaker = %turn.sender,
            origin = %turn.origin,
            turn = self.history.len(),
            "turn recorded"
        );
        self.emit(ConversationEvent::TurnRecorded { turn: turn.clone() });

        if let Some(reason) = self.evaluate_termination(&turn).await {
            if self.human.is_some() && self.human_input_mode != HumanInputMode::Never {
                tracing::info!(conversation = %self.id, %reason, "termination pending human confirmation");
                self.pending_termination = Some(reason.clone());
                self.emit(ConversationEvent::TerminationPending { reason });
            } else {
                self.finish(reason);
            }
        }

        self.notify(&turn, silent).await;
        Ok(())
    }

    async fn evaluate_termination(&self, turn: &ChatMessage) -> Option<TerminationReason> {
        for condition in &self.termination {
            if condition.should_terminate(turn).await {
                return Some(TerminationReason::Condition(condition.describe()));
            }
        }
        if let Some(max) = self.max_consecutive_auto_reply {
            if self.consecutive_auto_replies >= max {
                return Some(TerminationReason::MaxConsecutiveAutoReply(max));
            }
        }
        self.cancel
            .is_cancelled()
            .then_some(TerminationReason::External)
    }

    /// Deliver `turn` to every participant except its sender.
    async fn notify(&self, turn: &ChatMessage, silent: bool) {
        let open = !self.is_terminated() && self.pending_termination.is_none();
        let eligible = self.selector.eligible(Some(&turn.sender));
        let deliveries = self
            .participants
            .iter()
            .filter(|agent| agent.id() != &turn.sender)
            .map(|agent| {
                let request_reply = open && eligible.contains(agent.id());
                async move { (agent, agent.receive(turn, request_reply, silent).await) }
            });
        for (agent, result) in join_all(deliveries).await {
            if let Err(error) = result {
                tracing::warn!(conversation = %self.id, agent = %agent.id(), %error, "participant failed to receive turn");
            }
        }
    }

    fn finish(&mut self, reason: TerminationReason) {
        self.state = ConversationState::Terminated;
        self.pending_termination = None;
        self.termination_reason = Some(reason.clone());
        tracing::info!(conversation = %self.id, %reason, turns = self.history.len(), "conversation terminated");
        self.emit(ConversationEvent::Terminated { reason });
    }

    fn check_cancelled(&mut self) {
        if self.cancel.is_cancelled() && !self.is_terminated() {
            self.finish(TerminationReason::External);
        }
    }

    fn require_participant(&self, id: &AgentId) -> Result<&Arc<dyn Agent>, ConfabError> {
        self.agent(id)
            .ok_or_else(|| ConversationError::NotParticipant(id.clone()).into())
    }

    fn emit(&self, event: ConversationEvent) {
        let Some(sink) = &self.event_sink else { return };
        (sink)(event);
    }
}

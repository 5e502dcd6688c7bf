//! Unified error classification and recovery.

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad topology or config; fails fast before any turn.
    Configuration,
    /// No speaker could be chosen for this turn.
    Selection,
    /// The conversation cannot accept the requested transition.
    Conversation,
    /// The completion backend failed; the conversation is still viable.
    Completion,
    Storage,
    Serialization,
    Bridge,
    Process,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    RetryTurn,
    FixConfiguration,
    DiscardConversation,
    CheckStorage,
    CheckProcess,
    Ignore,
}

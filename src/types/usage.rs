//! Token usage and cost accounting types.

use serde::{Deserialize, Serialize};

/// Token usage for a single completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Accumulate another usage into this one.
    pub fn merge(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Cost of a completion in the backend's currency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Cost {
    pub total_cost: f64,
}

impl Cost {
    pub fn new(total_cost: f64) -> Self {
        Self { total_cost }
    }
}

/// Aggregated usage per model, as reported by the usage tracker.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UsageSummary {
    pub total_cost: f64,
    pub completions: u64,
    pub by_model: std::collections::BTreeMap<String, Usage>,
}

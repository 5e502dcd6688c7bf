//! Generation settings and related enums.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Settings forwarded to the completion backend.
///
/// Part of the request fingerprint, so every field must serialize
/// deterministically.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationSettings {
    #[builder(into)]
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
}

impl GenerationSettings {
    /// Canonical form: stop sequences sorted and deduplicated, empty lists dropped.
    pub fn normalized(&self) -> Self {
        let mut settings = self.clone();
        if let Some(stops) = settings.stop_sequences.as_mut() {
            stops.sort();
            stops.dedup();
        }
        if settings.stop_sequences.as_ref().is_some_and(|s| s.is_empty()) {
            settings.stop_sequences = None;
        }
        settings
    }
}

/// Why generation finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}

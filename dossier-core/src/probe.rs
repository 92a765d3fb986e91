//! AI probe contracts
//!
//! Three provider traits cover everything the engine asks of the AI service:
//! per-field clarification, open-ended incident probing, and instance
//! summaries. Implementations live in dossier-probe.

use crate::{PackId, ProbeError, ProbeExchange, SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// PER-FIELD PROBING
// ============================================================================

/// What the field prober wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeMode {
    /// Ask the attached clarifying question
    Question,
    NextField,
    Complete,
    Error,
    /// No opinion; treated as `NextField`
    #[default]
    None,
}

/// A value the prober believes answers some other field of the pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSuggestion {
    pub field_key: String,
    pub value: String,
    /// 0.0 to 1.0
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProbeRequest {
    pub session_id: SessionId,
    pub pack_id: PackId,
    pub instance_number: u32,
    pub field_key: String,
    pub field_value: String,
    /// Answers collected so far for this instance, keyed by field
    pub incident_context: BTreeMap<String, String>,
    pub previous_probes_count: u32,
    pub max_ai_followups: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldProbeResponse {
    #[serde(default)]
    pub mode: ProbeMode,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<FieldSuggestion>,
}

impl FieldProbeResponse {
    pub fn question(text: impl Into<String>) -> Self {
        Self {
            mode: ProbeMode::Question,
            question: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn next_field() -> Self {
        Self {
            mode: ProbeMode::NextField,
            ..Self::default()
        }
    }

    pub fn complete() -> Self {
        Self {
            mode: ProbeMode::Complete,
            ..Self::default()
        }
    }

    pub fn error(code: impl Into<String>) -> Self {
        Self {
            mode: ProbeMode::Error,
            error_code: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_suggestion(
        mut self,
        field_key: impl Into<String>,
        value: impl Into<String>,
        confidence: f32,
    ) -> Self {
        self.suggestions.push(FieldSuggestion {
            field_key: field_key.into(),
            value: value.into(),
            confidence,
        });
        self
    }

    /// The clarifying question, if this response carries a usable one.
    pub fn clarifier(&self) -> Option<&str> {
        match self.mode {
            ProbeMode::Question => self
                .question
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty()),
            _ => None,
        }
    }
}

/// Per-field AI prober.
#[async_trait]
pub trait FieldProber: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Inspect the latest answer to a field and decide whether to clarify.
    async fn probe_field(&self, request: &FieldProbeRequest)
        -> Result<FieldProbeResponse, ProbeError>;
}

// ============================================================================
// INCIDENT PROBING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentProbeRequest {
    pub session_id: SessionId,
    pub pack_id: PackId,
    pub category_id: String,
    pub instance_number: u32,
    /// Number of AI turns already completed in this instance
    pub turn: u32,
    pub opener_answer: String,
    pub exchanges: Vec<ProbeExchange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentProbeResponse {
    /// Ask the candidate this question next
    Prompt { text: String },
    /// Enough has been collected for this incident
    Complete,
    Error { code: String },
    /// No prompt and no decision
    Empty,
}

/// Open-ended incident prober.
#[async_trait]
pub trait IncidentProber: Send + Sync {
    fn name(&self) -> &str;

    async fn next_prompt(&self, request: &IncidentProbeRequest)
        -> Result<IncidentProbeResponse, ProbeError>;
}

// ============================================================================
// SUMMARIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub session_id: SessionId,
    pub pack_id: PackId,
    pub base_question_id: String,
    pub instance_number: u32,
    pub answers: BTreeMap<String, String>,
    pub exchanges: Vec<ProbeExchange>,
}

/// Best-effort instance summary generation. Failures never block an interview.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize_instance(&self, request: &SummaryRequest) -> Result<String, ProbeError>;
}

// =============================================================================
// TESTS
// =============================================================================

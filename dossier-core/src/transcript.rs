//! Transcript entry types. The synchronizer that appends and merges them
//! lives in dossier-engine.

use crate::{EntityId, PackId, QuestionId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum EntryKind {
    Question,
    Answer,
    ProbeQuestion,
    ProbeAnswer,
    System,
}

/// Who spoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum Role {
    Investigator,
    Candidate,
    System,
}

impl EntryKind {
    /// Default speaker for the kind.
    pub fn default_role(&self) -> Role {
        match self {
            EntryKind::Question | EntryKind::ProbeQuestion => Role::Investigator,
            EntryKind::Answer | EntryKind::ProbeAnswer => Role::Candidate,
            EntryKind::System => Role::System,
        }
    }
}

/// Optional linkage carried by an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EntryMeta {
    pub question_id: Option<QuestionId>,
    pub pack_id: Option<PackId>,
    pub field_key: Option<String>,
    pub instance_number: Option<u32>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub parent_response_id: Option<EntityId>,
}

impl EntryMeta {
    pub fn question(question_id: impl Into<QuestionId>) -> Self {
        Self {
            question_id: Some(question_id.into()),
            ..Self::default()
        }
    }

    pub fn pack(
        question_id: impl Into<QuestionId>,
        pack_id: impl Into<PackId>,
        instance_number: u32,
    ) -> Self {
        Self {
            question_id: Some(question_id.into()),
            pack_id: Some(pack_id.into()),
            instance_number: Some(instance_number),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, field_key: impl Into<String>) -> Self {
        self.field_key = Some(field_key.into());
        self
    }

    pub fn with_parent(mut self, parent_response_id: Option<EntityId>) -> Self {
        self.parent_response_id = parent_response_id;
        self
    }
}

/// One logical utterance in the interview transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TranscriptEntry {
    /// Deterministic, unique per utterance
    pub stable_key: String,
    pub kind: EntryKind,
    pub text: String,
    pub role: Role,
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl TranscriptEntry {
    pub fn new(
        stable_key: impl Into<String>,
        kind: EntryKind,
        text: impl Into<String>,
        meta: EntryMeta,
    ) -> Self {
        Self {
            stable_key: stable_key.into(),
            kind,
            text: text.into(),
            role: kind.default_role(),
            meta,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

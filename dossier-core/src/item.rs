//! Interview items - the tagged union of everything that can be "current".

use crate::{FieldConfig, PackId, QuestionId};
use serde::{Deserialize, Serialize};

/// An AI clarifying question attached to a pack field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Clarifier {
    pub question: String,
    /// 1-based index of this clarifier within the field
    pub probe_index: u32,
}

/// The item the candidate is currently answering.
///
/// Exactly one item is current at a time. Static-chain packs may keep a queue
/// of pending `FollowupStep`s behind it; no other variant queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum InterviewItem {
    /// A base question from the question bank
    Question { id: QuestionId },

    /// One field of a per-field AI-probed pack
    PackField {
        pack_id: PackId,
        field_index: usize,
        field_key: String,
        field_config: FieldConfig,
        base_question_id: QuestionId,
        instance_number: u32,
        #[serde(default)]
        clarifier: Option<Clarifier>,
    },

    /// Deterministic opener of a fully-AI incident pack
    PackOpener {
        pack_id: PackId,
        category_id: String,
        opener_text: String,
        base_question_id: QuestionId,
        instance_number: u32,
        #[serde(default = "first_attempt")]
        attempt: u32,
    },

    /// Open-ended AI probing; `prompt` is `None` while waiting for the AI
    Probing {
        pack_id: PackId,
        category_id: String,
        base_question_id: QuestionId,
        instance_number: u32,
        turn: u32,
        #[serde(default)]
        prompt: Option<String>,
    },

    /// One deterministic step of a static-chain pack
    FollowupStep {
        pack_id: PackId,
        step_index: usize,
        #[serde(default)]
        substance_name: Option<String>,
        base_question_id: QuestionId,
        instance_number: u32,
    },

    /// "Another instance?" gate, legacy form keyed by question
    MultiInstance {
        question_id: QuestionId,
        pack_id: PackId,
        instance_number: u32,
    },

    /// "Another instance?" gate, canonical form
    MultiInstanceGate {
        pack_id: PackId,
        base_question_id: QuestionId,
        instance_number: u32,
    },
}

fn first_attempt() -> u32 {
    1
}

impl InterviewItem {
    pub fn question(id: impl Into<QuestionId>) -> Self {
        InterviewItem::Question { id: id.into() }
    }

    /// Short discriminator used in logs and audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            InterviewItem::Question { .. } => "question",
            InterviewItem::PackField { .. } => "pack_field",
            InterviewItem::PackOpener { .. } => "pack_opener",
            InterviewItem::Probing { .. } => "probing",
            InterviewItem::FollowupStep { .. } => "followup_step",
            InterviewItem::MultiInstance { .. } => "multi_instance",
            InterviewItem::MultiInstanceGate { .. } => "multi_instance_gate",
        }
    }

    /// Pack this item belongs to, if any.
    pub fn pack_id(&self) -> Option<&str> {
        match self {
            InterviewItem::Question { .. } => None,
            InterviewItem::PackField { pack_id, .. }
            | InterviewItem::PackOpener { pack_id, .. }
            | InterviewItem::Probing { pack_id, .. }
            | InterviewItem::FollowupStep { pack_id, .. }
            | InterviewItem::MultiInstance { pack_id, .. }
            | InterviewItem::MultiInstanceGate { pack_id, .. } => Some(pack_id),
        }
    }

    /// Pack instance number, if any.
    pub fn instance_number(&self) -> Option<u32> {
        match self {
            InterviewItem::Question { .. } => None,
            InterviewItem::PackField { instance_number, .. }
            | InterviewItem::PackOpener { instance_number, .. }
            | InterviewItem::Probing { instance_number, .. }
            | InterviewItem::FollowupStep { instance_number, .. }
            | InterviewItem::MultiInstance { instance_number, .. }
            | InterviewItem::MultiInstanceGate { instance_number, .. } => Some(*instance_number),
        }
    }

    /// Base question that triggered the pack (or the question itself).
    pub fn base_question_id(&self) -> &str {
        match self {
            InterviewItem::Question { id } => id,
            InterviewItem::MultiInstance { question_id, .. } => question_id,
            InterviewItem::PackField { base_question_id, .. }
            | InterviewItem::PackOpener { base_question_id, .. }
            | InterviewItem::Probing { base_question_id, .. }
            | InterviewItem::FollowupStep { base_question_id, .. }
            | InterviewItem::MultiInstanceGate { base_question_id, .. } => base_question_id,
        }
    }

    pub fn is_gate(&self) -> bool {
        matches!(
            self,
            InterviewItem::MultiInstance { .. } | InterviewItem::MultiInstanceGate { .. }
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

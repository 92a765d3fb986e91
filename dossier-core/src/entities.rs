//! Persisted entity structures

use crate::{
    new_entity_id, EntityId, InterviewItem, PackId, QuestionId, SemanticType, SessionId,
    SkipCondition, Timestamp, TranscriptEntry,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// SESSION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum SessionStatus {
    InProgress,
    Completed,
}

/// Interview session as persisted. The engine writes it after every accepted
/// submission but never assumes exclusive access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InterviewSession {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub current_item: Option<InterviewItem>,
    pub queue: Vec<InterviewItem>,
    pub transcript: Vec<TranscriptEntry>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub completed_at: Option<Timestamp>,
}

impl InterviewSession {
    pub fn new(session_id: SessionId, first_item: Option<InterviewItem>) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            status: if first_item.is_some() {
                SessionStatus::InProgress
            } else {
                SessionStatus::Completed
            },
            current_item: first_item,
            queue: Vec::new(),
            transcript: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Update payload for sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    /// `Some(None)` clears the current item
    pub current_item: Option<Option<InterviewItem>>,
    pub queue: Option<Vec<InterviewItem>>,
    pub transcript: Option<Vec<TranscriptEntry>>,
}

// ============================================================================
// RESPONSES
// ============================================================================

/// A base question answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub response_id: EntityId,
    pub session_id: SessionId,
    pub question_id: QuestionId,
    /// Canonical `Yes` / `No`
    pub answer: String,
    pub triggered_pack: Option<PackId>,
    pub created_at: Timestamp,
}

impl Response {
    pub fn new(
        session_id: SessionId,
        question_id: impl Into<QuestionId>,
        answer: impl Into<String>,
        triggered_pack: Option<PackId>,
    ) -> Self {
        Self {
            response_id: new_entity_id(),
            session_id,
            question_id: question_id.into(),
            answer: answer.into(),
            triggered_pack,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowupStatus {
    InProgress,
    Completed,
    Closed,
}

/// One AI question and the candidate's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeExchange {
    /// Field being clarified; `None` for open-ended incident turns
    pub field_key: Option<String>,
    pub index: u32,
    pub question: String,
    pub answer: Option<String>,
}

/// Answers collected for one pack instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowupResponse {
    pub followup_id: EntityId,
    pub session_id: SessionId,
    pub response_id: Option<EntityId>,
    pub pack_id: PackId,
    pub base_question_id: QuestionId,
    pub instance_number: u32,
    pub answers: BTreeMap<String, String>,
    pub probe_exchanges: Vec<ProbeExchange>,
    pub summary: Option<String>,
    pub status: FollowupStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl FollowupResponse {
    pub fn new(
        session_id: SessionId,
        response_id: Option<EntityId>,
        pack_id: impl Into<PackId>,
        base_question_id: impl Into<QuestionId>,
        instance_number: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            followup_id: new_entity_id(),
            session_id,
            response_id,
            pack_id: pack_id.into(),
            base_question_id: base_question_id.into(),
            instance_number,
            answers: BTreeMap::new(),
            probe_exchanges: Vec::new(),
            summary: None,
            status: FollowupStatus::InProgress,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Update payload for follow-up responses.
#[derive(Debug, Clone, Default)]
pub struct FollowupUpdate {
    pub answers: Option<BTreeMap<String, String>>,
    pub probe_exchanges: Option<Vec<ProbeExchange>>,
    pub summary: Option<String>,
    pub status: Option<FollowupStatus>,
}

// ============================================================================
// SCHEMA RECORDS
// ============================================================================

/// A pack field as stored, with whatever key naming the author used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackFieldRecord {
    pub field_key: String,
    pub label: String,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub semantic_type: Option<SemanticType>,
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub skip_unless: Option<SkipCondition>,
    #[serde(default)]
    pub ai_probe: bool,
    #[serde(default)]
    pub prefill: Option<String>,
}

/// Persisted pack schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackRecord {
    pub pack_id: PackId,
    /// Free-form behaviour string; see `BehaviorType::from_db_str`
    #[serde(default)]
    pub behavior: Option<String>,
    #[serde(default)]
    pub fields: Vec<PackFieldRecord>,
    #[serde(default)]
    pub max_ai_followups: Option<u32>,
    #[serde(default)]
    pub requires_completion: bool,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub opener_text: Option<String>,
    #[serde(default)]
    pub substance_name: Option<String>,
    #[serde(default = "active_default")]
    pub active: bool,
}

/// Base question bank entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question_id: QuestionId,
    pub text: String,
    pub order: i32,
    #[serde(default)]
    pub section_order: i32,
    #[serde(default)]
    pub followup_pack: Option<PackId>,
    /// Offer another incident after each completed instance
    #[serde(default)]
    pub repeatable: bool,
    #[serde(default = "active_default")]
    pub active: bool,
}

fn active_default() -> bool {
    true
}

impl QuestionRecord {
    pub fn new(question_id: impl Into<QuestionId>, text: impl Into<String>, order: i32) -> Self {
        Self {
            question_id: question_id.into(),
            text: text.into(),
            order,
            section_order: 0,
            followup_pack: None,
            repeatable: false,
            active: true,
        }
    }

    pub fn in_section(mut self, section_order: i32) -> Self {
        self.section_order = section_order;
        self
    }

    pub fn with_pack(mut self, pack_id: impl Into<PackId>) -> Self {
        self.followup_pack = Some(pack_id.into());
        self
    }

    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_without_questions_is_completed() {
        let session = InterviewSession::new(new_entity_id(), None);
        assert_eq!(session.status, SessionStatus::Completed);
        let session = InterviewSession::new(new_entity_id(), Some(InterviewItem::question("Q001")));
        assert_eq!(session.status, SessionStatus::InProgress);
    }

    #[test]
    fn test_pack_record_defaults_from_toml() {
        let record: PackRecord = toml::from_str(
            r#"
            pack_id = "PACK_X"
            [[fields]]
            field_key = "PACK_X_Incident-Date"
            label = "When?"
            "#,
        )
        .unwrap();
        assert!(record.active);
        assert!(record.behavior.is_none());
        assert_eq!(record.fields[0].required, None);
    }

    #[test]
    fn test_question_record_builders() {
        let q = QuestionRecord::new("Q010", "Have you ever been arrested for DUI?", 10)
            .in_section(2)
            .with_pack("PACK_DRIVING_DUI")
            .repeatable();
        assert_eq!(q.followup_pack.as_deref(), Some("PACK_DRIVING_DUI"));
        assert!(q.repeatable && q.active);
        assert_eq!(q.section_order, 2);
    }
}

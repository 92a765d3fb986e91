//! Audit event types

use chrono::Utc;
use dossier_core::{new_entity_id, EntityId, PackId, QuestionId, SessionId, Timestamp};
use serde::{Deserialize, Serialize};

/// Which watchdog stage fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogStage {
    First,
    Second,
}

/// Everything the audit trail records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterviewEventKind {
    SubmissionAccepted {
        item_kind: String,
        key: String,
    },
    DuplicateRejected {
        key: String,
    },
    ValidationRejected {
        item_kind: String,
        reason: String,
    },
    RouteDecided {
        question_id: QuestionId,
        pack_id: PackId,
        route: String,
    },
    /// A hard-forced route contradicted the pack's configured behaviour
    RouteOverride {
        pack_id: PackId,
        configured: String,
        forced: String,
    },
    /// Pack could not be used and was skipped
    ConfigurationAnomaly {
        pack_id: PackId,
        reason: String,
    },
    ProbeFailed {
        pack_id: PackId,
        field_key: Option<String>,
        error: String,
    },
    StallRecovered {
        pack_id: PackId,
        instance_number: u32,
        stage: WatchdogStage,
        action: String,
    },
    SummaryFailed {
        pack_id: PackId,
        instance_number: u32,
        reason: String,
    },
    InstanceClosed {
        pack_id: PackId,
        instance_number: u32,
    },
    SessionCompleted,
    Fatal {
        reason: String,
    },
}

impl InterviewEventKind {
    /// Stable name for filtering and log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubmissionAccepted { .. } => "submission_accepted",
            Self::DuplicateRejected { .. } => "duplicate_rejected",
            Self::ValidationRejected { .. } => "validation_rejected",
            Self::RouteDecided { .. } => "route_decided",
            Self::RouteOverride { .. } => "route_override",
            Self::ConfigurationAnomaly { .. } => "configuration_anomaly",
            Self::ProbeFailed { .. } => "probe_failed",
            Self::StallRecovered { .. } => "stall_recovered",
            Self::SummaryFailed { .. } => "summary_failed",
            Self::InstanceClosed { .. } => "instance_closed",
            Self::SessionCompleted => "session_completed",
            Self::Fatal { .. } => "fatal",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewEvent {
    pub event_id: EntityId,
    pub session_id: SessionId,
    pub occurred_at: Timestamp,
    #[serde(flatten)]
    pub kind: InterviewEventKind,
}

impl InterviewEvent {
    pub fn new(session_id: SessionId, kind: InterviewEventKind) -> Self {
        Self {
            event_id: new_entity_id(),
            session_id,
            occurred_at: Utc::now(),
            kind,
        }
    }
}

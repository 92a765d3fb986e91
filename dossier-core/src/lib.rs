//! DOSSIER Core - Interview Data Types
//!
//! Pure data structures shared by every other crate: interview items, pack
//! configuration, transcript entries, persisted entities, idempotency and
//! stable key derivation, configuration, the error taxonomy, and the AI
//! probe contracts. No state machine logic lives here.

pub mod config;
pub mod entities;
pub mod error;
pub mod instance;
pub mod item;
pub mod keys;
pub mod pack;
pub mod probe;
pub mod transcript;

pub use config::{EngineConfig, WatchdogConfig};
pub use entities::{
    FollowupResponse, FollowupStatus, FollowupUpdate, InterviewSession, PackFieldRecord,
    PackRecord, ProbeExchange, QuestionRecord, Response, SessionStatus, SessionUpdate,
};
pub use error::{
    ConfigurationError, DossierError, DossierResult, ProbeError, StallError, StorageError,
    ValidationError,
};
pub use instance::{InstanceStatus, PackInstance, Route};
pub use item::{Clarifier, InterviewItem};
pub use keys::{gate_item_id, stable_key, submission_key, EntrySlot};
pub use pack::{BehaviorType, FieldConfig, PackConfig, SemanticType, SkipCondition};
pub use probe::{
    FieldProbeRequest, FieldProbeResponse, FieldProber, FieldSuggestion, IncidentProbeRequest,
    IncidentProbeResponse, IncidentProber, ProbeMode, SummaryGenerator, SummaryRequest,
};
pub use transcript::{EntryKind, EntryMeta, Role, TranscriptEntry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Interview session identifier.
pub type SessionId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Base question identifier, e.g. `Q010`.
pub type QuestionId = String;

/// Follow-up pack identifier, e.g. `PACK_DRIVING_DUI`.
pub type PackId = String;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Entity type discriminator used in storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Session,
    Response,
    FollowupResponse,
    Pack,
    Question,
}

// ============================================================================
// YES / NO ANSWERS
// ============================================================================

/// A normalised binary answer. Base questions and multi-instance gates only
/// accept exactly these two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    /// Normalise free-form input. Accepts `yes`/`y`/`no`/`n` in any case,
    /// surrounding whitespace ignored; anything else is rejected.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => Ok(YesNo::Yes),
            "no" | "n" => Ok(YesNo::No),
            _ => Err(ValidationError::NotYesNo {
                value: value.to_string(),
            }),
        }
    }

    /// Canonical text stored in transcripts and responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            YesNo::Yes => "Yes",
            YesNo::No => "No",
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, YesNo::Yes)
    }
}

impl std::fmt::Display for YesNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! Error types for DOSSIER operations

use crate::EntityKind;
use thiserror::Error;
use uuid::Uuid;

/// Entity store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity:?} with id {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("Insert failed for {entity:?}: {reason}")]
    InsertFailed { entity: EntityKind, reason: String },

    #[error("Update failed for {entity:?} with id {id}: {reason}")]
    UpdateFailed {
        entity: EntityKind,
        id: String,
        reason: String,
    },

    #[error("Delete failed for {entity:?} with id {id}: {reason}")]
    DeleteFailed {
        entity: EntityKind,
        id: String,
        reason: String,
    },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// AI probe service errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("No {contract} provider configured")]
    ProviderNotConfigured { contract: String },

    #[error("Probe request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Probe request to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Invalid probe response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Probe service reported error {code}")]
    Service { code: String },

    #[error("Summary generation failed: {reason}")]
    SummaryFailed { reason: String },
}

/// Answer validation errors. Each one maps to a candidate-facing hint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Answer required for {field}")]
    EmptyAnswer { field: String },

    #[error("Expected Yes or No, got {value:?}")]
    NotYesNo { value: String },

    #[error("Invalid choice {value:?} for {field}")]
    InvalidChoice {
        field: String,
        value: String,
        options: Vec<String>,
    },

    #[error("Invalid date {value:?} for {field}")]
    InvalidDate { field: String, value: String },

    #[error("Invalid number {value:?} for {field}")]
    InvalidNumber { field: String, value: String },
}

impl ValidationError {
    /// Re-prompt text shown to the candidate. The submission is not advanced.
    pub fn hint(&self) -> String {
        match self {
            ValidationError::EmptyAnswer { .. } => {
                "Please provide an answer before continuing.".to_string()
            }
            ValidationError::NotYesNo { .. } => "Please answer Yes or No.".to_string(),
            ValidationError::InvalidChoice { options, .. } => {
                format!("Please choose one of: {}.", options.join(", "))
            }
            ValidationError::InvalidDate { .. } => {
                "Please enter a date such as MM/YYYY, MM/DD/YYYY or YYYY.".to_string()
            }
            ValidationError::InvalidNumber { .. } => "Please enter a number.".to_string(),
        }
    }
}

/// Pack / question configuration errors. Always handled fail-open.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Pack {pack_id} is not defined in the persisted schema or the static table")]
    UnknownPack { pack_id: String },

    #[error("Pack {pack_id} has no usable fields")]
    EmptyFieldList { pack_id: String },

    #[error("Pack {pack_id} has no category mapping")]
    MissingCategory { pack_id: String },

    #[error("Question {question_id} is not in the question bank")]
    UnknownQuestion { question_id: String },

    #[error("Question bank is empty")]
    EmptyQuestionBank,

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse {source_name}: {reason}")]
    Parse { source_name: String, reason: String },
}

/// Stalled transition errors detected by the watchdog.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StallError {
    #[error("No AI prompt arrived for {pack_id} instance {instance_number} after turn {turn}")]
    NoPrompt {
        pack_id: String,
        instance_number: u32,
        turn: u32,
    },
}

/// Master error type for all DOSSIER errors.
#[derive(Debug, Clone, Error)]
pub enum DossierError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Stall error: {0}")]
    Stall(#[from] StallError),

    #[error("Session {session_id} failed: {reason}")]
    Fatal { session_id: Uuid, reason: String },
}

/// Result type alias for DOSSIER operations.
pub type DossierResult<T> = Result<T, DossierError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            entity: EntityKind::Session,
            id: Uuid::nil().to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("Session"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_probe_error_display_timeout() {
        let err = ProbeError::Timeout {
            provider: "http".to_string(),
            timeout_ms: 1500,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("timed out"));
        assert!(msg.contains("1500"));
    }

    #[test]
    fn test_validation_hint_lists_choices() {
        let err = ValidationError::InvalidChoice {
            field: "outcome".to_string(),
            value: "maybe".to_string(),
            options: vec!["Convicted".to_string(), "Dismissed".to_string()],
        };
        assert_eq!(err.hint(), "Please choose one of: Convicted, Dismissed.");
    }

    #[test]
    fn test_validation_hint_yes_no() {
        let err = ValidationError::NotYesNo {
            value: "perhaps".to_string(),
        };
        assert_eq!(err.hint(), "Please answer Yes or No.");
    }

    #[test]
    fn test_configuration_error_display_empty_fields() {
        let err = ConfigurationError::EmptyFieldList {
            pack_id: "PACK_EMPTY".to_string(),
        };
        assert_eq!(format!("{}", err), "Pack PACK_EMPTY has no usable fields");
    }

    #[test]
    fn test_dossier_error_from_variants() {
        let storage = DossierError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, DossierError::Storage(_)));

        let probe = DossierError::from(ProbeError::Service {
            code: "RATE_LIMIT".to_string(),
        });
        assert!(matches!(probe, DossierError::Probe(_)));

        let validation = DossierError::from(ValidationError::EmptyAnswer {
            field: "date".to_string(),
        });
        assert!(matches!(validation, DossierError::Validation(_)));

        let config = DossierError::from(ConfigurationError::EmptyQuestionBank);
        assert!(matches!(config, DossierError::Configuration(_)));

        let stall = DossierError::from(StallError::NoPrompt {
            pack_id: "PACK_X".to_string(),
            instance_number: 1,
            turn: 0,
        });
        assert!(matches!(stall, DossierError::Stall(_)));
    }
}

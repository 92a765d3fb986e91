//! Follow-up pack configuration types

use crate::{PackId, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// BEHAVIOUR
// ============================================================================

/// How a pack is driven once a base question triggers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum BehaviorType {
    /// Deterministic steps, no AI involvement unless a field asks for it
    #[default]
    Standard,
    /// Each field may trigger a bounded AI clarifier
    PerFieldAi,
    /// Deterministic opener followed by open-ended AI probing
    FullAi,
    /// Full-AI incident probing that always offers another incident
    MultiIncident,
}

impl BehaviorType {
    /// Parse from the persisted string representation. Unknown values map to
    /// `None` so the resolver can fall back to the static table.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "standard" | "static" => Some(Self::Standard),
            "per_field_ai" | "ai_probing" => Some(Self::PerFieldAi),
            "full_ai" | "v3" => Some(Self::FullAi),
            "multi_incident" => Some(Self::MultiIncident),
            _ => None,
        }
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::PerFieldAi => "per_field_ai",
            Self::FullAi => "full_ai",
            Self::MultiIncident => "multi_incident",
        }
    }

    /// Full-AI incident variants.
    pub fn is_full_ai(&self) -> bool {
        matches!(self, Self::FullAi | Self::MultiIncident)
    }
}

// ============================================================================
// FIELDS
// ============================================================================

/// Expected shape of a field answer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum SemanticType {
    #[default]
    Text,
    Date,
    YesNo,
    Number,
    Choice { options: Vec<String> },
}

static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}/\d{4}|\d{1,2}/\d{1,2}/\d{4}|\d{4}|\d{4}-\d{2}(-\d{2})?)$")
        .expect("Invalid date regex")
});

impl SemanticType {
    /// Validate and normalise an answer for this type.
    pub fn validate(&self, field: &str, value: &str) -> Result<String, ValidationError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyAnswer {
                field: field.to_string(),
            });
        }
        match self {
            SemanticType::Text => Ok(trimmed.to_string()),
            SemanticType::Date => {
                if DATE_PATTERN.is_match(trimmed) {
                    Ok(trimmed.to_string())
                } else {
                    Err(ValidationError::InvalidDate {
                        field: field.to_string(),
                        value: value.to_string(),
                    })
                }
            }
            SemanticType::YesNo => crate::YesNo::parse(trimmed).map(|a| a.as_str().to_string()),
            SemanticType::Number => trimmed
                .replace(',', "")
                .parse::<f64>()
                .map(|_| trimmed.to_string())
                .map_err(|_| ValidationError::InvalidNumber {
                    field: field.to_string(),
                    value: value.to_string(),
                }),
            SemanticType::Choice { options } => options
                .iter()
                .find(|o| o.eq_ignore_ascii_case(trimmed))
                .cloned()
                .ok_or_else(|| ValidationError::InvalidChoice {
                    field: field.to_string(),
                    value: value.to_string(),
                    options: options.clone(),
                }),
        }
    }
}

/// Show a field only when an earlier answer matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SkipCondition {
    /// Key of the field whose answer is inspected
    pub field_key: String,
    /// Accepted answers (case-insensitive)
    pub equals: Vec<String>,
}

impl SkipCondition {
    /// True when the field should be shown given the collected answers.
    /// A missing answer never satisfies the condition.
    pub fn is_satisfied(&self, answers: &BTreeMap<String, String>) -> bool {
        answers
            .get(&self.field_key)
            .map(|answer| {
                self.equals
                    .iter()
                    .any(|expected| expected.trim().eq_ignore_ascii_case(answer.trim()))
            })
            .unwrap_or(false)
    }
}

/// One field (or static step) of a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FieldConfig {
    pub key: String,
    pub label: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub skip_unless: Option<SkipCondition>,
    #[serde(default)]
    pub semantic_type: SemanticType,
    #[serde(default)]
    pub order: i32,
    /// Legacy per-field probing marker used by the routing heuristic
    #[serde(default)]
    pub ai_probe: bool,
    /// Known value; the step is recorded without prompting
    #[serde(default)]
    pub prefill: Option<String>,
}

fn default_true() -> bool {
    true
}

impl FieldConfig {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            required: true,
            skip_unless: None,
            semantic_type: SemanticType::Text,
            order: 0,
            ai_probe: false,
            prefill: None,
        }
    }

    pub fn with_type(mut self, semantic_type: SemanticType) -> Self {
        self.semantic_type = semantic_type;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn skip_unless(mut self, field_key: impl Into<String>, equals: &[&str]) -> Self {
        self.skip_unless = Some(SkipCondition {
            field_key: field_key.into(),
            equals: equals.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn probed(mut self) -> Self {
        self.ai_probe = true;
        self
    }

    pub fn prefilled(mut self, value: impl Into<String>) -> Self {
        self.prefill = Some(value.into());
        self
    }

    /// Validate an answer. Optional fields accept an empty answer as-is.
    pub fn validate(&self, value: &str) -> Result<String, ValidationError> {
        if !self.required && value.trim().is_empty() {
            return Ok(String::new());
        }
        self.semantic_type.validate(&self.key, value)
    }

    /// Whether `skip_unless` (if any) allows the field to be shown.
    pub fn is_visible(&self, answers: &BTreeMap<String, String>) -> bool {
        self.skip_unless
            .as_ref()
            .map(|condition| condition.is_satisfied(answers))
            .unwrap_or(true)
    }
}

// ============================================================================
// PACK CONFIG
// ============================================================================

/// Fully resolved pack definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackConfig {
    pub pack_id: PackId,
    /// Ordered by `FieldConfig::order`
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub behavior_type: BehaviorType,
    #[serde(default)]
    pub max_ai_followups: u32,
    #[serde(default)]
    pub requires_completion: bool,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub opener_text: Option<String>,
    #[serde(default)]
    pub substance_name: Option<String>,
}

impl PackConfig {
    pub fn new(pack_id: impl Into<PackId>, behavior_type: BehaviorType) -> Self {
        Self {
            pack_id: pack_id.into(),
            fields: Vec::new(),
            behavior_type,
            max_ai_followups: 0,
            requires_completion: false,
            category_id: None,
            opener_text: None,
            substance_name: None,
        }
    }

    pub fn with_fields(mut self, fields: Vec<FieldConfig>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_max_ai_followups(mut self, max: u32) -> Self {
        self.max_ai_followups = max;
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_opener(mut self, text: impl Into<String>) -> Self {
        self.opener_text = Some(text.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Sort fields by their `order` attribute, keeping declaration order for ties.
    pub fn sort_fields(&mut self) {
        self.fields.sort_by_key(|f| f.order);
    }
}

/// Normalise a field key across legacy and current naming schemes.
///
/// Legacy schemas prefix keys with the pack id (`PACK_DRIVING_DUI_incident_date`)
/// and mix case and separators (`Incident-Date`). Both map to `incident_date`.
pub fn normalize_field_key(pack_id: &str, raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix(pack_id)
        .map(|rest| rest.trim_start_matches(|c: char| c == '_' || c == '-' || c == '.'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(trimmed);

    let mut out = String::with_capacity(without_prefix.len());
    let mut last_underscore = false;
    for ch in without_prefix.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore && !out.is_empty() {
            out.push('_');
            last_underscore = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

// =============================================================================
// TESTS
// =============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

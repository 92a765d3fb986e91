//! Engine configuration

use crate::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Durations are written as integer milliseconds in TOML / JSON.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Two-stage stall watchdog for the incident flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Wait after opener submission before the first recovery attempt
    #[serde(with = "duration_ms", rename = "first_window_ms")]
    pub first_window: Duration,
    /// Additional wait before the deterministic exit/gate routing
    #[serde(with = "duration_ms", rename = "second_window_ms")]
    pub second_window: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            first_window: Duration::from_secs(12),
            second_window: Duration::from_secs(20),
        }
    }
}

/// Engine-wide settings. Every field has a default; `from_env` and
/// `from_toml_str` override individual values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub watchdog: WatchdogConfig,
    /// How long `submit` waits for the first AI prompt before returning
    #[serde(with = "duration_ms", rename = "prompt_wait_ms")]
    pub prompt_wait: Duration,
    /// Delay before the committing flag is force-cleared after a fatal error
    #[serde(with = "duration_ms", rename = "fatal_reset_delay_ms")]
    pub fatal_reset_delay: Duration,
    /// Minimum suggestion confidence for auto-filling a field
    pub auto_skip_confidence: f32,
    /// Clarifier cap used when a pack does not set `max_ai_followups`
    pub default_max_ai_followups: u32,
    /// Hard cap on AI turns per incident instance
    pub max_incident_turns: u32,
    /// Packs that always take the full-AI route regardless of configuration
    pub forced_full_ai_packs: BTreeSet<PackId>,
    /// Pack id -> incident category, for packs without their own category
    pub category_map: BTreeMap<PackId, String>,
    pub default_opener_text: String,
    pub gate_prompt: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watchdog: WatchdogConfig::default(),
            prompt_wait: Duration::from_secs(8),
            fatal_reset_delay: Duration::from_millis(1500),
            auto_skip_confidence: 0.85,
            default_max_ai_followups: 3,
            max_incident_turns: 8,
            forced_full_ai_packs: BTreeSet::new(),
            category_map: BTreeMap::new(),
            default_opener_text:
                "In your own words, please describe what happened, including when and where."
                    .to_string(),
            gate_prompt: "Do you have another incident of this type to report?".to_string(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    ///
    /// Validates:
    /// - watchdog windows and prompt wait are positive
    /// - auto_skip_confidence in [0.0, 1.0]
    /// - max_incident_turns > 0
    /// - gate prompt and default opener are non-empty
    pub fn validate(&self) -> DossierResult<()> {
        let positive = [
            ("watchdog.first_window", self.watchdog.first_window),
            ("watchdog.second_window", self.watchdog.second_window),
            ("prompt_wait", self.prompt_wait),
            ("fatal_reset_delay", self.fatal_reset_delay),
        ];
        for (field, value) in positive {
            if value.is_zero() {
                return Err(invalid(field, format!("{:?}", value), "must be positive"));
            }
        }

        if !(0.0..=1.0).contains(&self.auto_skip_confidence) {
            return Err(invalid(
                "auto_skip_confidence",
                self.auto_skip_confidence.to_string(),
                "must be between 0.0 and 1.0",
            ));
        }

        if self.max_incident_turns == 0 {
            return Err(invalid(
                "max_incident_turns",
                "0".to_string(),
                "must be greater than 0",
            ));
        }

        if self.gate_prompt.trim().is_empty() {
            return Err(invalid("gate_prompt", String::new(), "must not be empty"));
        }

        if self.default_opener_text.trim().is_empty() {
            return Err(invalid(
                "default_opener_text",
                String::new(),
                "must not be empty",
            ));
        }

        Ok(())
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `DOSSIER_WATCHDOG_FIRST_MS`: first watchdog window (default: 12000)
    /// - `DOSSIER_WATCHDOG_SECOND_MS`: second watchdog window (default: 20000)
    /// - `DOSSIER_PROMPT_WAIT_MS`: first prompt wait inside submit (default: 8000)
    /// - `DOSSIER_FATAL_RESET_MS`: committing flag reset delay (default: 1500)
    /// - `DOSSIER_AUTO_SKIP_CONFIDENCE`: suggestion auto-fill threshold (default: 0.85)
    /// - `DOSSIER_MAX_INCIDENT_TURNS`: AI turn cap per incident (default: 8)
    /// - `DOSSIER_FORCED_FULL_AI_PACKS`: comma-separated pack ids (default: none)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let millis = |name: &str, fallback: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };

        Self {
            watchdog: WatchdogConfig {
                first_window: millis("DOSSIER_WATCHDOG_FIRST_MS", defaults.watchdog.first_window),
                second_window: millis(
                    "DOSSIER_WATCHDOG_SECOND_MS",
                    defaults.watchdog.second_window,
                ),
            },
            prompt_wait: millis("DOSSIER_PROMPT_WAIT_MS", defaults.prompt_wait),
            fatal_reset_delay: millis("DOSSIER_FATAL_RESET_MS", defaults.fatal_reset_delay),
            auto_skip_confidence: std::env::var("DOSSIER_AUTO_SKIP_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.auto_skip_confidence),
            max_incident_turns: std::env::var("DOSSIER_MAX_INCIDENT_TURNS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_incident_turns),
            forced_full_ai_packs: std::env::var("DOSSIER_FORCED_FULL_AI_PACKS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or(defaults.forced_full_ai_packs.clone()),
            ..defaults
        }
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> DossierResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigurationError::Parse {
            source_name: "engine config".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Category for a pack: its own, else the configured mapping.
    pub fn category_for(&self, pack: &PackConfig) -> Option<String> {
        pack.category_id
            .clone()
            .or_else(|| self.category_map.get(&pack.pack_id).cloned())
    }

    /// Clarifier cap for a pack, falling back to the engine default.
    pub fn max_ai_followups_for(&self, pack: &PackConfig) -> u32 {
        if pack.max_ai_followups > 0 {
            pack.max_ai_followups
        } else {
            self.default_max_ai_followups
        }
    }
}

fn invalid(field: &str, value: String, reason: &str) -> DossierError {
    DossierError::Configuration(ConfigurationError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = EngineConfig::default();
        config.watchdog.first_window = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("watchdog.first_window"));
    }

    #[test]
    fn test_validate_rejects_confidence_out_of_range() {
        let config = EngineConfig {
            auto_skip_confidence: 1.5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_gate_prompt() {
        let config = EngineConfig {
            gate_prompt: "  ".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
            prompt_wait_ms = 250
            forced_full_ai_packs = ["PACK_THEFT"]

            [watchdog]
            first_window_ms = 1000
            second_window_ms = 3000

            [category_map]
            PACK_THEFT = "theft"
            "#,
        )
        .unwrap();
        assert_eq!(config.prompt_wait, Duration::from_millis(250));
        assert_eq!(config.watchdog.second_window, Duration::from_secs(3));
        assert!(config.forced_full_ai_packs.contains("PACK_THEFT"));
        assert_eq!(config.category_map["PACK_THEFT"], "theft");
        assert_eq!(config.max_incident_turns, EngineConfig::default().max_incident_turns);
    }

    #[test]
    fn test_from_toml_reports_parse_errors() {
        let err = EngineConfig::from_toml_str("prompt_wait_ms = \"soon\"").unwrap_err();
        assert!(matches!(
            err,
            DossierError::Configuration(ConfigurationError::Parse { .. })
        ));
    }

    #[test]
    fn test_category_and_followup_fallbacks() {
        let mut config = EngineConfig::default();
        config
            .category_map
            .insert("PACK_THEFT".to_string(), "theft".to_string());
        let pack = PackConfig::new("PACK_THEFT", BehaviorType::FullAi);
        assert_eq!(config.category_for(&pack).as_deref(), Some("theft"));
        assert_eq!(config.max_ai_followups_for(&pack), 3);

        let own = pack.with_category("property").with_max_ai_followups(1);
        assert_eq!(config.category_for(&own).as_deref(), Some("property"));
        assert_eq!(config.max_ai_followups_for(&own), 1);
    }
}

//! Pack instances and follow-up routes

use crate::{EntityId, FieldSuggestion, PackConfig, PackId, ProbeExchange, QuestionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Follow-up variant chosen for a triggered pack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    FullAi { category_id: String },
    PerFieldAi,
    StaticChain,
    /// Nothing to ask; advance past the pack
    None,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::FullAi { .. } => "full_ai",
            Route::PerFieldAi => "per_field_ai",
            Route::StaticChain => "static_chain",
            Route::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    InProgress,
    Completed,
    Closed,
}

/// One incident being collected for a pack.
///
/// Identified by `(pack_id, instance_number)`; instance numbers start at 1
/// and only the multi-instance gate creates the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackInstance {
    pub pack_id: PackId,
    pub base_question_id: QuestionId,
    pub instance_number: u32,
    pub route: Route,
    pub pack: PackConfig,
    /// Collected answers keyed by field key
    pub answers: BTreeMap<String, String>,
    pub answered: BTreeSet<String>,
    /// Clarifiers asked per field
    pub probe_counts: BTreeMap<String, u32>,
    /// Prober suggestions for fields not yet reached
    pub suggestions: BTreeMap<String, FieldSuggestion>,
    pub exchanges: Vec<ProbeExchange>,
    /// Completed AI turns (incident flow)
    pub incident_turns: u32,
    pub opener_answer: Option<String>,
    pub status: InstanceStatus,
    pub followup_response_id: Option<EntityId>,
}

impl PackInstance {
    pub fn new(
        pack: PackConfig,
        base_question_id: impl Into<QuestionId>,
        instance_number: u32,
        route: Route,
    ) -> Self {
        Self {
            pack_id: pack.pack_id.clone(),
            base_question_id: base_question_id.into(),
            instance_number,
            route,
            pack,
            answers: BTreeMap::new(),
            answered: BTreeSet::new(),
            probe_counts: BTreeMap::new(),
            suggestions: BTreeMap::new(),
            exchanges: Vec::new(),
            incident_turns: 0,
            opener_answer: None,
            status: InstanceStatus::InProgress,
            followup_response_id: None,
        }
    }

    /// Fresh instance of the same pack and route, numbered one higher.
    pub fn next(&self) -> Self {
        Self::new(
            self.pack.clone(),
            self.base_question_id.clone(),
            self.instance_number + 1,
            self.route.clone(),
        )
    }

    pub fn record_answer(&mut self, field_key: impl Into<String>, value: impl Into<String>) {
        let key = field_key.into();
        self.suggestions.remove(&key);
        self.answered.insert(key.clone());
        self.answers.insert(key, value.into());
    }

    pub fn is_answered(&self, field_key: &str) -> bool {
        self.answered.contains(field_key)
    }

    pub fn probe_count(&self, field_key: &str) -> u32 {
        self.probe_counts.get(field_key).copied().unwrap_or(0)
    }

    /// Increment and return the clarifier count for a field.
    pub fn bump_probe_count(&mut self, field_key: &str) -> u32 {
        let count = self.probe_counts.entry(field_key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Raise a field's clarifier count to at least `probe_index`.
    pub fn observe_probe(&mut self, field_key: &str, probe_index: u32) {
        let count = self.probe_counts.entry(field_key.to_string()).or_insert(0);
        *count = (*count).max(probe_index);
    }

    /// Hold suggestions for fields that are still unanswered. A later,
    /// more confident suggestion replaces an earlier one.
    pub fn hold_suggestions(&mut self, suggestions: &[FieldSuggestion]) {
        for suggestion in suggestions {
            if self.is_answered(&suggestion.field_key) {
                continue;
            }
            let replace = self
                .suggestions
                .get(&suggestion.field_key)
                .map(|held| suggestion.confidence >= held.confidence)
                .unwrap_or(true);
            if replace {
                self.suggestions
                    .insert(suggestion.field_key.clone(), suggestion.clone());
            }
        }
    }

    /// Held suggestion for a field if it meets `threshold`.
    pub fn confident_suggestion(&self, field_key: &str, threshold: f32) -> Option<&FieldSuggestion> {
        self.suggestions
            .get(field_key)
            .filter(|s| s.confidence >= threshold && !s.value.trim().is_empty())
    }

    pub fn is_open(&self) -> bool {
        self.status == InstanceStatus::InProgress
    }

    pub fn close(&mut self) {
        self.status = InstanceStatus::Closed;
    }

    pub fn complete(&mut self) {
        self.status = InstanceStatus::Completed;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BehaviorType, FieldConfig};

    fn instance() -> PackInstance {
        let pack = PackConfig::new("PACK_EMPLOYMENT", BehaviorType::PerFieldAi).with_fields(vec![
            FieldConfig::new("employer", "Employer"),
            FieldConfig::new("date", "When?"),
        ]);
        PackInstance::new(pack, "Q030", 1, Route::PerFieldAi)
    }

    fn suggestion(key: &str, value: &str, confidence: f32) -> FieldSuggestion {
        FieldSuggestion {
            field_key: key.to_string(),
            value: value.to_string(),
            confidence,
        }
    }

    #[test]
    fn test_next_instance_resets_state() {
        let mut first = instance();
        first.record_answer("employer", "Acme");
        first.bump_probe_count("employer");
        first.close();

        let second = first.next();
        assert_eq!(second.instance_number, 2);
        assert_eq!(second.route, Route::PerFieldAi);
        assert!(second.answers.is_empty());
        assert_eq!(second.probe_count("employer"), 0);
        assert!(second.is_open());
    }

    #[test]
    fn test_hold_suggestions_skips_answered_and_keeps_best() {
        let mut inst = instance();
        inst.record_answer("employer", "Acme");
        inst.hold_suggestions(&[
            suggestion("employer", "Other", 0.99),
            suggestion("date", "2019", 0.5),
        ]);
        inst.hold_suggestions(&[suggestion("date", "03/2019", 0.9)]);
        inst.hold_suggestions(&[suggestion("date", "2018", 0.2)]);

        assert!(!inst.suggestions.contains_key("employer"));
        assert_eq!(inst.suggestions["date"].value, "03/2019");
        assert!(inst.confident_suggestion("date", 0.85).is_some());
        assert!(inst.confident_suggestion("date", 0.95).is_none());
    }

    #[test]
    fn test_record_answer_clears_suggestion() {
        let mut inst = instance();
        inst.hold_suggestions(&[suggestion("date", "2019", 0.9)]);
        inst.record_answer("date", "2019");
        assert!(inst.suggestions.is_empty());
        assert!(inst.is_answered("date"));
    }

    #[test]
    fn test_observe_probe_never_lowers_count() {
        let mut inst = instance();
        inst.observe_probe("employer", 2);
        inst.observe_probe("employer", 1);
        assert_eq!(inst.probe_count("employer"), 2);
        assert_eq!(inst.bump_probe_count("employer"), 3);
        assert_eq!(inst.probe_count("date"), 0);
    }

    #[test]
    fn test_route_names() {
        assert_eq!(
            Route::FullAi {
                category_id: "theft".to_string()
            }
            .as_str(),
            "full_ai"
        );
        assert_eq!(Route::StaticChain.as_str(), "static_chain");
    }
}

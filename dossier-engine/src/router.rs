//! Pack router
//!
//! Chooses the follow-up variant for a triggered pack. Precedence, first
//! match wins:
//!
//! 1. pack id in `forced_full_ai_packs`
//! 2. behaviour `full_ai` / `multi_incident`
//! 3. behaviour `per_field_ai`
//! 4. any field flagged `ai_probe`
//! 5. any fields at all: static chain
//! 6. nothing to ask
//!
//! A full-AI choice without a category degrades to the static chain when the
//! pack has fields, else to no follow-up.

use crate::resolver::ResolvedPack;
use dossier_core::{BehaviorType, ConfigurationError, EngineConfig, QuestionRecord, Route};

/// Something about the pack configuration worth flagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAnomaly {
    /// Forced full-AI contradicts the configured behaviour
    ForcedOverride { configured: BehaviorType },
    /// The pack could not be used as configured
    Config(ConfigurationError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub route: Route,
    pub anomalies: Vec<RouteAnomaly>,
}

impl RouteDecision {
    fn new(route: Route) -> Self {
        Self {
            route,
            anomalies: Vec::new(),
        }
    }

    fn flag(mut self, anomaly: RouteAnomaly) -> Self {
        self.anomalies.push(anomaly);
        self
    }
}

/// Decide the route for `resolved`, triggered by `question`.
pub fn route(resolved: &ResolvedPack, question: &QuestionRecord, config: &EngineConfig) -> RouteDecision {
    let pack = &resolved.config;
    let forced = config.forced_full_ai_packs.contains(&pack.pack_id);

    let decision = if forced || pack.behavior_type.is_full_ai() {
        let mut decision = full_ai(resolved, config);
        if forced && !pack.behavior_type.is_full_ai() {
            decision = decision.flag(RouteAnomaly::ForcedOverride {
                configured: pack.behavior_type,
            });
        }
        decision
    } else if pack.behavior_type == BehaviorType::PerFieldAi {
        with_fields(resolved, Route::PerFieldAi)
    } else if pack.fields.iter().any(|f| f.ai_probe) {
        RouteDecision::new(Route::PerFieldAi)
    } else {
        with_fields(resolved, Route::StaticChain)
    };

    tracing::debug!(
        question_id = %question.question_id,
        pack_id = %pack.pack_id,
        route = decision.route.as_str(),
        schema_source = resolved.schema_source.as_str(),
        "Route decided"
    );
    decision
}

fn full_ai(resolved: &ResolvedPack, config: &EngineConfig) -> RouteDecision {
    match config.category_for(&resolved.config) {
        Some(category_id) => RouteDecision::new(Route::FullAi { category_id }),
        None => {
            let missing = RouteAnomaly::Config(ConfigurationError::MissingCategory {
                pack_id: resolved.config.pack_id.clone(),
            });
            with_fields(resolved, Route::StaticChain).flag(missing)
        }
    }
}

/// `route` when the pack has fields, otherwise no follow-up.
fn with_fields(resolved: &ResolvedPack, route: Route) -> RouteDecision {
    match resolved.require_fields() {
        Ok(()) => RouteDecision::new(route),
        Err(e) => RouteDecision::new(Route::None).flag(RouteAnomaly::Config(e)),
    }
}

// =============================================================================
// TESTS
// =============================================================================

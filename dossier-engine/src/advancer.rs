//! Base answer advancer
//!
//! Walks the active question bank in `(section_order, order)` order. A base
//! answer is a strict Yes/No; "Yes" on a question that carries a follow-up
//! pack is handed to the resolver and router, everything else moves on to the
//! next base question.

use crate::engine::{Admission, InterviewEngine, SubmitOutcome};
use crate::router::{self, RouteAnomaly};
use crate::session::SessionState;
use dossier_core::keys::route_key;
use dossier_core::{
    submission_key, ConfigurationError, DossierError, DossierResult, InterviewItem, PackInstance,
    QuestionId, QuestionRecord, Response, Route, YesNo,
};
use dossier_events::InterviewEventKind;
use serde::Deserialize;

/// Where the interview goes after a base question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextQuestion {
    Question(QuestionId),
    Complete,
}

#[derive(Debug, Deserialize)]
struct QuestionBankFile {
    #[serde(default)]
    questions: Vec<QuestionRecord>,
}

/// Active base questions in interview order.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<QuestionRecord>,
}

impl QuestionBank {
    /// Keep active questions and order them. An empty bank is an error.
    pub fn new(questions: Vec<QuestionRecord>) -> Result<Self, ConfigurationError> {
        let mut questions: Vec<QuestionRecord> =
            questions.into_iter().filter(|q| q.active).collect();
        if questions.is_empty() {
            return Err(ConfigurationError::EmptyQuestionBank);
        }
        questions.sort_by(|a, b| {
            (a.section_order, a.order, &a.question_id).cmp(&(b.section_order, b.order, &b.question_id))
        });
        Ok(Self { questions })
    }

    /// Parse a `[[questions]]` TOML document.
    pub fn from_toml_str(source: &str) -> DossierResult<Self> {
        let file: QuestionBankFile = toml::from_str(source).map_err(|e| {
            DossierError::Configuration(ConfigurationError::Parse {
                source_name: "question bank".to_string(),
                reason: e.to_string(),
            })
        })?;
        Ok(Self::new(file.questions)?)
    }

    pub fn first(&self) -> Option<&QuestionRecord> {
        self.questions.first()
    }

    pub fn get(&self, question_id: &str) -> Option<&QuestionRecord> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }

    /// Question after `current_id`; `None` when `current_id` is not in the bank.
    pub fn next(&self, current_id: &str) -> Option<NextQuestion> {
        let position = self
            .questions
            .iter()
            .position(|q| q.question_id == current_id)?;
        Some(match self.questions.get(position + 1) {
            Some(q) => NextQuestion::Question(q.question_id.clone()),
            None => NextQuestion::Complete,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestionRecord> {
        self.questions.iter()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl InterviewEngine {
    /// Move past base question `question_id`, completing the session after
    /// the last one.
    pub(crate) fn advance_from(&self, state: &mut SessionState, question_id: &str) {
        state.instance = None;
        state.queue.clear();
        state.pending_probe = None;
        match self.inner.questions.next(question_id) {
            Some(NextQuestion::Question(next)) => {
                self.present(state, InterviewItem::question(next));
            }
            Some(NextQuestion::Complete) => self.complete_session(state),
            None => {
                tracing::warn!(
                    question_id = %question_id,
                    "Question not in the active bank, completing session"
                );
                self.complete_session(state);
            }
        }
    }

    fn complete_session(&self, state: &mut SessionState) {
        state.complete_session();
        tracing::info!(session_id = %state.session_id, "Interview completed");
        self.audit(InterviewEventKind::SessionCompleted);
    }

    pub(crate) async fn submit_base_answer(
        &self,
        item: &InterviewItem,
        question_id: &str,
        value: &str,
    ) -> DossierResult<SubmitOutcome> {
        let answer = match YesNo::parse(value) {
            Ok(answer) => answer,
            Err(e) => return Ok(self.rejected(item, e)),
        };
        let key = submission_key(item, answer.as_str());
        if let Admission::Refused(outcome) = self.admit(item, &key, Some(answer.as_str()), false)? {
            return Ok(outcome);
        }

        let question = self.inner.questions.get(question_id).cloned();
        let triggered = question
            .as_ref()
            .filter(|_| answer.is_yes())
            .and_then(|q| q.followup_pack.clone());

        let response = Response::new(
            self.inner.session_id,
            question_id,
            answer.as_str(),
            triggered.clone(),
        );
        self.inner.store.response_insert(&response).await?;
        self.with_state(|s| s.base_response_id = Some(response.response_id))?;

        match (question, triggered) {
            (Some(question), Some(pack_id)) => {
                if let Some(outcome) = self.enter_pack(&question, &pack_id, &key).await? {
                    self.with_state(|s| s.finish_commit())?;
                    return Ok(outcome);
                }
            }
            _ => self.with_state(|s| self.advance_from(s, question_id))?,
        }

        self.settle().await
    }

    /// Resolve and route `pack_id`. Returns an outcome only when the route
    /// lock shows this reroute already happened.
    async fn enter_pack(
        &self,
        question: &QuestionRecord,
        pack_id: &str,
        question_key: &str,
    ) -> DossierResult<Option<SubmitOutcome>> {
        let question_id = question.question_id.as_str();
        let resolved = match self.inner.resolver.resolve(pack_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(
                    question_id = %question_id,
                    pack_id = %pack_id,
                    error = %e,
                    "Pack unavailable, skipping follow-up"
                );
                self.audit(InterviewEventKind::ConfigurationAnomaly {
                    pack_id: pack_id.to_string(),
                    reason: e.to_string(),
                });
                self.with_state(|s| self.advance_from(s, question_id))?;
                return Ok(None);
            }
        };

        let decision = router::route(&resolved, question, &self.inner.config);
        for anomaly in &decision.anomalies {
            match anomaly {
                RouteAnomaly::ForcedOverride { configured } => {
                    tracing::warn!(
                        pack_id = %pack_id,
                        configured = configured.as_db_str(),
                        "Forced full-AI route contradicts pack configuration"
                    );
                    self.audit(InterviewEventKind::RouteOverride {
                        pack_id: pack_id.to_string(),
                        configured: configured.as_db_str().to_string(),
                        forced: decision.route.as_str().to_string(),
                    });
                }
                RouteAnomaly::Config(e) => {
                    tracing::warn!(pack_id = %pack_id, error = %e, "Pack configuration anomaly");
                    self.audit(InterviewEventKind::ConfigurationAnomaly {
                        pack_id: pack_id.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        self.audit(InterviewEventKind::RouteDecided {
            question_id: question_id.to_string(),
            pack_id: pack_id.to_string(),
            route: decision.route.as_str().to_string(),
        });

        if decision.route == Route::None {
            self.with_state(|s| self.advance_from(s, question_id))?;
            return Ok(None);
        }

        let lock = route_key(question_id, pack_id, decision.route.as_str());
        let swapped = self.with_state(|s| {
            s.ledger.swap(question_key, lock.clone())?;
            s.inflight_key = Some(lock);
            Ok::<(), crate::ledger::DuplicateSubmission>(())
        })?;
        if let Err(duplicate) = swapped {
            tracing::debug!(key = %duplicate.key, "Route already taken");
            self.audit(InterviewEventKind::DuplicateRejected {
                key: duplicate.key.clone(),
            });
            return Ok(Some(SubmitOutcome::Duplicate { key: duplicate.key }));
        }

        tracing::info!(
            question_id = %question_id,
            pack_id = %pack_id,
            route = decision.route.as_str(),
            "Entering follow-up pack"
        );
        let instance = PackInstance::new(resolved.config, question_id, 1, decision.route);
        self.start_instance(instance).await?;
        Ok(None)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> QuestionBank {
        QuestionBank::new(vec![
            QuestionRecord::new("Q020", "Second in section 1", 20).in_section(1),
            QuestionRecord::new("Q001", "First overall", 5),
            QuestionRecord::new("Q010", "Last in section 1", 30).in_section(1),
            QuestionRecord::new("Q015", "Inactive", 1).inactive(),
        ])
        .unwrap()
    }

    #[test]
    fn test_ordering_by_section_then_order() {
        let bank = bank();
        let ids: Vec<&str> = bank.iter().map(|q| q.question_id.as_str()).collect();
        assert_eq!(ids, vec!["Q001", "Q020", "Q010"]);
    }

    #[test]
    fn test_next_and_complete() {
        let bank = bank();
        assert_eq!(bank.next("Q001"), Some(NextQuestion::Question("Q020".to_string())));
        assert_eq!(bank.next("Q010"), Some(NextQuestion::Complete));
        assert_eq!(bank.next("Q015"), None);
        assert_eq!(bank.first().map(|q| q.question_id.as_str()), Some("Q001"));
    }

    #[test]
    fn test_empty_bank_is_error() {
        let err = QuestionBank::new(vec![QuestionRecord::new("Q1", "x", 1).inactive()]).unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyQuestionBank);
    }

    #[test]
    fn test_bank_from_toml() {
        let bank = QuestionBank::from_toml_str(
            r#"
            [[questions]]
            question_id = "Q010"
            text = "Have you ever been arrested for DUI?"
            order = 10
            followup_pack = "PACK_DRIVING_DUI"
            repeatable = true
            "#,
        )
        .unwrap();
        let q = bank.get("Q010").unwrap();
        assert!(q.repeatable);
        assert_eq!(q.followup_pack.as_deref(), Some("PACK_DRIVING_DUI"));
    }
}

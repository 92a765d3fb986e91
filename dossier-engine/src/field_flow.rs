//! Field flow controller
//!
//! Per-field AI probing. Each answer is validated after the ledger lock,
//! saved, then shown to the field prober, which may attach a clarifying
//! question to the same field (bounded per field by `max_ai_followups`),
//! suggest values for later fields, or let the flow move on.

use crate::engine::{Admission, InterviewEngine, SubmitOutcome};
use crate::session::{PendingProbe, SessionState};
use dossier_core::keys::retry_key;
use dossier_core::{
    submission_key, Clarifier, DossierResult, FieldProbeRequest, FieldProbeResponse, InterviewItem,
    PackInstance, ProbeError, ProbeExchange, ProbeMode, ValidationError,
};
use dossier_events::InterviewEventKind;

/// Result of walking forward through the pack's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldAdvance {
    /// Index of the next field to ask, `None` when the pack is done
    pub next: Option<usize>,
    /// Fields filled from confident suggestions on the way
    pub autofilled: Vec<(String, String)>,
}

/// Find the next field at or after `from` that needs the candidate.
///
/// Answered fields and fields hidden by `skip_unless` are passed over; a
/// field with a held suggestion at or above `threshold` is recorded with
/// that value and passed over too.
pub(crate) fn advance_fields(instance: &mut PackInstance, from: usize, threshold: f32) -> FieldAdvance {
    let mut autofilled = Vec::new();
    for index in from..instance.pack.fields.len() {
        let field = instance.pack.fields[index].clone();
        if instance.is_answered(&field.key) || !field.is_visible(&instance.answers) {
            continue;
        }
        let suggested = instance
            .confident_suggestion(&field.key, threshold)
            .map(|s| s.value.clone());
        if let Some(value) = suggested {
            instance.record_answer(field.key.clone(), value.clone());
            autofilled.push((field.key.clone(), value));
            continue;
        }
        return FieldAdvance {
            next: Some(index),
            autofilled,
        };
    }
    FieldAdvance {
        next: None,
        autofilled,
    }
}

/// `PackField` item for field `index` of the instance.
pub(crate) fn field_item(
    instance: &PackInstance,
    index: usize,
    clarifier: Option<Clarifier>,
) -> Option<InterviewItem> {
    let field = instance.pack.fields.get(index)?;
    Some(InterviewItem::PackField {
        pack_id: instance.pack_id.clone(),
        field_index: index,
        field_key: field.key.clone(),
        field_config: field.clone(),
        base_question_id: instance.base_question_id.clone(),
        instance_number: instance.instance_number,
        clarifier,
    })
}

/// Map a prober `ERROR` response onto a probe failure.
fn service_error(response: FieldProbeResponse) -> Result<FieldProbeResponse, ProbeError> {
    if response.mode == ProbeMode::Error {
        return Err(ProbeError::Service {
            code: response
                .error_code
                .unwrap_or_else(|| "UNKNOWN".to_string()),
        });
    }
    Ok(response)
}

impl InterviewEngine {
    /// Present the next field at or after `from`. Returns `false` when the
    /// pack has no field left to ask.
    pub(crate) fn present_next_field(&self, state: &mut SessionState, from: usize) -> bool {
        let threshold = self.inner.config.auto_skip_confidence;
        let Some(instance) = state.instance.as_mut() else {
            return false;
        };
        let advance = advance_fields(instance, from, threshold);
        let next = advance.next.and_then(|index| field_item(instance, index, None));
        let filled: Vec<(InterviewItem, String)> = advance
            .autofilled
            .iter()
            .filter_map(|(key, value)| {
                let index = instance.pack.fields.iter().position(|f| &f.key == key)?;
                let label = &instance.pack.fields[index].label;
                let note = format!("{}: {} (from earlier answers)", label, value);
                Some((field_item(instance, index, None)?, note))
            })
            .collect();

        for (item, note) in filled {
            let meta = state.meta_for(&item);
            state
                .transcript
                .append_system(state.session_id, &item, "autofill", &note, meta);
        }

        match next {
            Some(item) => {
                self.present(state, item);
                true
            }
            None => false,
        }
    }

    pub(crate) async fn submit_pack_field(
        &self,
        item: &InterviewItem,
        value: &str,
    ) -> DossierResult<SubmitOutcome> {
        let InterviewItem::PackField {
            field_key,
            field_config,
            clarifier,
            ..
        } = item
        else {
            return Ok(SubmitOutcome::Stale);
        };
        let key = submission_key(item, value.trim());
        if let Admission::Refused(outcome) = self.admit(item, &key, None, false)? {
            return Ok(outcome);
        }
        self.ensure_instance(item).await?;

        let validated = match clarifier {
            Some(_) if value.trim().is_empty() => Err(ValidationError::EmptyAnswer {
                field: field_key.clone(),
            }),
            Some(_) => Ok(value.trim().to_string()),
            None => field_config.validate(value),
        };
        let normalized = match validated {
            Ok(normalized) => normalized,
            Err(e) => {
                self.with_state(|s| s.withdraw_commit(&key))?;
                return Ok(self.rejected(item, e));
            }
        };

        let request = self.with_state(|s| {
            let display = if normalized.is_empty() {
                "(no answer)"
            } else {
                normalized.as_str()
            };
            s.inflight_entry = s.record_answer_entry(item, display);
            s.last_error = None;
            let instance = s.instance.as_mut()?;
            match clarifier {
                Some(c) => instance.exchanges.push(ProbeExchange {
                    field_key: Some(field_key.clone()),
                    index: c.probe_index,
                    question: c.question.clone(),
                    answer: Some(normalized.clone()),
                }),
                None => instance.record_answer(field_key.clone(), normalized.clone()),
            }

            let cap = self.inner.config.max_ai_followups_for(&instance.pack);
            let probes = instance.probe_count(field_key);
            if probes >= cap || !self.inner.probers.has_field() {
                return None;
            }
            Some(FieldProbeRequest {
                session_id: s.session_id,
                pack_id: instance.pack_id.clone(),
                instance_number: instance.instance_number,
                field_key: field_key.clone(),
                field_value: normalized.clone(),
                incident_context: instance.answers.clone(),
                previous_probes_count: probes,
                max_ai_followups: cap,
            })
        })?;
        self.save_instance().await?;

        match request {
            Some(request) => {
                self.with_state(|s| {
                    s.pending_probe = Some(PendingProbe {
                        item: item.clone(),
                        request: request.clone(),
                        attempts: 0,
                    })
                })?;
                self.consult_prober(item, request).await
            }
            None => self.advance_past(item).await,
        }
    }

    /// Replay the pending probe for `item` after a failure.
    pub(crate) async fn retry_probe(&self, item: &InterviewItem) -> DossierResult<SubmitOutcome> {
        let pending = self.with_state(|s| {
            s.pending_probe
                .clone()
                .filter(|p| &p.item == item)
        })?;
        let Some(pending) = pending else {
            return Ok(SubmitOutcome::Stale);
        };

        let attempt = pending.attempts + 1;
        let key = retry_key(
            &pending.request.pack_id,
            &pending.request.field_key,
            pending.request.instance_number,
            attempt,
        );
        if let Admission::Refused(outcome) = self.admit(item, &key, None, false)? {
            return Ok(outcome);
        }
        self.with_state(|s| {
            if let Some(p) = s.pending_probe.as_mut() {
                p.attempts = attempt;
            }
        })?;
        tracing::info!(
            pack_id = %pending.request.pack_id,
            field = %pending.request.field_key,
            attempt,
            "Retrying field probe"
        );
        self.consult_prober(item, pending.request).await
    }

    /// Ask the field prober about the latest answer and act on its verdict.
    async fn consult_prober(
        &self,
        item: &InterviewItem,
        request: FieldProbeRequest,
    ) -> DossierResult<SubmitOutcome> {
        let result = match self.inner.probers.field() {
            Ok(prober) => prober.probe_field(&request).await.and_then(service_error),
            Err(e) => Err(e),
        };

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    pack_id = %request.pack_id,
                    field = %request.field_key,
                    error = %error,
                    "Field probe failed, answer kept"
                );
                self.audit(InterviewEventKind::ProbeFailed {
                    pack_id: request.pack_id.clone(),
                    field_key: Some(request.field_key.clone()),
                    error: error.to_string(),
                });
                self.with_state(|s| s.last_error = Some(error.to_string()))?;
                self.settle().await?;
                return Ok(SubmitOutcome::ProbeFailed { error });
            }
        };

        let InterviewItem::PackField { field_index, .. } = item else {
            return Ok(SubmitOutcome::Stale);
        };
        let clarified = self.with_state(|s| {
            s.pending_probe = None;
            s.last_error = None;
            let instance = s.instance.as_mut()?;
            instance.hold_suggestions(&response.suggestions);
            let question = response.clarifier()?;
            let cap = self.inner.config.max_ai_followups_for(&instance.pack);
            if instance.probe_count(&request.field_key) >= cap {
                return None;
            }
            let probe_index = instance.bump_probe_count(&request.field_key);
            let clarifier = Clarifier {
                question: question.to_string(),
                probe_index,
            };
            let next = field_item(instance, *field_index, Some(clarifier))?;
            self.present(s, next);
            Some(probe_index)
        })?;

        match clarified {
            Some(probe_index) => {
                tracing::debug!(
                    pack_id = %request.pack_id,
                    field = %request.field_key,
                    probe_index,
                    "Clarifier requested"
                );
                self.settle().await
            }
            None => self.advance_past(item).await,
        }
    }

    /// Move to the field after `item`, completing the instance when none is left.
    async fn advance_past(&self, item: &InterviewItem) -> DossierResult<SubmitOutcome> {
        let InterviewItem::PackField { field_index, .. } = item else {
            return Ok(SubmitOutcome::Stale);
        };
        let more = self.with_state(|s| {
            s.pending_probe = None;
            self.present_next_field(s, field_index + 1)
        })?;
        self.save_instance().await?;
        if !more {
            self.complete_instance(None).await?;
        }
        self.settle().await
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::{BehaviorType, FieldConfig, FieldSuggestion, PackConfig, Route};

    fn instance() -> PackInstance {
        let pack = PackConfig::new("PACK_EMPLOYMENT", BehaviorType::PerFieldAi).with_fields(vec![
            FieldConfig::new("employer", "Employer?"),
            FieldConfig::new("date", "When?"),
            FieldConfig::new("reason", "Why did it end?"),
            FieldConfig::new("rehire", "Eligible for rehire?").skip_unless("reason", &["fired"]),
        ]);
        PackInstance::new(pack, "Q030", 1, Route::PerFieldAi)
    }

    #[test]
    fn test_advance_skips_answered_fields() {
        let mut instance = instance();
        instance.record_answer("employer", "Acme");
        let advance = advance_fields(&mut instance, 0, 0.85);
        assert_eq!(advance.next, Some(1));
        assert!(advance.autofilled.is_empty());
    }

    #[test]
    fn test_advance_autofills_confident_suggestions() {
        let mut instance = instance();
        instance.hold_suggestions(&[
            FieldSuggestion {
                field_key: "date".to_string(),
                value: "2019".to_string(),
                confidence: 0.9,
            },
            FieldSuggestion {
                field_key: "reason".to_string(),
                value: "laid off".to_string(),
                confidence: 0.5,
            },
        ]);
        let advance = advance_fields(&mut instance, 1, 0.85);
        assert_eq!(advance.next, Some(2));
        assert_eq!(advance.autofilled, vec![("date".to_string(), "2019".to_string())]);
        assert!(instance.is_answered("date"));
    }

    #[test]
    fn test_advance_honours_skip_unless() {
        let mut instance = instance();
        instance.record_answer("employer", "Acme");
        instance.record_answer("date", "2019");
        instance.record_answer("reason", "quit");
        let advance = advance_fields(&mut instance, 3, 0.85);
        assert_eq!(advance.next, None);
    }

    #[test]
    fn test_field_item_carries_clarifier() {
        let instance = instance();
        let item = field_item(
            &instance,
            1,
            Some(Clarifier {
                question: "Can you clarify the date?".to_string(),
                probe_index: 1,
            }),
        )
        .unwrap();
        match item {
            InterviewItem::PackField {
                field_index,
                field_key,
                clarifier,
                ..
            } => {
                assert_eq!(field_index, 1);
                assert_eq!(field_key, "date");
                assert_eq!(clarifier.map(|c| c.probe_index), Some(1));
            }
            other => panic!("unexpected item {:?}", other),
        }
        assert!(field_item(&instance, 9, None).is_none());
    }

    #[test]
    fn test_error_mode_is_probe_failure() {
        let err = service_error(FieldProbeResponse::error("RATE_LIMITED")).unwrap_err();
        assert_eq!(
            err,
            ProbeError::Service {
                code: "RATE_LIMITED".to_string()
            }
        );
        assert!(service_error(FieldProbeResponse::none()).is_ok());
    }
}

//! Static chain controller
//!
//! A pack without AI involvement becomes an ordered list of `FollowupStep`s:
//! the current one is shown, the rest wait in the queue. Steps are judged
//! when they are reached, so `skip_unless` sees every answer given so far.

use crate::engine::{Admission, InterviewEngine, SubmitOutcome};
use crate::session::SessionState;
use dossier_core::{
    submission_key, DossierResult, FieldConfig, InterviewItem, PackInstance,
};
use std::collections::{BTreeMap, VecDeque};

/// What to do with a step once it is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepDecision {
    Ask,
    /// Record the known value without prompting
    Prefill(String),
    Skip,
}

/// Every step of the instance's pack, in field order.
pub(crate) fn plan(instance: &PackInstance) -> VecDeque<InterviewItem> {
    (0..instance.pack.fields.len())
        .map(|step_index| InterviewItem::FollowupStep {
            pack_id: instance.pack_id.clone(),
            step_index,
            substance_name: instance.pack.substance_name.clone(),
            base_question_id: instance.base_question_id.clone(),
            instance_number: instance.instance_number,
        })
        .collect()
}

pub(crate) fn assess_step(field: &FieldConfig, answers: &BTreeMap<String, String>) -> StepDecision {
    if let Some(value) = field.prefill.as_ref().filter(|v| !v.trim().is_empty()) {
        return StepDecision::Prefill(value.clone());
    }
    if !field.is_visible(answers) {
        return StepDecision::Skip;
    }
    StepDecision::Ask
}

impl InterviewEngine {
    /// Pop queued steps until one needs the candidate and present it.
    /// Returns `false` once the queue is exhausted.
    pub(crate) fn next_chain_step(&self, state: &mut SessionState) -> bool {
        while let Some(step) = state.queue.pop_front() {
            let InterviewItem::FollowupStep { step_index, .. } = &step else {
                continue;
            };
            let Some(instance) = state.instance.as_mut() else {
                return false;
            };
            let Some(field) = instance.pack.fields.get(*step_index).cloned() else {
                continue;
            };

            match assess_step(&field, &instance.answers) {
                StepDecision::Ask => {
                    self.present(state, step);
                    return true;
                }
                StepDecision::Prefill(value) => {
                    instance.record_answer(field.key.clone(), value.clone());
                    let meta = state.meta_for(&step);
                    let note = format!("{}: {} (prefilled)", field.label, value);
                    state
                        .transcript
                        .append_system(state.session_id, &step, "prefill", &note, meta);
                }
                StepDecision::Skip => {
                    tracing::debug!(
                        pack_id = %instance.pack_id,
                        field = %field.key,
                        "Step skipped by condition"
                    );
                }
            }
        }
        false
    }

    pub(crate) async fn submit_followup_step(
        &self,
        item: &InterviewItem,
        step_index: usize,
        value: &str,
    ) -> DossierResult<SubmitOutcome> {
        let key = submission_key(item, value.trim());
        if let Admission::Refused(outcome) = self.admit(item, &key, None, false)? {
            return Ok(outcome);
        }
        self.ensure_instance(item).await?;

        let field = self.with_state(|s| {
            s.instance
                .as_ref()
                .and_then(|i| i.pack.fields.get(step_index).cloned())
        })?;
        let validated = match field {
            Some(field) => field.validate(value).map(|normalized| (field, normalized)),
            None => {
                self.with_state(|s| s.withdraw_commit(&key))?;
                return Ok(SubmitOutcome::Stale);
            }
        };
        let (field, normalized) = match validated {
            Ok(validated) => validated,
            Err(e) => {
                self.with_state(|s| s.withdraw_commit(&key))?;
                return Ok(self.rejected(item, e));
            }
        };

        self.with_state(|s| {
            let display = if normalized.is_empty() {
                "(no answer)"
            } else {
                normalized.as_str()
            };
            s.inflight_entry = s.record_answer_entry(item, display);
            if let Some(instance) = s.instance.as_mut() {
                instance.record_answer(field.key.clone(), normalized.clone());
            }
        })?;
        self.save_instance().await?;

        let more = self.with_state(|s| self.next_chain_step(s))?;
        if !more {
            self.save_instance().await?;
            self.complete_instance(None).await?;
        }
        self.settle().await
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! Incident flow controller
//!
//! Full-AI packs open with a deterministic opener. Once the candidate answers
//! it the flow flips to probing: the engine asks the incident prober for a
//! prompt in a detached task, shows it when it arrives and loops until the
//! prober is done, fails, or the turn cap is hit. Every way out goes through
//! `complete_instance`, which either gates or leaves an exit note.
//!
//! Prompt results carry the watchdog token they were requested under and are
//! dropped once a newer token exists.

use crate::engine::{outcome_of, Admission, InterviewEngine, SubmitOutcome};
use crate::session::SessionState;
use dossier_core::{
    submission_key, DossierResult, EntryMeta, IncidentProbeRequest, IncidentProbeResponse,
    InterviewItem, ProbeExchange, ValidationError,
};
use dossier_events::InterviewEventKind;
use tokio::task::JoinHandle;

/// Answer key the opener narrative is stored under in the instance answers.
pub(crate) const OPENER_ANSWER_KEY: &str = "opener";

/// What to do with a prompt result once it is back.
enum PromptVerdict {
    /// Token or item moved on; drop the result
    Stale,
    Shown,
    /// The flow was claimed for exit with this reason
    Exit(String),
}

/// Transcript note written when the interview leaves an incident pack.
pub(crate) fn exit_note(pack_id: &str, reason: &str) -> String {
    format!("AI follow-up for {} ended ({}).", pack_id, reason)
}

impl InterviewEngine {
    /// Show the opener of the active instance.
    pub(crate) fn present_opener(&self, state: &mut SessionState, category_id: &str, attempt: u32) {
        let Some(instance) = state.instance.as_ref() else {
            return;
        };
        let opener = InterviewItem::PackOpener {
            pack_id: instance.pack_id.clone(),
            category_id: category_id.to_string(),
            opener_text: instance
                .pack
                .opener_text
                .clone()
                .unwrap_or_else(|| self.inner.config.default_opener_text.clone()),
            base_question_id: instance.base_question_id.clone(),
            instance_number: instance.instance_number,
            attempt,
        };
        self.present(state, opener);
    }

    pub(crate) async fn submit_opener(
        &self,
        item: &InterviewItem,
        value: &str,
    ) -> DossierResult<SubmitOutcome> {
        let InterviewItem::PackOpener { category_id, .. } = item else {
            return Ok(SubmitOutcome::Stale);
        };
        let answer = value.trim();
        if answer.is_empty() {
            return Ok(self.rejected(
                item,
                ValidationError::EmptyAnswer {
                    field: OPENER_ANSWER_KEY.to_string(),
                },
            ));
        }
        let key = submission_key(item, answer);
        if let Admission::Refused(outcome) = self.admit(item, &key, Some(answer), false)? {
            return Ok(outcome);
        }
        self.ensure_instance(item).await?;

        let base_question_id = item.base_question_id().to_string();
        let base_text = self
            .inner
            .questions
            .get(&base_question_id)
            .map(|q| q.text.clone())
            .unwrap_or_else(|| base_question_id.clone());

        let token = self.with_state(|s| {
            let base = InterviewItem::question(base_question_id.clone());
            let sid = s.session_id;
            s.transcript.append_question(
                sid,
                &base,
                &base_text,
                EntryMeta::question(base_question_id.clone()),
            );
            s.transcript
                .append_answer(sid, &base, "Yes", EntryMeta::question(base_question_id.clone()));

            let instance = s.instance.as_mut()?;
            instance.opener_answer = Some(answer.to_string());
            instance.record_answer(OPENER_ANSWER_KEY, answer);
            let probing = InterviewItem::Probing {
                pack_id: instance.pack_id.clone(),
                category_id: category_id.clone(),
                base_question_id: instance.base_question_id.clone(),
                instance_number: instance.instance_number,
                turn: instance.incident_turns,
                prompt: None,
            };
            self.present(s, probing);
            Some(s.issue_token())
        })?;

        self.save_instance().await?;
        let Some(token) = token else {
            return self.settle().await;
        };
        self.settle().await?;
        self.await_prompt(token).await
    }

    pub(crate) async fn submit_probe_answer(
        &self,
        item: &InterviewItem,
        value: &str,
    ) -> DossierResult<SubmitOutcome> {
        let InterviewItem::Probing {
            turn,
            prompt,
            category_id,
            ..
        } = item
        else {
            return Ok(SubmitOutcome::Stale);
        };
        let Some(prompt) = prompt else {
            return Ok(SubmitOutcome::Busy);
        };
        let answer = value.trim();
        if answer.is_empty() {
            return Ok(self.rejected(
                item,
                ValidationError::EmptyAnswer {
                    field: format!("probe {}", turn + 1),
                },
            ));
        }
        let key = submission_key(item, answer);
        if let Admission::Refused(outcome) = self.admit(item, &key, Some(answer), false)? {
            return Ok(outcome);
        }
        self.ensure_instance(item).await?;

        let max_turns = self.inner.config.max_incident_turns;
        let next = self.with_state(|s| {
            let instance = s.instance.as_mut()?;
            instance.exchanges.push(ProbeExchange {
                field_key: None,
                index: turn + 1,
                question: prompt.clone(),
                answer: Some(answer.to_string()),
            });
            instance.incident_turns += 1;
            if instance.incident_turns >= max_turns {
                return Some(Err(instance.pack_id.clone()));
            }
            let probing = InterviewItem::Probing {
                pack_id: instance.pack_id.clone(),
                category_id: category_id.clone(),
                base_question_id: instance.base_question_id.clone(),
                instance_number: instance.instance_number,
                turn: instance.incident_turns,
                prompt: None,
            };
            self.present(s, probing);
            Some(Ok(s.issue_token()))
        })?;
        self.save_instance().await?;

        match next {
            Some(Ok(token)) => {
                self.settle().await?;
                self.await_prompt(token).await
            }
            Some(Err(pack_id)) => {
                tracing::info!(pack_id = %pack_id, turns = max_turns, "Incident turn limit reached");
                self.complete_instance(Some(&exit_note(&pack_id, "turn limit reached")))
                    .await?;
                self.settle().await
            }
            None => self.settle().await,
        }
    }

    /// Start the watchdog and the prompt request for `token`, waiting up to
    /// `prompt_wait` for the prompt before reporting where the session stands.
    async fn await_prompt(&self, token: u64) -> DossierResult<SubmitOutcome> {
        self.spawn_watchdog(token);
        let mut handle = self.spawn_prompt_request(token);
        if tokio::time::timeout(self.inner.config.prompt_wait, &mut handle)
            .await
            .is_err()
        {
            tracing::debug!(token, "Prompt still pending");
        }
        self.with_state(|s| outcome_of(s))
    }

    /// Detached prompt request. Failures inside the task are fatal for the
    /// session and routed through `on_fatal`.
    pub(crate) fn spawn_prompt_request(&self, token: u64) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.request_prompt(token).await {
                engine.on_fatal(&e);
            }
        })
    }

    async fn request_prompt(&self, token: u64) -> DossierResult<()> {
        let pending = self.with_state(|s| {
            if s.watchdog_token != token {
                return None;
            }
            let waiting = s.current_item.clone()?;
            let InterviewItem::Probing {
                prompt: None,
                category_id,
                ..
            } = &waiting
            else {
                return None;
            };
            let instance = s.instance.as_ref()?;
            let request = IncidentProbeRequest {
                session_id: s.session_id,
                pack_id: instance.pack_id.clone(),
                category_id: category_id.clone(),
                instance_number: instance.instance_number,
                turn: instance.incident_turns,
                opener_answer: instance.opener_answer.clone().unwrap_or_default(),
                exchanges: instance.exchanges.clone(),
            };
            Some((waiting, request))
        })?;
        let Some((waiting, request)) = pending else {
            return Ok(());
        };

        let result = match self.inner.probers.incident() {
            Ok(prober) => prober.next_prompt(&request).await,
            Err(e) => Err(e),
        };
        if let Err(error) = &result {
            tracing::warn!(
                pack_id = %request.pack_id,
                turn = request.turn,
                error = %error,
                "Incident probe failed"
            );
            self.audit(InterviewEventKind::ProbeFailed {
                pack_id: request.pack_id.clone(),
                field_key: None,
                error: error.to_string(),
            });
        }

        let verdict = self.with_state(|s| {
            if s.watchdog_token != token || !s.is_current(&waiting) || s.committing {
                return PromptVerdict::Stale;
            }
            let reason = match result {
                Ok(IncidentProbeResponse::Prompt { text }) if !text.trim().is_empty() => {
                    let mut prompted = waiting.clone();
                    if let InterviewItem::Probing { prompt, .. } = &mut prompted {
                        *prompt = Some(text.trim().to_string());
                    }
                    self.present(s, prompted);
                    return PromptVerdict::Shown;
                }
                Ok(IncidentProbeResponse::Prompt { .. }) | Ok(IncidentProbeResponse::Empty) => {
                    "no prompt returned".to_string()
                }
                Ok(IncidentProbeResponse::Complete) => "complete".to_string(),
                Ok(IncidentProbeResponse::Error { code }) => format!("probe error {}", code),
                Err(e) => e.to_string(),
            };
            s.issue_token();
            s.committing = true;
            PromptVerdict::Exit(reason)
        })?;

        match verdict {
            PromptVerdict::Stale => {
                tracing::debug!(token, pack_id = %request.pack_id, "Dropping stale prompt result");
                Ok(())
            }
            PromptVerdict::Shown => {
                tracing::debug!(pack_id = %request.pack_id, turn = request.turn, "Prompt shown");
                self.persist().await
            }
            PromptVerdict::Exit(reason) => self.exit_incident(&reason).await,
        }
    }

    /// Leave the active incident instance. The caller must already hold the
    /// session (`committing` set, fresh token issued).
    pub(crate) async fn exit_incident(&self, reason: &str) -> DossierResult<()> {
        let pack_id = self.with_state(|s| s.instance.as_ref().map(|i| i.pack_id.clone()))?;
        let Some(pack_id) = pack_id else {
            self.settle().await?;
            return Ok(());
        };
        tracing::info!(pack_id = %pack_id, reason = %reason, "Leaving incident follow-up");
        self.complete_instance(Some(&exit_note(&pack_id, reason))).await?;
        self.settle().await?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_note_names_pack_and_reason() {
        let note = exit_note("PACK_THEFT", "no AI response");
        assert_eq!(note, "AI follow-up for PACK_THEFT ended (no AI response).");
    }
}

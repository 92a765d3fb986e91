//! Engine-owned session state
//!
//! Everything the handlers read or write lives on `SessionState`. The engine
//! keeps it behind a mutex that is only held for short synchronous sections,
//! never across an await.

use crate::advancer::QuestionBank;
use crate::ledger::IdempotencyLedger;
use crate::transcript::Transcript;
use chrono::Utc;
use dossier_core::{
    stable_key, EntityId, EntryKind, EntryMeta, EntrySlot, FieldProbeRequest, InterviewItem,
    InterviewSession, PackInstance, SessionId, SessionStatus, SessionUpdate, TranscriptEntry,
};
use serde::Serialize;
use std::collections::VecDeque;

/// A failed field probe that can be replayed with `SubmitInput::Retry`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingProbe {
    pub item: InterviewItem,
    pub request: FieldProbeRequest,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub current_item: Option<InterviewItem>,
    pub queue: VecDeque<InterviewItem>,
    pub transcript: Transcript,
    pub ledger: IdempotencyLedger,
    pub instance: Option<PackInstance>,
    /// Base answer that triggered the active pack
    pub base_response_id: Option<EntityId>,
    /// Latest issued watchdog token
    pub watchdog_token: u64,
    /// Attempt number of the last opener shown
    pub opener_attempt: u32,
    pub committing: bool,
    /// Ledger key of the submission being committed
    pub inflight_key: Option<String>,
    /// Transcript entry the submission being committed wrote optimistically
    pub inflight_entry: Option<String>,
    pub last_error: Option<String>,
    pub pending_probe: Option<PendingProbe>,
}

impl SessionState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            status: SessionStatus::InProgress,
            current_item: None,
            queue: VecDeque::new(),
            transcript: Transcript::new(),
            ledger: IdempotencyLedger::new(),
            instance: None,
            base_response_id: None,
            watchdog_token: 0,
            opener_attempt: 0,
            committing: false,
            inflight_key: None,
            inflight_entry: None,
            last_error: None,
            pending_probe: None,
        }
    }

    /// Rebuild from a persisted session. The ledger starts empty; the stale
    /// check and the gate safety net cover resubmissions after a restart.
    pub fn from_persisted(session: InterviewSession) -> Self {
        let opener_attempt = match &session.current_item {
            Some(InterviewItem::PackOpener { attempt, .. }) => *attempt,
            _ => 0,
        };
        Self {
            status: session.status,
            current_item: session.current_item,
            queue: session.queue.into_iter().collect(),
            transcript: Transcript::from_entries(session.transcript),
            opener_attempt,
            ..Self::new(session.session_id)
        }
    }

    pub fn is_current(&self, item: &InterviewItem) -> bool {
        self.current_item.as_ref() == Some(item)
    }

    /// Issue a fresh watchdog token, invalidating every earlier one.
    pub fn issue_token(&mut self) -> u64 {
        self.watchdog_token += 1;
        self.watchdog_token
    }

    /// Make `item` current and record its question in the transcript.
    pub fn present(&mut self, item: InterviewItem, questions: &QuestionBank, gate_prompt: &str) {
        let meta = self.meta_for(&item);
        let sid = self.session_id;
        match &item {
            InterviewItem::Question { id } => {
                let text = questions
                    .get(id)
                    .map(|q| q.text.clone())
                    .unwrap_or_else(|| id.clone());
                self.transcript.append_question(sid, &item, &text, meta);
            }
            InterviewItem::PackField {
                field_config,
                clarifier,
                ..
            } => match clarifier {
                Some(c) => {
                    self.transcript
                        .append_probe_question(sid, &item, c.probe_index, &c.question, meta);
                }
                None => {
                    self.transcript
                        .append_question(sid, &item, &field_config.label, meta);
                }
            },
            InterviewItem::PackOpener {
                opener_text,
                attempt,
                ..
            } => {
                self.opener_attempt = *attempt;
                self.transcript.append_question(sid, &item, opener_text, meta);
            }
            InterviewItem::Probing { turn, prompt, .. } => {
                if let Some(prompt) = prompt {
                    self.transcript
                        .append_probe_question(sid, &item, turn + 1, prompt, meta);
                }
            }
            InterviewItem::FollowupStep { step_index, .. } => {
                let text = self
                    .step_label(*step_index)
                    .unwrap_or_else(|| format!("Step {}", step_index + 1));
                self.transcript.append_question(sid, &item, &text, meta);
            }
            InterviewItem::MultiInstance { .. } | InterviewItem::MultiInstanceGate { .. } => {
                self.transcript.append_question(sid, &item, gate_prompt, meta);
            }
        }
        self.current_item = Some(item);
    }

    /// Record the candidate's answer to `item` in the right transcript slot.
    /// Returns the entry's stable key when it was added.
    pub fn record_answer_entry(&mut self, item: &InterviewItem, text: &str) -> Option<String> {
        let (slot, kind) = match item {
            InterviewItem::PackField {
                clarifier: Some(c),
                ..
            } => (EntrySlot::ProbeAnswer(c.probe_index), EntryKind::ProbeAnswer),
            InterviewItem::Probing { turn, .. } => (EntrySlot::ProbeAnswer(turn + 1), EntryKind::ProbeAnswer),
            _ => (EntrySlot::Answer, EntryKind::Answer),
        };
        let key = stable_key(self.session_id, item, slot);
        let meta = self.meta_for(item);
        self.transcript
            .append(TranscriptEntry::new(key.clone(), kind, text, meta))
            .then_some(key)
    }

    /// Mark `key` as the submission being committed.
    pub fn begin_commit(&mut self, key: &str, entry: Option<String>) {
        self.committing = true;
        self.inflight_key = Some(key.to_string());
        self.inflight_entry = entry;
    }

    /// The submission being committed is done, accepted or not.
    pub fn finish_commit(&mut self) {
        self.committing = false;
        self.inflight_key = None;
        self.inflight_entry = None;
    }

    /// Drop a submission that was admitted but turned out invalid.
    pub fn withdraw_commit(&mut self, key: &str) {
        self.ledger.release(key);
        self.finish_commit();
    }

    /// Undo the bookkeeping of a submission that failed part way: free its
    /// ledger key and withdraw its optimistic answer. `committing` stays set.
    pub fn abort_commit(&mut self) {
        if let Some(key) = self.inflight_key.take() {
            self.ledger.release(&key);
        }
        if let Some(entry) = self.inflight_entry.take() {
            self.transcript.retract(&entry);
        }
    }

    /// Whether the transcript already holds an answer for `item`.
    pub fn has_answer_entry(&self, item: &InterviewItem) -> bool {
        self.transcript
            .contains_key(&stable_key(self.session_id, item, EntrySlot::Answer))
    }

    /// Transcript linkage for entries about `item`.
    pub fn meta_for(&self, item: &InterviewItem) -> EntryMeta {
        match item {
            InterviewItem::Question { id } => EntryMeta::question(id.clone()),
            _ => {
                let meta = EntryMeta::pack(
                    item.base_question_id(),
                    item.pack_id().unwrap_or_default(),
                    item.instance_number().unwrap_or(0),
                )
                .with_parent(self.base_response_id);
                match item {
                    InterviewItem::PackField { field_key, .. } => meta.with_field(field_key.clone()),
                    InterviewItem::FollowupStep { step_index, .. } => {
                        match self.step_field_key(*step_index) {
                            Some(key) => meta.with_field(key),
                            None => meta,
                        }
                    }
                    _ => meta,
                }
            }
        }
    }

    fn step_label(&self, step_index: usize) -> Option<String> {
        let instance = self.instance.as_ref()?;
        let field = instance.pack.fields.get(step_index)?;
        Some(match &instance.pack.substance_name {
            Some(substance) => field.label.replace("{substance}", substance),
            None => field.label.clone(),
        })
    }

    fn step_field_key(&self, step_index: usize) -> Option<String> {
        self.instance
            .as_ref()
            .and_then(|i| i.pack.fields.get(step_index))
            .map(|f| f.key.clone())
    }

    /// Mark the interview finished.
    pub fn complete_session(&mut self) {
        self.status = SessionStatus::Completed;
        self.current_item = None;
        self.queue.clear();
        self.instance = None;
    }

    /// Persistable view of the session fields the engine owns.
    pub fn to_update(&self) -> SessionUpdate {
        SessionUpdate {
            status: Some(self.status),
            current_item: Some(self.current_item.clone()),
            queue: Some(self.queue.iter().cloned().collect()),
            transcript: Some(self.transcript.to_vec()),
        }
    }

    /// New persisted record for this session.
    pub fn to_session(&self) -> InterviewSession {
        let mut session = InterviewSession::new(self.session_id, self.current_item.clone());
        session.status = self.status;
        session.queue = self.queue.iter().cloned().collect();
        session.transcript = self.transcript.to_vec();
        if self.status == SessionStatus::Completed {
            session.completed_at = Some(Utc::now());
        }
        session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            status: self.status,
            current_item: self.current_item.clone(),
            queue: self.queue.iter().cloned().collect(),
            transcript: self.transcript.to_vec(),
            committing: self.committing,
            last_error: self.last_error.clone(),
        }
    }
}

/// Read model handed to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub current_item: Option<InterviewItem>,
    pub queue: Vec<InterviewItem>,
    pub transcript: Vec<TranscriptEntry>,
    pub committing: bool,
    pub last_error: Option<String>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::{
        new_entity_id, BehaviorType, Clarifier, EntryKind, FieldConfig, PackConfig, QuestionRecord,
        Route,
    };

    fn bank() -> QuestionBank {
        QuestionBank::new(vec![QuestionRecord::new("Q001", "Have you ever been arrested?", 1)]).unwrap()
    }

    #[test]
    fn test_present_question_appends_text_once() {
        let mut state = SessionState::new(new_entity_id());
        state.present(InterviewItem::question("Q001"), &bank(), "Another?");
        state.present(InterviewItem::question("Q001"), &bank(), "Another?");
        assert_eq!(state.transcript.len(), 1);
        assert_eq!(state.transcript.entries()[0].text, "Have you ever been arrested?");
        assert!(state.is_current(&InterviewItem::question("Q001")));
    }

    #[test]
    fn test_clarifier_uses_probe_slots() {
        let mut state = SessionState::new(new_entity_id());
        let item = InterviewItem::PackField {
            pack_id: "PACK_EMPLOYMENT".to_string(),
            field_index: 0,
            field_key: "date".to_string(),
            field_config: FieldConfig::new("date", "When did it happen?"),
            base_question_id: "Q030".to_string(),
            instance_number: 1,
            clarifier: Some(Clarifier {
                question: "Can you clarify the date?".to_string(),
                probe_index: 1,
            }),
        };
        state.present(item.clone(), &bank(), "Another?");
        state.record_answer_entry(&item, "March 2019");
        let kinds: Vec<EntryKind> = state.transcript.entries().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EntryKind::ProbeQuestion, EntryKind::ProbeAnswer]);
        assert_eq!(
            state.transcript.entries()[1].meta.field_key.as_deref(),
            Some("date")
        );
    }

    #[test]
    fn test_abort_commit_frees_key_and_withdraws_answer() {
        let mut state = SessionState::new(new_entity_id());
        let item = InterviewItem::question("Q010");
        state.present(item.clone(), &bank(), "Another?");
        state.ledger.try_lock("q:Q010:Yes").unwrap();
        let entry = state.record_answer_entry(&item, "Yes");
        assert!(entry.is_some());
        state.begin_commit("q:Q010:Yes", entry);

        state.abort_commit();
        assert!(state.committing);
        assert!(!state.ledger.contains("q:Q010:Yes"));
        assert!(!state.has_answer_entry(&item));
        assert_eq!(state.transcript.len(), 1);

        state.finish_commit();
        assert!(!state.committing);
    }

    #[test]
    fn test_step_label_substitutes_substance() {
        let mut state = SessionState::new(new_entity_id());
        let mut pack = PackConfig::new("PACK_DRUG_USE", BehaviorType::Standard)
            .with_fields(vec![FieldConfig::new("first_use", "When did you first use {substance}?")]);
        pack.substance_name = Some("cannabis".to_string());
        state.instance = Some(PackInstance::new(pack, "Q050", 1, Route::StaticChain));
        let step = InterviewItem::FollowupStep {
            pack_id: "PACK_DRUG_USE".to_string(),
            step_index: 0,
            substance_name: Some("cannabis".to_string()),
            base_question_id: "Q050".to_string(),
            instance_number: 1,
        };
        state.present(step, &bank(), "Another?");
        assert_eq!(
            state.transcript.entries()[0].text,
            "When did you first use cannabis?"
        );
    }

    #[test]
    fn test_tokens_are_monotonic() {
        let mut state = SessionState::new(new_entity_id());
        let first = state.issue_token();
        let second = state.issue_token();
        assert!(second > first);
        assert_eq!(state.watchdog_token, second);
    }

    #[test]
    fn test_round_trip_through_persisted_record() {
        let mut state = SessionState::new(new_entity_id());
        state.present(InterviewItem::question("Q001"), &bank(), "Another?");
        let restored = SessionState::from_persisted(state.to_session());
        assert_eq!(restored.current_item, state.current_item);
        assert_eq!(restored.transcript, state.transcript);
        assert!(restored.ledger.is_empty());
    }
}

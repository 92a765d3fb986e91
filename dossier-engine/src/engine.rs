//! Interview engine
//!
//! `InterviewEngine` is a cheap `Clone` handle over shared state. The only
//! write path is `submit`; every handler follows the same shape:
//!
//! 1. validate what can be validated without state
//! 2. `admit`: ledger lock, stale and busy checks, optimistic transcript
//!    answer and the `committing` flag, all in one critical section
//! 3. async work (store writes, AI calls) with the state unlocked
//! 4. apply the transition under the lock
//! 5. `settle`: persist, then clear `committing`
//!
//! Any `Err` returned from a handler is fatal for that submission. The engine
//! then schedules an unconditional reset of the `committing` flag so a stuck
//! pipeline cannot wedge the session.

use crate::advancer::QuestionBank;
use crate::incident_flow::OPENER_ANSWER_KEY;
use crate::resolver::{PackResolver, StaticPackTable};
use crate::router;
use crate::session::{SessionSnapshot, SessionState};
use crate::transcript::merge_local;
use dossier_core::{
    BehaviorType, ConfigurationError, DossierError, DossierResult, EngineConfig, FollowupResponse,
    FollowupStatus, FollowupUpdate, InterviewItem, PackInstance, ProbeError, Route, SessionId,
    SessionStatus, SummaryRequest, TranscriptEntry, ValidationError,
};
use dossier_events::{AuditSink, InterviewEvent, InterviewEventKind, TracingAuditSink};
use dossier_probe::ProberRegistry;
use dossier_storage::InterviewStore;
use std::sync::{Arc, Mutex};

// ============================================================================
// SUBMISSION TYPES
// ============================================================================

/// What the candidate sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitInput {
    Answer(String),
    /// Replay the last failed field probe for this item
    Retry,
}

impl SubmitInput {
    pub fn answer(text: impl Into<String>) -> Self {
        SubmitInput::Answer(text.into())
    }
}

/// Result of one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Accepted; `current` is the item now awaiting an answer
    Advanced { current: Option<InterviewItem> },
    /// Same submission already accepted; nothing changed
    Duplicate { key: String },
    /// Answer did not validate; re-prompt with `hint`
    Rejected { error: ValidationError, hint: String },
    /// The item is no longer current
    Stale,
    /// Another submission is being committed, or the AI prompt is pending
    Busy,
    /// Answer saved, AI probe failed; retry with `SubmitInput::Retry`
    ProbeFailed { error: ProbeError },
    /// The interview is over
    Completed,
}

/// Result of the admission critical section.
pub(crate) enum Admission {
    Accepted,
    Refused(SubmitOutcome),
}

// ============================================================================
// ENGINE
// ============================================================================

pub(crate) struct EngineInner {
    pub(crate) session_id: SessionId,
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<dyn InterviewStore>,
    pub(crate) probers: ProberRegistry,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) resolver: PackResolver,
    pub(crate) questions: QuestionBank,
    pub(crate) state: Mutex<SessionState>,
}

/// Answer-processing state machine for one interview session.
#[derive(Clone)]
pub struct InterviewEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl std::fmt::Debug for InterviewEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterviewEngine")
            .field("session_id", &self.inner.session_id)
            .field("probers", &self.inner.probers)
            .field("resolver", &self.inner.resolver)
            .finish()
    }
}

/// Collects the engine's collaborators before opening a session.
pub struct EngineBuilder {
    store: Arc<dyn InterviewStore>,
    config: EngineConfig,
    probers: ProberRegistry,
    audit: Arc<dyn AuditSink>,
    static_packs: StaticPackTable,
}

impl EngineBuilder {
    pub fn new(store: Arc<dyn InterviewStore>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            probers: ProberRegistry::new(),
            audit: Arc::new(TracingAuditSink),
            static_packs: StaticPackTable::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn probers(mut self, probers: ProberRegistry) -> Self {
        self.probers = probers;
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn static_packs(mut self, table: StaticPackTable) -> Self {
        self.static_packs = table;
        self
    }

    /// Load the question bank and open `session_id`, resuming it if the
    /// store already holds it.
    pub async fn open(self, session_id: SessionId) -> DossierResult<InterviewEngine> {
        self.config.validate()?;
        let questions = QuestionBank::new(self.store.question_list_active().await?)?;
        let resolver = PackResolver::new(self.store.clone(), self.static_packs);

        let (state, resumed) = match self.store.session_get(session_id).await? {
            Some(persisted) => (SessionState::from_persisted(persisted), true),
            None => {
                let mut state = SessionState::new(session_id);
                if let Some(first) = questions.first() {
                    let item = InterviewItem::question(first.question_id.clone());
                    state.present(item, &questions, &self.config.gate_prompt);
                }
                self.store.session_insert(&state.to_session()).await?;
                (state, false)
            }
        };

        let engine = InterviewEngine {
            inner: Arc::new(EngineInner {
                session_id,
                config: self.config,
                store: self.store,
                probers: self.probers,
                audit: self.audit,
                resolver,
                questions,
                state: Mutex::new(state),
            }),
        };

        if resumed {
            engine.resume().await?;
        }
        tracing::info!(session_id = %session_id, resumed, "Interview session opened");
        Ok(engine)
    }
}

impl InterviewEngine {
    pub fn builder(store: Arc<dyn InterviewStore>) -> EngineBuilder {
        EngineBuilder::new(store)
    }

    /// Open `session_id` with default configuration and no AI providers.
    pub async fn open(store: Arc<dyn InterviewStore>, session_id: SessionId) -> DossierResult<Self> {
        EngineBuilder::new(store).open(session_id).await
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // === Read models ===

    pub fn current_item(&self) -> DossierResult<Option<InterviewItem>> {
        self.with_state(|s| s.current_item.clone())
    }

    pub fn queue(&self) -> DossierResult<Vec<InterviewItem>> {
        self.with_state(|s| s.queue.iter().cloned().collect())
    }

    pub fn transcript(&self) -> DossierResult<Vec<TranscriptEntry>> {
        self.with_state(|s| s.transcript.to_vec())
    }

    pub fn snapshot(&self) -> DossierResult<SessionSnapshot> {
        self.with_state(|s| s.snapshot())
    }

    /// Merge the persisted transcript into the local one.
    pub async fn refresh(&self) -> DossierResult<()> {
        if let Some(persisted) = self.inner.store.session_get(self.inner.session_id).await? {
            self.with_state(|s| s.transcript = s.transcript.merge_local(&persisted.transcript))?;
        }
        Ok(())
    }

    // === Write path ===

    /// Submit `input` for `item`.
    ///
    /// Every handler is admitted before it touches the store, so an error
    /// here belongs to the submission this call holds. That submission is
    /// undone so it can be sent again once the committing flag resets.
    pub async fn submit(&self, item: &InterviewItem, input: SubmitInput) -> DossierResult<SubmitOutcome> {
        let result = match input {
            SubmitInput::Retry => self.retry_probe(item).await,
            SubmitInput::Answer(value) => self.dispatch(item, &value).await,
        };
        if let Err(e) = &result {
            let _ = self.with_state(|s| s.abort_commit());
            self.on_fatal(e);
        }
        result
    }

    async fn dispatch(&self, item: &InterviewItem, value: &str) -> DossierResult<SubmitOutcome> {
        if self.with_state(|s| s.status == SessionStatus::Completed)? {
            return Ok(SubmitOutcome::Completed);
        }
        match item {
            InterviewItem::Question { id } => self.submit_base_answer(item, id, value).await,
            InterviewItem::PackField { .. } => self.submit_pack_field(item, value).await,
            InterviewItem::PackOpener { .. } => self.submit_opener(item, value).await,
            InterviewItem::Probing { .. } => self.submit_probe_answer(item, value).await,
            InterviewItem::FollowupStep { step_index, .. } => {
                self.submit_followup_step(item, *step_index, value).await
            }
            InterviewItem::MultiInstance { .. } | InterviewItem::MultiInstanceGate { .. } => {
                self.submit_gate(item, value).await
            }
        }
    }

    // ========================================================================
    // SHARED PLUMBING
    // ========================================================================

    /// Run `f` with the session state locked.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> DossierResult<R> {
        let mut guard = self.inner.state.lock().map_err(|_| DossierError::Fatal {
            session_id: self.inner.session_id,
            reason: "session state lock poisoned".to_string(),
        })?;
        Ok(f(&mut guard))
    }

    pub(crate) fn present(&self, state: &mut SessionState, item: InterviewItem) {
        state.present(item, &self.inner.questions, &self.inner.config.gate_prompt);
    }

    /// Duplicate, stale and busy checks, then lock `key`, write the answer
    /// entry and mark the session as committing. All in one critical section.
    pub(crate) fn admit(
        &self,
        item: &InterviewItem,
        key: &str,
        answer: Option<&str>,
        reject_if_answered: bool,
    ) -> DossierResult<Admission> {
        let admission = self.with_state(|s| {
            if s.ledger.contains(key) {
                return Admission::Refused(SubmitOutcome::Duplicate {
                    key: key.to_string(),
                });
            }
            if !s.is_current(item) {
                return Admission::Refused(SubmitOutcome::Stale);
            }
            if s.committing {
                return Admission::Refused(SubmitOutcome::Busy);
            }
            if reject_if_answered && s.has_answer_entry(item) {
                return Admission::Refused(SubmitOutcome::Duplicate {
                    key: key.to_string(),
                });
            }
            if s.ledger.try_lock(key).is_err() {
                return Admission::Refused(SubmitOutcome::Duplicate {
                    key: key.to_string(),
                });
            }
            let entry = answer.and_then(|text| s.record_answer_entry(item, text));
            s.begin_commit(key, entry);
            Admission::Accepted
        })?;

        match &admission {
            Admission::Accepted => {
                tracing::debug!(item = item.kind(), key = %key, "Submission accepted");
                self.audit(InterviewEventKind::SubmissionAccepted {
                    item_kind: item.kind().to_string(),
                    key: key.to_string(),
                });
            }
            Admission::Refused(SubmitOutcome::Duplicate { key }) => {
                tracing::debug!(item = item.kind(), key = %key, "Duplicate submission dropped");
                self.audit(InterviewEventKind::DuplicateRejected { key: key.clone() });
            }
            Admission::Refused(outcome) => {
                tracing::debug!(item = item.kind(), outcome = ?outcome, "Submission refused");
            }
        }
        Ok(admission)
    }

    /// Validation failure outcome; nothing was locked or written.
    pub(crate) fn rejected(&self, item: &InterviewItem, error: ValidationError) -> SubmitOutcome {
        tracing::debug!(item = item.kind(), error = %error, "Answer rejected");
        self.audit(InterviewEventKind::ValidationRejected {
            item_kind: item.kind().to_string(),
            reason: error.to_string(),
        });
        let hint = error.hint();
        SubmitOutcome::Rejected { error, hint }
    }

    /// Persist, then release the committing flag and report where we are.
    pub(crate) async fn settle(&self) -> DossierResult<SubmitOutcome> {
        self.persist().await?;
        self.with_state(|s| {
            s.finish_commit();
            outcome_of(s)
        })
    }

    /// Write the session to the store, merging the transcript with whatever
    /// the store already holds.
    pub(crate) async fn persist(&self) -> DossierResult<()> {
        let mut update = self.with_state(|s| s.to_update())?;
        let session_id = self.inner.session_id;
        if let Some(persisted) = self.inner.store.session_get(session_id).await? {
            if let Some(local) = update.transcript.take() {
                update.transcript = Some(merge_local(&local, &persisted.transcript));
            }
        }
        self.inner.store.session_update(session_id, update).await?;
        Ok(())
    }

    /// Fire-and-forget audit record.
    pub(crate) fn audit(&self, kind: InterviewEventKind) {
        let sink = self.inner.audit.clone();
        let event = InterviewEvent::new(self.inner.session_id, kind);
        tokio::spawn(async move {
            let name = event.kind.name();
            if let Err(e) = sink.record(event).await {
                tracing::warn!(event = name, error = %e, "Audit sink failed");
            }
        });
    }

    /// Log a fatal error and schedule the committing reset. Background
    /// tasks land here too and leave any in-flight submission alone.
    pub(crate) fn on_fatal(&self, error: &DossierError) {
        tracing::error!(session_id = %self.inner.session_id, error = %error, "Session write failed");
        let _ = self.with_state(|s| s.last_error = Some(error.to_string()));
        self.audit(InterviewEventKind::Fatal {
            reason: error.to_string(),
        });

        let engine = self.clone();
        let delay = self.inner.config.fatal_reset_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut guard = match engine.inner.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // A submission still in flight clears the flag when it settles
            if guard.inflight_key.is_none() {
                guard.committing = false;
                tracing::debug!(session_id = %engine.inner.session_id, "Committing flag reset");
            }
        });
    }

    // ========================================================================
    // PACK INSTANCE LIFECYCLE
    // ========================================================================

    /// Persist a follow-up record for `instance` and start its controller.
    pub(crate) async fn start_instance(&self, mut instance: PackInstance) -> DossierResult<()> {
        let base_response_id = self.with_state(|s| s.base_response_id)?;
        let followup = FollowupResponse::new(
            self.inner.session_id,
            base_response_id,
            instance.pack_id.clone(),
            instance.base_question_id.clone(),
            instance.instance_number,
        );
        self.inner.store.followup_insert(&followup).await?;
        instance.followup_response_id = Some(followup.followup_id);

        tracing::info!(
            pack_id = %instance.pack_id,
            instance = instance.instance_number,
            route = instance.route.as_str(),
            "Pack instance started"
        );

        let route = instance.route.clone();
        let finished = self.with_state(|s| {
            s.queue.clear();
            s.pending_probe = None;
            s.instance = Some(instance);
            match route {
                Route::StaticChain => {
                    if let Some(active) = s.instance.as_ref() {
                        s.queue = crate::static_chain::plan(active);
                    }
                    !self.next_chain_step(s)
                }
                Route::PerFieldAi => !self.present_next_field(s, 0),
                Route::FullAi { category_id } => {
                    self.present_opener(s, &category_id, 1);
                    false
                }
                Route::None => true,
            }
        })?;

        if finished {
            self.save_instance().await?;
            self.complete_instance(None).await?;
        }
        Ok(())
    }

    /// Sync the active instance's answers and exchanges to its follow-up record.
    pub(crate) async fn save_instance(&self) -> DossierResult<()> {
        let pending = self.with_state(|s| {
            s.instance.as_ref().and_then(|i| {
                i.followup_response_id
                    .map(|id| (id, i.answers.clone(), i.exchanges.clone()))
            })
        })?;
        if let Some((id, answers, exchanges)) = pending {
            self.inner
                .store
                .followup_update(
                    id,
                    FollowupUpdate {
                        answers: Some(answers),
                        probe_exchanges: Some(exchanges),
                        ..FollowupUpdate::default()
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// Close the active instance, kick off its summary and move on to the
    /// gate or the next base question. `exit_note` is written to the
    /// transcript when the interview leaves the pack without a gate.
    pub(crate) async fn complete_instance(&self, exit_note: Option<&str>) -> DossierResult<()> {
        let closed = self.with_state(|s| {
            s.instance.as_mut().map(|instance| {
                instance.close();
                instance.clone()
            })
        })?;
        let Some(instance) = closed else {
            return Ok(());
        };

        self.spawn_summary(&instance);

        if let Some(id) = instance.followup_response_id {
            self.inner
                .store
                .followup_update(
                    id,
                    FollowupUpdate {
                        answers: Some(instance.answers.clone()),
                        probe_exchanges: Some(instance.exchanges.clone()),
                        status: Some(FollowupStatus::Closed),
                        ..FollowupUpdate::default()
                    },
                )
                .await?;
        }
        self.audit(InterviewEventKind::InstanceClosed {
            pack_id: instance.pack_id.clone(),
            instance_number: instance.instance_number,
        });

        let repeatable = self
            .inner
            .questions
            .get(&instance.base_question_id)
            .map(|q| q.repeatable)
            .unwrap_or(false);
        let gated = repeatable || instance.pack.behavior_type == BehaviorType::MultiIncident;

        tracing::info!(
            pack_id = %instance.pack_id,
            instance = instance.instance_number,
            gated,
            "Pack instance closed"
        );

        self.with_state(|s| {
            s.queue.clear();
            s.pending_probe = None;
            if gated {
                let gate = InterviewItem::MultiInstanceGate {
                    pack_id: instance.pack_id.clone(),
                    base_question_id: instance.base_question_id.clone(),
                    instance_number: instance.instance_number,
                };
                self.present(s, gate);
            } else {
                if let (Some(note), Some(current)) = (exit_note, s.current_item.clone()) {
                    let meta = s.meta_for(&current);
                    s.transcript
                        .append_system(s.session_id, &current, "exit", note, meta);
                }
                self.advance_from(s, &instance.base_question_id);
            }
        })
    }

    /// Detached, best-effort summary generation.
    fn spawn_summary(&self, instance: &PackInstance) {
        let generator = match self.inner.probers.summary() {
            Ok(generator) => generator,
            Err(_) => return,
        };
        let request = SummaryRequest {
            session_id: self.inner.session_id,
            pack_id: instance.pack_id.clone(),
            base_question_id: instance.base_question_id.clone(),
            instance_number: instance.instance_number,
            answers: instance.answers.clone(),
            exchanges: instance.exchanges.clone(),
        };
        let followup_id = instance.followup_response_id;
        let engine = self.clone();
        tokio::spawn(async move {
            match generator.summarize_instance(&request).await {
                Ok(summary) => {
                    let Some(id) = followup_id else { return };
                    let update = FollowupUpdate {
                        summary: Some(summary),
                        ..FollowupUpdate::default()
                    };
                    if let Err(e) = engine.inner.store.followup_update(id, update).await {
                        tracing::warn!(pack_id = %request.pack_id, error = %e, "Failed to store summary");
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        pack_id = %request.pack_id,
                        instance = request.instance_number,
                        error = %e,
                        "Summary generation failed"
                    );
                    engine.audit(InterviewEventKind::SummaryFailed {
                        pack_id: request.pack_id.clone(),
                        instance_number: request.instance_number,
                        reason: e.to_string(),
                    });
                }
            }
        });
    }

    /// Make sure the state holds the pack instance `item` belongs to,
    /// rebuilding it from the store after a resume.
    pub(crate) async fn ensure_instance(&self, item: &InterviewItem) -> DossierResult<()> {
        let (Some(pack_id), Some(number)) = (item.pack_id(), item.instance_number()) else {
            return Ok(());
        };
        let loaded = self.with_state(|s| {
            s.instance
                .as_ref()
                .map(|i| i.pack_id == pack_id && i.instance_number == number)
                .unwrap_or(false)
        })?;
        if loaded {
            return Ok(());
        }

        let base_question_id = item.base_question_id();
        let question = self
            .inner
            .questions
            .get(base_question_id)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownQuestion {
                question_id: base_question_id.to_string(),
            })?;
        let resolved = self.inner.resolver.resolve(pack_id).await?;
        let decision = router::route(&resolved, &question, &self.inner.config);
        let mut instance = PackInstance::new(resolved.config, base_question_id, number, decision.route);

        let existing = self
            .inner
            .store
            .followup_list_by_session(self.inner.session_id)
            .await?
            .into_iter()
            .find(|f| f.pack_id == pack_id && f.instance_number == number);

        match existing {
            Some(followup) => {
                for (key, value) in &followup.answers {
                    instance.record_answer(key.clone(), value.clone());
                }
                instance.incident_turns = followup
                    .probe_exchanges
                    .iter()
                    .filter(|e| e.field_key.is_none() && e.answer.is_some())
                    .count() as u32;
                for exchange in &followup.probe_exchanges {
                    if let Some(field_key) = &exchange.field_key {
                        instance.observe_probe(field_key, exchange.index);
                    }
                }
                instance.opener_answer = followup.answers.get(OPENER_ANSWER_KEY).cloned();
                instance.exchanges = followup.probe_exchanges;
                instance.followup_response_id = Some(followup.followup_id);
                if followup.status == FollowupStatus::Closed {
                    instance.close();
                }
                if followup.response_id.is_some() {
                    self.with_state(|s| s.base_response_id = followup.response_id)?;
                }
            }
            None => {
                let base_response_id = self.with_state(|s| s.base_response_id)?;
                let followup = FollowupResponse::new(
                    self.inner.session_id,
                    base_response_id,
                    pack_id,
                    base_question_id,
                    number,
                );
                self.inner.store.followup_insert(&followup).await?;
                instance.followup_response_id = Some(followup.followup_id);
            }
        }

        tracing::debug!(pack_id = %pack_id, instance = number, "Pack instance restored");
        self.with_state(|s| {
            // An outstanding clarifier has been asked but has no exchange yet
            if let Some(InterviewItem::PackField {
                pack_id: current_pack,
                instance_number,
                field_key,
                clarifier: Some(c),
                ..
            }) = &s.current_item
            {
                if current_pack.as_str() == pack_id && *instance_number == number {
                    instance.observe_probe(field_key, c.probe_index);
                }
            }
            s.instance = Some(instance);
        })
    }

    /// Pick up a resumed session: restore the active instance and re-request
    /// an AI prompt that was pending when the session was last written.
    async fn resume(&self) -> DossierResult<()> {
        let current = self.with_state(|s| s.current_item.clone())?;
        let Some(item) = current else {
            return Ok(());
        };
        if let Err(e) = self.ensure_instance(&item).await {
            tracing::warn!(item = item.kind(), error = %e, "Could not restore pack instance");
            return Ok(());
        }
        if let InterviewItem::Probing { prompt: None, .. } = item {
            let token = self.with_state(|s| s.issue_token())?;
            self.spawn_prompt_request(token);
            self.spawn_watchdog(token);
        }
        Ok(())
    }
}

/// Outcome describing where the session now stands.
pub(crate) fn outcome_of(state: &SessionState) -> SubmitOutcome {
    if state.status == SessionStatus::Completed {
        SubmitOutcome::Completed
    } else {
        SubmitOutcome::Advanced {
            current: state.current_item.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

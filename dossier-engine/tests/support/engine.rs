//! Shared engine harness for integration tests.

#![allow(dead_code)]

use dossier_core::{new_entity_id, DossierResult, EngineConfig, InterviewItem, SessionId};
use dossier_engine::{InterviewEngine, StaticPackTable, SubmitInput, SubmitOutcome};
use dossier_test_utils::fixtures::{seeded_store, static_packs, test_config};
use dossier_test_utils::{
    InMemoryAuditLog, MockStore, MockSummaryGenerator, ProberRegistry, ScriptedFieldProber,
    ScriptedIncidentProber,
};
use std::sync::Arc;
use std::time::Duration;

/// Engine plus handles on every mock it talks to.
pub struct Harness {
    pub engine: InterviewEngine,
    pub store: MockStore,
    pub audit: InMemoryAuditLog,
    pub field: ScriptedFieldProber,
    pub incident: ScriptedIncidentProber,
}

pub struct HarnessBuilder {
    store: MockStore,
    config: EngineConfig,
    field: ScriptedFieldProber,
    incident: ScriptedIncidentProber,
    session_id: SessionId,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            store: seeded_store(),
            config: test_config(),
            field: ScriptedFieldProber::new(),
            incident: ScriptedIncidentProber::new(),
            session_id: new_entity_id(),
        }
    }

    pub fn store(mut self, store: MockStore) -> Self {
        self.store = store;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn field(mut self, field: ScriptedFieldProber) -> Self {
        self.field = field;
        self
    }

    pub fn incident(mut self, incident: ScriptedIncidentProber) -> Self {
        self.incident = incident;
        self
    }

    pub fn session(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    pub async fn open(self) -> DossierResult<Harness> {
        let audit = InMemoryAuditLog::new();
        let mut probers = ProberRegistry::new();
        probers.register_field(Box::new(self.field.clone()));
        probers.register_incident(Box::new(self.incident.clone()));
        probers.register_summary(Box::new(MockSummaryGenerator::new()));

        let engine = InterviewEngine::builder(Arc::new(self.store.clone()))
            .config(self.config)
            .probers(probers)
            .audit(Arc::new(audit.clone()))
            .static_packs(StaticPackTable::from_packs(static_packs()))
            .open(self.session_id)
            .await?;

        Ok(Harness {
            engine,
            store: self.store,
            audit,
            field: self.field,
            incident: self.incident,
        })
    }
}

impl Harness {
    /// Default mocks and the fixture question bank.
    pub async fn open() -> DossierResult<Self> {
        HarnessBuilder::new().open().await
    }

    pub fn current(&self) -> Option<InterviewItem> {
        self.engine.current_item().expect("state lock")
    }

    /// Submit `text` to whatever item is current.
    pub async fn answer(&self, text: &str) -> SubmitOutcome {
        let item = self.current().expect("no current item");
        self.engine
            .submit(&item, SubmitInput::answer(text))
            .await
            .expect("submission failed")
    }

    /// Answer a run of items in order, asserting each was accepted.
    pub async fn answer_all(&self, answers: &[&str]) {
        for text in answers {
            let outcome = self.answer(text).await;
            assert!(
                matches!(outcome, SubmitOutcome::Advanced { .. } | SubmitOutcome::Completed),
                "{:?} was not accepted: {:?}",
                text,
                outcome
            );
        }
    }

    /// Let spawned audit tasks run.
    pub async fn drain(&self) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Seven valid answers for one DUI instance.
pub const DUI_ANSWERS: [&str; 7] = ["3/2016", "Oakland", "CHP", "yes", "DUI", "Dismissed", ""];

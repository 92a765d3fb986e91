//! In-memory store for tests and the simulator.

use crate::InterviewStore;
use ::async_trait::async_trait;
use chrono::Utc;
use dossier_core::{
    DossierResult, EntityId, EntityKind, FollowupResponse, FollowupUpdate, InterviewSession,
    PackRecord, QuestionRecord, Response, SessionId, SessionUpdate, StorageError,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory mock store.
///
/// Clones share the same maps, so a test can keep a handle while the engine
/// owns another. Writes can be made to fail to exercise fatal-error paths.
#[derive(Debug, Default, Clone)]
pub struct MockStore {
    sessions: Arc<RwLock<HashMap<SessionId, InterviewSession>>>,
    responses: Arc<RwLock<Vec<Response>>>,
    // UUIDv7 keys keep creation order
    followups: Arc<RwLock<BTreeMap<EntityId, FollowupResponse>>>,
    packs: Arc<RwLock<HashMap<String, PackRecord>>>,
    questions: Arc<RwLock<HashMap<String, QuestionRecord>>>,
    fail_writes: Arc<AtomicBool>,
    session_writes: Arc<AtomicUsize>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StorageError> {
    lock.read().map_err(|_| StorageError::LockPoisoned)
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StorageError> {
    lock.write().map_err(|_| StorageError::LockPoisoned)
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the question bank and pack schemas.
    pub fn with_schema(questions: Vec<QuestionRecord>, packs: Vec<PackRecord>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.questions.write() {
            for q in questions {
                map.insert(q.question_id.clone(), q);
            }
        }
        if let Ok(mut map) = store.packs.write() {
            for p in packs {
                map.insert(p.pack_id.clone(), p);
            }
        }
        store
    }

    /// Make every subsequent write fail with `StorageError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful session inserts and updates.
    pub fn session_write_count(&self) -> usize {
        self.session_writes.load(Ordering::SeqCst)
    }

    pub fn response_count(&self) -> usize {
        self.responses.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn followup_count(&self) -> usize {
        self.followups.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut m) = self.sessions.write() {
            m.clear();
        }
        if let Ok(mut m) = self.responses.write() {
            m.clear();
        }
        if let Ok(mut m) = self.followups.write() {
            m.clear();
        }
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "write failure injected".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl InterviewStore for MockStore {
    // === Session Operations ===

    async fn session_get(&self, id: SessionId) -> DossierResult<Option<InterviewSession>> {
        Ok(read(&self.sessions)?.get(&id).cloned())
    }

    async fn session_insert(&self, session: &InterviewSession) -> DossierResult<()> {
        self.check_writable()?;
        let mut sessions = write(&self.sessions)?;
        if sessions.contains_key(&session.session_id) {
            return Err(StorageError::InsertFailed {
                entity: EntityKind::Session,
                reason: "already exists".to_string(),
            }
            .into());
        }
        sessions.insert(session.session_id, session.clone());
        self.session_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn session_update(
        &self,
        id: SessionId,
        update: SessionUpdate,
    ) -> DossierResult<InterviewSession> {
        self.check_writable()?;
        let mut sessions = write(&self.sessions)?;
        let session = sessions.get_mut(&id).ok_or(StorageError::NotFound {
            entity: EntityKind::Session,
            id: id.to_string(),
        })?;

        if let Some(status) = update.status {
            session.status = status;
            if status == dossier_core::SessionStatus::Completed {
                session.completed_at = Some(Utc::now());
            }
        }
        if let Some(current_item) = update.current_item {
            session.current_item = current_item;
        }
        if let Some(queue) = update.queue {
            session.queue = queue;
        }
        if let Some(transcript) = update.transcript {
            session.transcript = transcript;
        }
        session.updated_at = Utc::now();
        self.session_writes.fetch_add(1, Ordering::SeqCst);

        Ok(session.clone())
    }

    async fn session_delete(&self, id: SessionId) -> DossierResult<()> {
        self.check_writable()?;
        write(&self.sessions)?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| {
                StorageError::DeleteFailed {
                    entity: EntityKind::Session,
                    id: id.to_string(),
                    reason: "not found".to_string(),
                }
                .into()
            })
    }

    // === Response Operations ===

    async fn response_insert(&self, response: &Response) -> DossierResult<()> {
        self.check_writable()?;
        let mut responses = write(&self.responses)?;
        if responses.iter().any(|r| r.response_id == response.response_id) {
            return Err(StorageError::InsertFailed {
                entity: EntityKind::Response,
                reason: "already exists".to_string(),
            }
            .into());
        }
        responses.push(response.clone());
        Ok(())
    }

    async fn response_list_by_session(
        &self,
        session_id: SessionId,
    ) -> DossierResult<Vec<Response>> {
        Ok(read(&self.responses)?
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    // === Follow-up Operations ===

    async fn followup_insert(&self, followup: &FollowupResponse) -> DossierResult<()> {
        self.check_writable()?;
        let mut followups = write(&self.followups)?;
        if followups.contains_key(&followup.followup_id) {
            return Err(StorageError::InsertFailed {
                entity: EntityKind::FollowupResponse,
                reason: "already exists".to_string(),
            }
            .into());
        }
        followups.insert(followup.followup_id, followup.clone());
        Ok(())
    }

    async fn followup_get(&self, id: EntityId) -> DossierResult<Option<FollowupResponse>> {
        Ok(read(&self.followups)?.get(&id).cloned())
    }

    async fn followup_update(&self, id: EntityId, update: FollowupUpdate) -> DossierResult<()> {
        self.check_writable()?;
        let mut followups = write(&self.followups)?;
        let followup = followups.get_mut(&id).ok_or(StorageError::NotFound {
            entity: EntityKind::FollowupResponse,
            id: id.to_string(),
        })?;

        if let Some(answers) = update.answers {
            followup.answers = answers;
        }
        if let Some(exchanges) = update.probe_exchanges {
            followup.probe_exchanges = exchanges;
        }
        if let Some(summary) = update.summary {
            followup.summary = Some(summary);
        }
        if let Some(status) = update.status {
            followup.status = status;
        }
        followup.updated_at = Utc::now();

        Ok(())
    }

    async fn followup_list_by_session(
        &self,
        session_id: SessionId,
    ) -> DossierResult<Vec<FollowupResponse>> {
        Ok(read(&self.followups)?
            .values()
            .filter(|f| f.session_id == session_id)
            .cloned()
            .collect())
    }

    // === Schema Operations ===

    async fn pack_get(&self, pack_id: &str) -> DossierResult<Option<PackRecord>> {
        Ok(read(&self.packs)?.get(pack_id).cloned())
    }

    async fn pack_upsert(&self, record: &PackRecord) -> DossierResult<()> {
        self.check_writable()?;
        write(&self.packs)?.insert(record.pack_id.clone(), record.clone());
        Ok(())
    }

    async fn question_list_active(&self) -> DossierResult<Vec<QuestionRecord>> {
        Ok(read(&self.questions)?
            .values()
            .filter(|q| q.active)
            .cloned()
            .collect())
    }

    async fn question_upsert(&self, record: &QuestionRecord) -> DossierResult<()> {
        self.check_writable()?;
        write(&self.questions)?.insert(record.question_id.clone(), record.clone());
        Ok(())
    }

    async fn health_check(&self) -> DossierResult<bool> {
        Ok(!self.fail_writes.load(Ordering::SeqCst))
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::{
        new_entity_id, DossierError, EntryKind, EntryMeta, FollowupStatus, InterviewItem,
        SessionStatus, TranscriptEntry,
    };

    fn session() -> InterviewSession {
        InterviewSession::new(new_entity_id(), Some(InterviewItem::question("Q001")))
    }

    #[tokio::test]
    async fn test_session_insert_get() {
        let store = MockStore::new();
        let s = session();
        store.session_insert(&s).await.unwrap();
        let loaded = store.session_get(s.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.session_id, s.session_id);
        assert_eq!(store.session_write_count(), 1);
    }

    #[tokio::test]
    async fn test_session_insert_duplicate() {
        let store = MockStore::new();
        let s = session();
        store.session_insert(&s).await.unwrap();
        assert!(store.session_insert(&s).await.is_err());
    }

    #[tokio::test]
    async fn test_session_update_partial() {
        let store = MockStore::new();
        let s = session();
        store.session_insert(&s).await.unwrap();

        let entry = TranscriptEntry::new("k", EntryKind::System, "note", EntryMeta::default());
        let updated = store
            .session_update(
                s.session_id,
                SessionUpdate {
                    transcript: Some(vec![entry]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.transcript.len(), 1);
        assert_eq!(updated.current_item, Some(InterviewItem::question("Q001")));

        let completed = store
            .session_update(
                s.session_id,
                SessionUpdate {
                    status: Some(SessionStatus::Completed),
                    current_item: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(completed.current_item.is_none());
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_session_update_not_found() {
        let store = MockStore::new();
        let err = store
            .session_update(new_entity_id(), SessionUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DossierError::Storage(StorageError::NotFound {
                entity: EntityKind::Session,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = MockStore::new();
        store.set_fail_writes(true);
        let err = store.session_insert(&session()).await.unwrap_err();
        assert!(matches!(
            err,
            DossierError::Storage(StorageError::Unavailable { .. })
        ));
        assert!(!store.health_check().await.unwrap());

        store.set_fail_writes(false);
        assert!(store.session_insert(&session()).await.is_ok());
    }

    #[tokio::test]
    async fn test_followup_update_and_list() {
        let store = MockStore::new();
        let session_id = new_entity_id();
        let first = FollowupResponse::new(session_id, None, "PACK_DRIVING_DUI", "Q010", 1);
        let second = FollowupResponse::new(session_id, None, "PACK_DRIVING_DUI", "Q010", 2);
        store.followup_insert(&first).await.unwrap();
        store.followup_insert(&second).await.unwrap();

        store
            .followup_update(
                first.followup_id,
                FollowupUpdate {
                    summary: Some("One DUI arrest in 2019".to_string()),
                    status: Some(FollowupStatus::Closed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let listed = store.followup_list_by_session(session_id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].instance_number, 1);
        assert_eq!(listed[0].status, FollowupStatus::Closed);
        assert_eq!(listed[1].summary, None);
    }

    #[tokio::test]
    async fn test_question_list_active_filters_inactive() {
        let store = MockStore::with_schema(
            vec![
                QuestionRecord::new("Q001", "One", 1),
                QuestionRecord::new("Q002", "Two", 2).inactive(),
            ],
            vec![],
        );
        let active = store.question_list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].question_id, "Q001");
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MockStore::new();
        let handle = store.clone();
        store.session_insert(&session()).await.unwrap();
        assert_eq!(handle.session_write_count(), 1);
        handle.clear();
        assert_eq!(store.response_count(), 0);
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use dossier_core::{new_entity_id, InterviewItem};
    use proptest::prelude::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Getting a session that was never inserted returns Ok(None)
        #[test]
        fn prop_session_not_found_returns_none(_dummy in any::<u8>()) {
            let store = MockStore::new();
            let result = runtime().block_on(store.session_get(new_entity_id())).unwrap();
            prop_assert!(result.is_none());
        }

        /// Responses come back in insertion order
        #[test]
        fn prop_responses_keep_insertion_order(answers in prop::collection::vec(prop::bool::ANY, 1..20)) {
            let store = MockStore::new();
            let session_id = new_entity_id();
            let rt = runtime();
            for (i, yes) in answers.iter().enumerate() {
                let answer = if *yes { "Yes" } else { "No" };
                let response = Response::new(session_id, format!("Q{:03}", i), answer, None);
                rt.block_on(store.response_insert(&response)).unwrap();
            }
            let listed = rt.block_on(store.response_list_by_session(session_id)).unwrap();
            prop_assert_eq!(listed.len(), answers.len());
            for (i, r) in listed.iter().enumerate() {
                prop_assert_eq!(&r.question_id, &format!("Q{:03}", i));
            }
        }

        /// Update on a missing session is an error, never an upsert
        #[test]
        fn prop_update_missing_session_fails(_dummy in any::<u8>()) {
            let store = MockStore::new();
            let result = runtime().block_on(store.session_update(
                new_entity_id(),
                SessionUpdate {
                    current_item: Some(Some(InterviewItem::question("Q001"))),
                    ..Default::default()
                },
            ));
            prop_assert!(result.is_err());
            prop_assert_eq!(store.session_write_count(), 0);
        }
    }
}

//! Async entity store trait.
//!
//! The engine only ever talks to persistence through this trait. Every
//! method is a single get / filter / create / update / delete; there are no
//! transactions and the engine never assumes it is the only writer.

use ::async_trait::async_trait;
use dossier_core::{
    DossierResult, EntityId, FollowupResponse, FollowupUpdate, InterviewSession, PackRecord,
    QuestionRecord, Response, SessionId, SessionUpdate,
};

#[async_trait]
pub trait InterviewStore: Send + Sync {
    // ========================================================================
    // SESSION OPERATIONS
    // ========================================================================

    /// Get a session by ID.
    async fn session_get(&self, id: SessionId) -> DossierResult<Option<InterviewSession>>;

    /// Insert a new session.
    async fn session_insert(&self, session: &InterviewSession) -> DossierResult<()>;

    /// Apply an update and return the stored session.
    async fn session_update(
        &self,
        id: SessionId,
        update: SessionUpdate,
    ) -> DossierResult<InterviewSession>;

    async fn session_delete(&self, id: SessionId) -> DossierResult<()>;

    // ========================================================================
    // RESPONSE OPERATIONS
    // ========================================================================

    /// Insert a base question answer.
    async fn response_insert(&self, response: &Response) -> DossierResult<()>;

    /// List base answers for a session, oldest first.
    async fn response_list_by_session(&self, session_id: SessionId)
        -> DossierResult<Vec<Response>>;

    // ========================================================================
    // FOLLOW-UP OPERATIONS
    // ========================================================================

    async fn followup_insert(&self, followup: &FollowupResponse) -> DossierResult<()>;

    async fn followup_get(&self, id: EntityId) -> DossierResult<Option<FollowupResponse>>;

    async fn followup_update(&self, id: EntityId, update: FollowupUpdate) -> DossierResult<()>;

    /// List follow-up records for a session, oldest first.
    async fn followup_list_by_session(
        &self,
        session_id: SessionId,
    ) -> DossierResult<Vec<FollowupResponse>>;

    // ========================================================================
    // SCHEMA OPERATIONS
    // ========================================================================

    /// Persisted pack schema, if one exists.
    async fn pack_get(&self, pack_id: &str) -> DossierResult<Option<PackRecord>>;

    async fn pack_upsert(&self, record: &PackRecord) -> DossierResult<()>;

    /// All active base questions, unordered.
    async fn question_list_active(&self) -> DossierResult<Vec<QuestionRecord>>;

    async fn question_upsert(&self, record: &QuestionRecord) -> DossierResult<()>;

    // ========================================================================
    // HEALTH & DIAGNOSTICS
    // ========================================================================

    async fn health_check(&self) -> DossierResult<bool>;
}

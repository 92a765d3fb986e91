//! Audit sinks

use crate::InterviewEvent;
use async_trait::async_trait;
use dossier_core::{DossierResult, StorageError};
use std::sync::{Arc, RwLock};

/// Destination for audit events. The engine calls `record` from detached
/// tasks; a failing sink never affects the interview.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: InterviewEvent) -> DossierResult<()>;
}

/// Writes every event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: InterviewEvent) -> DossierResult<()> {
        let payload = serde_json::to_string(&event.kind).unwrap_or_default();
        tracing::info!(
            target: "dossier::audit",
            session_id = %event.session_id,
            event = event.kind.name(),
            payload = %payload,
            "Audit event"
        );
        Ok(())
    }
}

/// Keeps events in memory, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLog {
    events: Arc<RwLock<Vec<InterviewEvent>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<InterviewEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of recorded events with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.events
            .read()
            .map(|e| e.iter().filter(|ev| ev.kind.name() == name).count())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, event: InterviewEvent) -> DossierResult<()> {
        self.events
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .push(event);
        Ok(())
    }
}

//! DOSSIER Events - Interview Audit Trail
//!
//! Every accepted, duplicate and rejected submission, every routing decision
//! and every recovery the engine performs is emitted as an `InterviewEvent`.
//! Sinks are fire-and-forget from the engine's point of view.
//!
//! # Key Types
//!
//! - `InterviewEvent`: envelope with id, session and timestamp
//! - `InterviewEventKind`: what happened
//! - `AuditSink`: async destination trait
//! - `InMemoryAuditLog`, `TracingAuditSink`: bundled sinks

mod event;
mod sink;

pub use event::{InterviewEvent, InterviewEventKind, WatchdogStage};
pub use sink::{AuditSink, InMemoryAuditLog, TracingAuditSink};

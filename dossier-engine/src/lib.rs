//! DOSSIER Engine - Interview Answer-Processing State Machine
//!
//! Drives one background-interview session from base question to
//! completion: base answers, pack routing, per-field AI probing, open-ended
//! incident probing with stall recovery, static follow-up chains and the
//! multi-instance gate.
//!
//! # Key Types
//!
//! - `InterviewEngine`: the session handle; `submit` is the only write path
//! - `EngineBuilder`: wires store, probers, audit sink and static packs
//! - `SubmitOutcome`: what happened to a submission
//! - `Transcript`: stable-keyed, append-only transcript with `merge_local`
//! - `PackResolver` / `route`: pack lookup and follow-up route selection

mod advancer;
mod engine;
mod field_flow;
mod gate;
mod incident_flow;
mod ledger;
mod resolver;
mod router;
mod session;
mod static_chain;
mod transcript;
pub mod watchdog;

pub use advancer::{NextQuestion, QuestionBank};
pub use engine::{EngineBuilder, InterviewEngine, SubmitInput, SubmitOutcome};
pub use ledger::{DuplicateSubmission, IdempotencyLedger};
pub use resolver::{PackResolver, ResolvedPack, SchemaSource, StaticPackTable};
pub use router::{route, RouteAnomaly, RouteDecision};
pub use session::{PendingProbe, SessionSnapshot, SessionState};
pub use transcript::{merge_local, Transcript};
pub use watchdog::{assess, WatchdogAction};

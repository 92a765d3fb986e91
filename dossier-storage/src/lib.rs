//! DOSSIER Storage - Entity Store Trait and Mock Implementation
//!
//! Defines the persistence contract the interview engine writes through.
//! Production backends implement `InterviewStore`; `MockStore` keeps
//! everything in memory for tests and the simulator.

pub mod mock;
pub mod store;

pub use mock::MockStore;
pub use store::InterviewStore;

//! Idempotency ledger
//!
//! Holds every submission key accepted in this session. A key is inserted
//! synchronously, inside the same critical section that marks the session as
//! committing, so two concurrent submissions of the same `(item, value)` can
//! never both pass. Keys are only released when a base answer is proven to
//! have been rerouted into a pack, when per-field validation rejects the
//! answer after locking, or when the submission fails fatally.

use std::collections::HashSet;

/// Why a key could not be taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSubmission {
    pub key: String,
}

impl std::fmt::Display for DuplicateSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "submission {} already accepted", self.key)
    }
}

/// Set of accepted submission keys.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyLedger {
    keys: HashSet<String>,
}

impl IdempotencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `key`, or report that it is already held.
    pub fn try_lock(&mut self, key: impl Into<String>) -> Result<(), DuplicateSubmission> {
        let key = key.into();
        if self.keys.contains(&key) {
            return Err(DuplicateSubmission { key });
        }
        self.keys.insert(key);
        Ok(())
    }

    /// Drop `key`. Returns whether it was held.
    pub fn release(&mut self, key: &str) -> bool {
        self.keys.remove(key)
    }

    /// Atomically release `from` and take `to`.
    ///
    /// When `to` is already held nothing changes and `from` stays locked.
    pub fn swap(&mut self, from: &str, to: impl Into<String>) -> Result<(), DuplicateSubmission> {
        let to = to.into();
        if self.keys.contains(&to) {
            return Err(DuplicateSubmission { key: to });
        }
        self.keys.remove(from);
        self.keys.insert(to);
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

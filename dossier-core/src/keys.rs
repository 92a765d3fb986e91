//! Deterministic key derivation.
//!
//! Two key families live here:
//! - **submission keys** identify one logical submission for the idempotency
//!   ledger. Gate keys carry the normalised answer so a gate answered "Yes"
//!   for one instance and "No" for a later one never collide.
//! - **stable keys** identify one logical transcript utterance. They are
//!   derived from session + item + slot and never contain random parts, so
//!   re-appending the same utterance is a no-op.

use crate::{InterviewItem, SessionId};

/// Which utterance of an item a transcript entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntrySlot<'a> {
    Question,
    Answer,
    ProbeQuestion(u32),
    ProbeAnswer(u32),
    System(&'a str),
}

/// Identifier of a gate item, used inside gate submission keys.
pub fn gate_item_id(pack_id: &str, instance_number: u32) -> String {
    format!("multi-instance-gate-{}-{}", pack_id, instance_number)
}

/// Value-independent identity of an item within a session.
fn item_identity(item: &InterviewItem) -> String {
    match item {
        InterviewItem::Question { id } => format!("q:{}", id),
        InterviewItem::PackField {
            pack_id,
            field_key,
            instance_number,
            ..
        } => format!("p:{}:{}:{}", pack_id, field_key, instance_number),
        InterviewItem::PackOpener {
            pack_id,
            instance_number,
            attempt,
            ..
        } => format!("opener:{}:{}:{}", pack_id, instance_number, attempt),
        InterviewItem::Probing {
            pack_id,
            instance_number,
            turn,
            ..
        } => format!("probe:{}:{}:{}", pack_id, instance_number, turn),
        InterviewItem::FollowupStep {
            pack_id,
            step_index,
            instance_number,
            ..
        } => format!("f:{}:{}:{}", pack_id, step_index, instance_number),
        InterviewItem::MultiInstance {
            question_id,
            pack_id,
            instance_number,
        } => format!("mi:{}:{}:{}", question_id, pack_id, instance_number),
        InterviewItem::MultiInstanceGate {
            pack_id,
            instance_number,
            ..
        } => format!("mi_gate:{}:{}", pack_id, instance_number),
    }
}

/// Idempotency key for submitting `normalized_value` to `item`.
pub fn submission_key(item: &InterviewItem, normalized_value: &str) -> String {
    match item {
        InterviewItem::PackField {
            clarifier: Some(clarifier),
            ..
        } => format!("{}:c{}", item_identity(item), clarifier.probe_index),
        InterviewItem::MultiInstance { .. } => {
            format!("{}:{}", item_identity(item), normalized_value)
        }
        InterviewItem::MultiInstanceGate {
            pack_id,
            instance_number,
            ..
        } => format!(
            "mi_gate:{}:{}:{}:{}",
            pack_id,
            instance_number,
            normalized_value,
            gate_item_id(pack_id, *instance_number)
        ),
        _ => item_identity(item),
    }
}

/// Route-specific lock acquired when a base "Yes" is rerouted into a pack.
pub fn route_key(question_id: &str, pack_id: &str, route: &str) -> String {
    format!("route:{}:{}:{}", question_id, pack_id, route)
}

/// Lock for an explicit probe retry.
pub fn retry_key(pack_id: &str, field_key: &str, instance_number: u32, attempt: u32) -> String {
    format!("retry:{}:{}:{}:{}", pack_id, field_key, instance_number, attempt)
}

/// Stable transcript key for one utterance of `item` in `session_id`.
pub fn stable_key(session_id: SessionId, item: &InterviewItem, slot: EntrySlot<'_>) -> String {
    let suffix = match slot {
        EntrySlot::Question => "question".to_string(),
        EntrySlot::Answer => "answer".to_string(),
        EntrySlot::ProbeQuestion(n) => format!("probe_q{}", n),
        EntrySlot::ProbeAnswer(n) => format!("probe_a{}", n),
        EntrySlot::System(tag) => format!("system:{}", tag),
    };
    format!("{}:{}:{}", session_id, item_identity(item), suffix)
}

// =============================================================================
// TESTS
// =============================================================================

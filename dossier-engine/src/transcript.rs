//! Transcript synchronizer
//!
//! The transcript is append-only and keyed by stable key: appending an entry
//! whose key is already present is a no-op, so the same utterance can be
//! written from the submit path, the watchdog and a refresh without ever
//! duplicating. The one exception is `retract`, which withdraws the
//! optimistic answer of a submission that failed.
//!
//! `merge_local` reconciles the local view with a persisted snapshot under
//! two laws:
//!
//! - `merge(T, T) == T`
//! - every local stable key survives the merge

use dossier_core::{
    stable_key, EntryKind, EntryMeta, EntrySlot, InterviewItem, SessionId, TranscriptEntry,
};
use std::collections::{HashMap, HashSet};

/// Ordered, key-unique list of transcript entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    keys: HashSet<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted entries. Later duplicates of a key are dropped.
    pub fn from_entries(entries: Vec<TranscriptEntry>) -> Self {
        let mut transcript = Self::new();
        for entry in entries {
            transcript.append(entry);
        }
        transcript
    }

    /// Append unless the stable key is already present. Returns whether the
    /// entry was added.
    pub fn append(&mut self, entry: TranscriptEntry) -> bool {
        if self.keys.contains(&entry.stable_key) {
            return false;
        }
        self.keys.insert(entry.stable_key.clone());
        self.entries.push(entry);
        true
    }

    pub fn append_question(
        &mut self,
        session_id: SessionId,
        item: &InterviewItem,
        text: &str,
        meta: EntryMeta,
    ) -> bool {
        self.append_slot(session_id, item, EntrySlot::Question, EntryKind::Question, text, meta)
    }

    pub fn append_answer(
        &mut self,
        session_id: SessionId,
        item: &InterviewItem,
        text: &str,
        meta: EntryMeta,
    ) -> bool {
        self.append_slot(session_id, item, EntrySlot::Answer, EntryKind::Answer, text, meta)
    }

    pub fn append_probe_question(
        &mut self,
        session_id: SessionId,
        item: &InterviewItem,
        index: u32,
        text: &str,
        meta: EntryMeta,
    ) -> bool {
        self.append_slot(
            session_id,
            item,
            EntrySlot::ProbeQuestion(index),
            EntryKind::ProbeQuestion,
            text,
            meta,
        )
    }

    pub fn append_probe_answer(
        &mut self,
        session_id: SessionId,
        item: &InterviewItem,
        index: u32,
        text: &str,
        meta: EntryMeta,
    ) -> bool {
        self.append_slot(
            session_id,
            item,
            EntrySlot::ProbeAnswer(index),
            EntryKind::ProbeAnswer,
            text,
            meta,
        )
    }

    /// System note attached to `item`, keyed by `tag`.
    pub fn append_system(
        &mut self,
        session_id: SessionId,
        item: &InterviewItem,
        tag: &str,
        text: &str,
        meta: EntryMeta,
    ) -> bool {
        self.append_slot(session_id, item, EntrySlot::System(tag), EntryKind::System, text, meta)
    }

    fn append_slot(
        &mut self,
        session_id: SessionId,
        item: &InterviewItem,
        slot: EntrySlot<'_>,
        kind: EntryKind,
        text: &str,
        meta: EntryMeta,
    ) -> bool {
        let key = stable_key(session_id, item, slot);
        self.append(TranscriptEntry::new(key, kind, text, meta))
    }

    /// Remove the entry under `stable_key`. Returns whether it was present.
    pub fn retract(&mut self, stable_key: &str) -> bool {
        if !self.keys.remove(stable_key) {
            return false;
        }
        self.entries.retain(|e| e.stable_key != stable_key);
        true
    }

    pub fn contains_key(&self, stable_key: &str) -> bool {
        self.keys.contains(stable_key)
    }

    pub fn get(&self, stable_key: &str) -> Option<&TranscriptEntry> {
        if !self.keys.contains(stable_key) {
            return None;
        }
        self.entries.iter().find(|e| e.stable_key == stable_key)
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn to_vec(&self) -> Vec<TranscriptEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries of `kind`.
    pub fn count_kind(&self, kind: EntryKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Merge a persisted snapshot into this transcript.
    pub fn merge_local(&self, persisted: &[TranscriptEntry]) -> Transcript {
        Transcript::from_entries(merge_local(&self.entries, persisted))
    }
}

/// Reconcile `local` with `persisted`.
///
/// Local order is kept. For keys present on both sides the persisted content
/// wins. Persisted-only entries are spliced directly after their nearest
/// persisted predecessor that is already in the result, or at the front when
/// they have none.
pub fn merge_local(local: &[TranscriptEntry], persisted: &[TranscriptEntry]) -> Vec<TranscriptEntry> {
    let mut persisted_by_key: HashMap<&str, &TranscriptEntry> = HashMap::new();
    for entry in persisted {
        persisted_by_key.entry(entry.stable_key.as_str()).or_insert(entry);
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut merged: Vec<TranscriptEntry> = Vec::with_capacity(local.len() + persisted.len());
    for entry in local {
        if !seen.insert(entry.stable_key.clone()) {
            continue;
        }
        let winner = persisted_by_key
            .get(entry.stable_key.as_str())
            .copied()
            .unwrap_or(entry);
        merged.push(winner.clone());
    }

    let mut predecessor: Option<String> = None;
    for entry in persisted {
        if seen.contains(&entry.stable_key) {
            predecessor = Some(entry.stable_key.clone());
            continue;
        }
        let position = predecessor
            .as_deref()
            .and_then(|key| merged.iter().position(|e| e.stable_key == key))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        merged.insert(position, entry.clone());
        seen.insert(entry.stable_key.clone());
        predecessor = Some(entry.stable_key.clone());
    }

    merged
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_core::new_entity_id;

    fn entry(key: &str, text: &str) -> TranscriptEntry {
        TranscriptEntry::new(key, EntryKind::Answer, text, EntryMeta::default())
    }

    fn keys(entries: &[TranscriptEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.stable_key.as_str()).collect()
    }

    #[test]
    fn test_append_is_idempotent_per_stable_key() {
        let session = new_entity_id();
        let item = InterviewItem::question("Q001");
        let mut transcript = Transcript::new();
        assert!(transcript.append_question(session, &item, "Ever arrested?", EntryMeta::question("Q001")));
        assert!(!transcript.append_question(session, &item, "Ever arrested?", EntryMeta::question("Q001")));
        assert!(transcript.append_answer(session, &item, "No", EntryMeta::question("Q001")));
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.count_kind(EntryKind::Answer), 1);
    }

    #[test]
    fn test_probe_slots_are_distinct() {
        let session = new_entity_id();
        let item = InterviewItem::question("Q001");
        let mut transcript = Transcript::new();
        transcript.append_probe_question(session, &item, 1, "When?", EntryMeta::default());
        transcript.append_probe_question(session, &item, 2, "Where?", EntryMeta::default());
        transcript.append_system(session, &item, "stall", "AI unavailable", EntryMeta::default());
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.entries()[2].kind, EntryKind::System);
    }

    #[test]
    fn test_merge_persisted_content_wins_local_order_kept() {
        let local = vec![entry("a", "local a"), entry("b", "local b")];
        let persisted = vec![entry("b", "persisted b"), entry("a", "persisted a")];
        let merged = merge_local(&local, &persisted);
        assert_eq!(keys(&merged), vec!["a", "b"]);
        assert_eq!(merged[0].text, "persisted a");
        assert_eq!(merged[1].text, "persisted b");
    }

    #[test]
    fn test_merge_splices_after_persisted_predecessor() {
        let local = vec![entry("a", "a"), entry("c", "c")];
        let persisted = vec![entry("a", "a"), entry("b", "b"), entry("c", "c")];
        let merged = merge_local(&local, &persisted);
        assert_eq!(keys(&merged), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_without_predecessor_goes_to_front_in_order() {
        let local = vec![entry("z", "z")];
        let persisted = vec![entry("x", "x"), entry("y", "y")];
        let merged = merge_local(&local, &persisted);
        assert_eq!(keys(&merged), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_merge_dedupes_by_key() {
        let local = vec![entry("a", "first"), entry("a", "second")];
        let merged = merge_local(&local, &[]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "first");
    }

    #[test]
    fn test_from_entries_drops_duplicates() {
        let transcript = Transcript::from_entries(vec![entry("a", "1"), entry("a", "2")]);
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.get("a").map(|e| e.text.as_str()), Some("1"));
    }
}

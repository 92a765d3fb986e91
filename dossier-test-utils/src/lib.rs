//! DOSSIER Test Utilities
//!
//! Centralized test infrastructure for the DOSSIER workspace:
//! - Proptest generators for answers and transcript entries
//! - Test fixtures: a question bank and one pack per follow-up route
//! - Custom assertions over transcripts

// Re-export mocks from their source crates
pub use dossier_events::InMemoryAuditLog;
pub use dossier_probe::{
    MockSummaryGenerator, ProberRegistry, ScriptedFieldProber, ScriptedIncidentProber,
};
pub use dossier_storage::MockStore;

// Re-export core types for convenience
pub use dossier_core::{
    BehaviorType, EngineConfig, EntryKind, EntryMeta, FieldConfig, FieldProbeResponse,
    IncidentProbeResponse, InterviewItem, PackConfig, PackFieldRecord, PackRecord, ProbeError,
    QuestionRecord, SemanticType, SessionId, TranscriptEntry, YesNo,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for answers and transcript entries.

    use super::*;
    use proptest::prelude::*;

    /// Yes/No spellings the normaliser accepts, with surrounding whitespace.
    pub fn arb_yes_no_input() -> impl Strategy<Value = (String, YesNo)> {
        let spelling = prop_oneof![
            Just(("yes", YesNo::Yes)),
            Just(("Yes", YesNo::Yes)),
            Just(("YES", YesNo::Yes)),
            Just(("y", YesNo::Yes)),
            Just(("Y", YesNo::Yes)),
            Just(("no", YesNo::No)),
            Just(("No", YesNo::No)),
            Just(("NO", YesNo::No)),
            Just(("n", YesNo::No)),
            Just(("N", YesNo::No)),
        ];
        (spelling, "[ \t]{0,2}", "[ \t]{0,2}")
            .prop_map(|((word, answer), pre, post)| (format!("{}{}{}", pre, word, post), answer))
    }

    /// Text the Yes/No normaliser must reject.
    pub fn arb_invalid_yes_no() -> impl Strategy<Value = String> {
        "[a-z]{2,8}".prop_filter("must not be a yes/no spelling", |s| {
            !matches!(s.as_str(), "yes" | "no" | "y" | "n")
        })
    }

    /// Dates in the formats date fields accept.
    pub fn arb_date_answer() -> impl Strategy<Value = String> {
        prop_oneof![
            (1u32..=12, 1990u32..2030).prop_map(|(m, y)| format!("{}/{}", m, y)),
            (1990u32..2030).prop_map(|y| y.to_string()),
            (1990u32..2030, 1u32..=12).prop_map(|(y, m)| format!("{}-{:02}", y, m)),
        ]
    }

    /// Non-empty free-text answer.
    pub fn arb_free_text() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9 ,.]{0,40}"
    }

    pub fn arb_entry_kind() -> impl Strategy<Value = EntryKind> {
        prop_oneof![
            Just(EntryKind::Question),
            Just(EntryKind::Answer),
            Just(EntryKind::ProbeQuestion),
            Just(EntryKind::ProbeAnswer),
            Just(EntryKind::System),
        ]
    }

    /// Transcript entries with distinct stable keys drawn from a small pool,
    /// so two generated transcripts usually overlap.
    pub fn arb_transcript(max_len: usize) -> impl Strategy<Value = Vec<TranscriptEntry>> {
        prop::collection::btree_map(0u8..24, (arb_entry_kind(), arb_free_text()), 0..max_len)
            .prop_map(|map| {
                map.into_iter()
                    .map(|(key, (kind, text))| {
                        TranscriptEntry::new(format!("k{}", key), kind, text, EntryMeta::default())
                    })
                    .collect::<Vec<_>>()
            })
            .prop_shuffle()
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Question bank and packs covering every follow-up route.
    //!
    //! | Question | Pack               | Route          | Gated |
    //! |----------|--------------------|----------------|-------|
    //! | Q001     | none               |                |       |
    //! | Q010     | PACK_DRIVING_DUI   | static chain   | yes (repeatable) |
    //! | Q020     | PACK_EMPLOYMENT    | per-field AI   | no    |
    //! | Q030     | PACK_THEFT         | full AI        | no    |
    //! | Q040     | PACK_ALTERCATION   | full AI        | yes (multi-incident) |
    //! | Q050     | none               |                |       |

    use super::*;

    pub const DUI_PACK: &str = "PACK_DRIVING_DUI";
    pub const EMPLOYMENT_PACK: &str = "PACK_EMPLOYMENT";
    pub const THEFT_PACK: &str = "PACK_THEFT";
    pub const ALTERCATION_PACK: &str = "PACK_ALTERCATION";

    pub fn question_bank() -> Vec<QuestionRecord> {
        vec![
            QuestionRecord::new("Q001", "Have you used any illegal drugs in the last seven years?", 1)
                .in_section(1),
            QuestionRecord::new(
                "Q010",
                "Have you ever been arrested for driving under the influence?",
                10,
            )
            .in_section(1)
            .with_pack(DUI_PACK)
            .repeatable(),
            QuestionRecord::new("Q020", "Have you ever been fired or asked to resign from a job?", 20)
                .in_section(2)
                .with_pack(EMPLOYMENT_PACK),
            QuestionRecord::new(
                "Q030",
                "Have you ever taken property that did not belong to you?",
                30,
            )
            .in_section(2)
            .with_pack(THEFT_PACK),
            QuestionRecord::new("Q040", "Have you ever been in a physical altercation?", 40)
                .in_section(3)
                .with_pack(ALTERCATION_PACK),
            QuestionRecord::new(
                "Q050",
                "Is everything you have told us true and complete?",
                50,
            )
            .in_section(3),
        ]
    }

    /// Seven deterministic steps, no prefill and no conditions.
    pub fn dui_pack() -> PackConfig {
        PackConfig::new(DUI_PACK, BehaviorType::Standard).with_fields(vec![
            FieldConfig::new("incident_date", "When were you arrested?")
                .with_type(SemanticType::Date),
            FieldConfig::new("location", "Where were you arrested?"),
            FieldConfig::new("agency", "Which agency arrested you?"),
            FieldConfig::new("bac_tested", "Were you tested for blood alcohol?")
                .with_type(SemanticType::YesNo),
            FieldConfig::new("charges", "What were you charged with?"),
            FieldConfig::new("outcome", "What was the outcome?").with_type(SemanticType::Choice {
                options: vec![
                    "Convicted".to_string(),
                    "Dismissed".to_string(),
                    "Pending".to_string(),
                    "Other".to_string(),
                ],
            }),
            FieldConfig::new("details", "Anything else we should know?").optional(),
        ])
    }

    /// Per-field AI pack with a date field and a conditional field.
    pub fn employment_pack() -> PackConfig {
        PackConfig::new(EMPLOYMENT_PACK, BehaviorType::PerFieldAi)
            .with_max_ai_followups(2)
            .with_fields(vec![
                FieldConfig::new("employer", "Who was the employer?"),
                FieldConfig::new("date", "When did the employment end?").with_type(SemanticType::Date),
                FieldConfig::new("reason", "Why did it end?"),
                FieldConfig::new("rehire", "Are you eligible for rehire?")
                    .with_type(SemanticType::YesNo)
                    .skip_unless("reason", &["fired", "terminated"]),
            ])
    }

    pub fn theft_pack() -> PackConfig {
        PackConfig::new(THEFT_PACK, BehaviorType::FullAi)
            .with_category("theft")
            .with_opener("Please describe what you took, when, and where.")
    }

    pub fn altercation_pack() -> PackConfig {
        PackConfig::new(ALTERCATION_PACK, BehaviorType::MultiIncident).with_category("violence")
    }

    pub fn static_packs() -> Vec<PackConfig> {
        vec![dui_pack(), employment_pack(), theft_pack(), altercation_pack()]
    }

    /// Persisted record for the employment pack using legacy key naming.
    pub fn legacy_employment_record() -> PackRecord {
        let field = |key: &str, label: &str, order: i32| PackFieldRecord {
            field_key: format!("{}_{}", EMPLOYMENT_PACK, key),
            label: label.to_string(),
            required: None,
            semantic_type: None,
            order: Some(order),
            skip_unless: None,
            ai_probe: false,
            prefill: None,
        };
        PackRecord {
            pack_id: EMPLOYMENT_PACK.to_string(),
            behavior: Some("ai_probing".to_string()),
            fields: vec![
                field("Reason", "Why did it end?", 3),
                field("Employer", "Who was the employer?", 1),
                field("Date", "When did the employment end?", 2),
            ],
            max_ai_followups: Some(1),
            requires_completion: false,
            category_id: None,
            opener_text: None,
            substance_name: None,
            active: true,
        }
    }

    /// Store holding the question bank and no persisted packs.
    pub fn seeded_store() -> MockStore {
        MockStore::with_schema(question_bank(), Vec::new())
    }

    /// Defaults with a short incident turn cap.
    pub fn test_config() -> EngineConfig {
        EngineConfig {
            max_incident_turns: 3,
            ..EngineConfig::default()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Transcript assertions.

    use super::*;

    /// Entries whose stable key ends with `suffix`.
    pub fn entries_with_suffix<'a>(
        entries: &'a [TranscriptEntry],
        suffix: &str,
    ) -> Vec<&'a TranscriptEntry> {
        entries
            .iter()
            .filter(|e| e.stable_key.ends_with(suffix))
            .collect()
    }

    /// Assert no two entries share a stable key.
    #[track_caller]
    pub fn assert_unique_keys(entries: &[TranscriptEntry]) {
        let mut seen = std::collections::HashSet::new();
        for entry in entries {
            assert!(
                seen.insert(entry.stable_key.as_str()),
                "Duplicate stable key in transcript: {}",
                entry.stable_key
            );
        }
    }

    /// Assert the transcript holds exactly `expected` entries of `kind`
    /// for base question `question_id`.
    #[track_caller]
    pub fn assert_kind_count(
        entries: &[TranscriptEntry],
        question_id: &str,
        kind: EntryKind,
        expected: usize,
    ) {
        let count = entries
            .iter()
            .filter(|e| e.kind == kind && e.meta.question_id.as_deref() == Some(question_id))
            .count();
        assert_eq!(
            count, expected,
            "Expected {} {:?} entries for {}, found {}",
            expected, kind, question_id, count
        );
    }

    /// Assert the base question and `answer` are both in the transcript, in order.
    #[track_caller]
    pub fn assert_base_pair(entries: &[TranscriptEntry], question_id: &str, answer: &str) {
        let position = |kind: EntryKind| {
            entries.iter().position(|e| {
                e.kind == kind
                    && e.meta.question_id.as_deref() == Some(question_id)
                    && e.meta.pack_id.is_none()
            })
        };
        let question = position(EntryKind::Question)
            .unwrap_or_else(|| panic!("No question entry for {}", question_id));
        let answered = position(EntryKind::Answer)
            .unwrap_or_else(|| panic!("No answer entry for {}", question_id));
        assert!(question < answered, "Answer for {} precedes its question", question_id);
        assert_eq!(entries[answered].text, answer);
    }

    /// Assert at least one system entry carries `tag`.
    #[track_caller]
    pub fn assert_system_entry(entries: &[TranscriptEntry], tag: &str) {
        let suffix = format!("system:{}", tag);
        assert!(
            entries
                .iter()
                .any(|e| e.kind == EntryKind::System && e.stable_key.ends_with(&suffix)),
            "No system entry tagged {:?}",
            tag
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_question_bank_links_every_pack() {
        let packs: Vec<String> = fixtures::static_packs()
            .into_iter()
            .map(|p| p.pack_id)
            .collect();
        for question in fixtures::question_bank() {
            if let Some(pack) = question.followup_pack {
                assert!(packs.contains(&pack), "{} has no fixture pack", pack);
            }
        }
    }

    #[test]
    fn test_dui_pack_has_seven_plain_steps() {
        let pack = fixtures::dui_pack();
        assert_eq!(pack.fields.len(), 7);
        assert!(pack
            .fields
            .iter()
            .all(|f| f.prefill.is_none() && f.skip_unless.is_none()));
    }

    #[test]
    fn test_assert_base_pair() {
        let entries = vec![
            TranscriptEntry::new("s:q:Q010:question", EntryKind::Question, "Q?", EntryMeta::question("Q010")),
            TranscriptEntry::new("s:q:Q010:answer", EntryKind::Answer, "Yes", EntryMeta::question("Q010")),
        ];
        assertions::assert_base_pair(&entries, "Q010", "Yes");
        assertions::assert_unique_keys(&entries);
        assertions::assert_kind_count(&entries, "Q010", EntryKind::Answer, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_yes_no_inputs_normalise((input, expected) in generators::arb_yes_no_input()) {
            prop_assert_eq!(YesNo::parse(&input).unwrap(), expected);
        }

        #[test]
        fn prop_invalid_yes_no_rejected(input in generators::arb_invalid_yes_no()) {
            prop_assert!(YesNo::parse(&input).is_err());
        }

        #[test]
        fn prop_generated_dates_validate(date in generators::arb_date_answer()) {
            prop_assert!(SemanticType::Date.validate("date", &date).is_ok());
        }

        #[test]
        fn prop_generated_transcripts_have_unique_keys(entries in generators::arb_transcript(16)) {
            let mut keys: Vec<&str> = entries.iter().map(|e| e.stable_key.as_str()).collect();
            keys.sort_unstable();
            keys.dedup();
            prop_assert_eq!(keys.len(), entries.len());
        }
    }
}

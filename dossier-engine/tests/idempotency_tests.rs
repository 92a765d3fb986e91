//! Integration tests for duplicate and stale submissions
//!
//! Tests verify:
//! - Concurrent identical submissions commit exactly once
//! - Replaying an accepted answer is a duplicate, not a second write
//! - Answering an item that is no longer current is stale

#[path = "support/engine.rs"]
mod test_engine_support;

use dossier_core::{DossierResult, EntryKind, InterviewItem};
use dossier_engine::{SubmitInput, SubmitOutcome};
use dossier_test_utils::assertions::{assert_kind_count, assert_unique_keys};
use test_engine_support::Harness;

#[tokio::test]
async fn test_concurrent_identical_submissions_commit_once() -> DossierResult<()> {
    let h = Harness::open().await?;
    let item = h.current().unwrap();
    assert_eq!(item, InterviewItem::question("Q001"));

    // "no" and "No" normalise to the same submission
    let (first, second) = tokio::join!(
        h.engine.submit(&item, SubmitInput::answer("No")),
        h.engine.submit(&item, SubmitInput::answer("no")),
    );
    let outcomes = [first?, second?];

    let advanced = outcomes
        .iter()
        .filter(|o| {
            **o == SubmitOutcome::Advanced {
                current: Some(InterviewItem::question("Q010")),
            }
        })
        .count();
    let duplicates = outcomes
        .iter()
        .filter(|o| matches!(o, SubmitOutcome::Duplicate { .. }))
        .count();
    assert_eq!(advanced, 1, "outcomes: {:?}", outcomes);
    assert_eq!(duplicates, 1, "outcomes: {:?}", outcomes);

    assert_eq!(h.store.response_count(), 1);
    let transcript = h.engine.transcript()?;
    assert_kind_count(&transcript, "Q001", EntryKind::Answer, 1);
    assert_unique_keys(&transcript);

    h.drain().await;
    assert_eq!(h.audit.count("duplicate_rejected"), 1);
    Ok(())
}

#[tokio::test]
async fn test_replayed_answer_is_duplicate() -> DossierResult<()> {
    let h = Harness::open().await?;
    let item = h.current().unwrap();

    let first = h.engine.submit(&item, SubmitInput::answer("No")).await?;
    assert!(matches!(first, SubmitOutcome::Advanced { .. }));

    let replay = h.engine.submit(&item, SubmitInput::answer("No")).await?;
    assert!(matches!(replay, SubmitOutcome::Duplicate { .. }));
    assert_eq!(h.store.response_count(), 1);
    assert_eq!(h.current(), Some(InterviewItem::question("Q010")));
    Ok(())
}

#[tokio::test]
async fn test_different_answer_to_old_item_is_stale() -> DossierResult<()> {
    let h = Harness::open().await?;
    let item = h.current().unwrap();
    h.engine.submit(&item, SubmitInput::answer("No")).await?;

    let late = h.engine.submit(&item, SubmitInput::answer("Yes")).await?;
    assert_eq!(late, SubmitOutcome::Stale);

    let transcript = h.engine.transcript()?;
    assert_kind_count(&transcript, "Q001", EntryKind::Answer, 1);
    Ok(())
}

#[tokio::test]
async fn test_rejected_answer_writes_nothing() -> DossierResult<()> {
    let h = Harness::open().await?;
    let outcome = h.answer("maybe").await;

    match outcome {
        SubmitOutcome::Rejected { hint, .. } => assert!(!hint.is_empty()),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(h.store.response_count(), 0);
    assert_eq!(h.current(), Some(InterviewItem::question("Q001")));

    // The same item still takes a valid answer
    assert!(matches!(h.answer("No").await, SubmitOutcome::Advanced { .. }));

    h.drain().await;
    assert_eq!(h.audit.count("validation_rejected"), 1);
    Ok(())
}

//! Integration tests for per-field AI packs
//!
//! Tests verify:
//! - Clarifying questions stay on the same field and respect the cap
//! - Probe failures keep the answer and can be retried
//! - Confident suggestions fill later fields without asking

#[path = "support/engine.rs"]
mod test_engine_support;

use dossier_core::{DossierResult, FieldProbeResponse, InterviewItem, ProbeError, ValidationError};
use dossier_engine::{SubmitInput, SubmitOutcome};
use dossier_test_utils::assertions::{assert_system_entry, entries_with_suffix};
use dossier_test_utils::ScriptedFieldProber;
use test_engine_support::{Harness, HarnessBuilder};

/// Walk to Q020 and into the employment pack.
async fn into_employment(field: ScriptedFieldProber) -> DossierResult<Harness> {
    let h = HarnessBuilder::new().field(field).open().await?;
    h.answer_all(&["No", "No", "Yes"]).await;
    assert_eq!(field_position(&h.current()), Some((0, None)));
    Ok(h)
}

/// `(field_index, clarifier question)` of a current `PackField`.
fn field_position(item: &Option<InterviewItem>) -> Option<(usize, Option<String>)> {
    match item {
        Some(InterviewItem::PackField {
            field_index,
            clarifier,
            ..
        }) => Some((*field_index, clarifier.as_ref().map(|c| c.question.clone()))),
        _ => None,
    }
}

#[tokio::test]
async fn test_clarifier_stays_on_field() -> DossierResult<()> {
    let field = ScriptedFieldProber::new()
        .then(FieldProbeResponse::next_field())
        .then(FieldProbeResponse::question("Can you clarify the date?"));
    let h = into_employment(field).await?;

    h.answer_all(&["Acme Logistics", "4/2020"]).await;
    assert_eq!(
        field_position(&h.current()),
        Some((1, Some("Can you clarify the date?".to_string())))
    );

    h.answer_all(&["It was April, right after the audit"]).await;
    assert_eq!(field_position(&h.current()), Some((2, None)));

    let transcript = h.engine.transcript()?;
    assert_eq!(entries_with_suffix(&transcript, "probe_q1").len(), 1);
    assert_eq!(entries_with_suffix(&transcript, "probe_a1").len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_clarifiers_stop_at_cap() -> DossierResult<()> {
    let field = ScriptedFieldProber::with_fallback(FieldProbeResponse::question("Anything else?"));
    let h = into_employment(field.clone()).await?;

    h.answer_all(&["Acme Logistics"]).await;
    assert_eq!(
        field_position(&h.current()),
        Some((0, Some("Anything else?".to_string())))
    );
    h.answer_all(&["They moved offices"]).await;
    assert_eq!(
        field_position(&h.current()),
        Some((0, Some("Anything else?".to_string())))
    );

    // Pack cap is two clarifiers; the third answer goes straight on
    h.answer_all(&["Nothing else"]).await;
    assert_eq!(field_position(&h.current()), Some((1, None)));
    assert_eq!(field.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_probe_failure_then_retry() -> DossierResult<()> {
    let field = ScriptedFieldProber::new().then_fail(ProbeError::Timeout {
        provider: "scripted".to_string(),
        timeout_ms: 5000,
    });
    let h = into_employment(field.clone()).await?;

    let outcome = h.answer("Acme Logistics").await;
    assert!(matches!(
        outcome,
        SubmitOutcome::ProbeFailed {
            error: ProbeError::Timeout { .. }
        }
    ));
    let item = h.current().unwrap();
    assert_eq!(field_position(&Some(item.clone())), Some((0, None)));
    assert!(h.engine.snapshot()?.last_error.is_some());

    let retried = h.engine.submit(&item, SubmitInput::Retry).await?;
    match retried {
        SubmitOutcome::Advanced { current } => {
            assert_eq!(field_position(&current), Some((1, None)));
        }
        other => panic!("expected advance, got {:?}", other),
    }
    assert_eq!(field.call_count(), 2);
    assert!(h.engine.snapshot()?.last_error.is_none());

    h.drain().await;
    assert_eq!(h.audit.count("probe_failed"), 1);
    Ok(())
}

#[tokio::test]
async fn test_service_error_reported_as_probe_failure() -> DossierResult<()> {
    let field = ScriptedFieldProber::new().then(FieldProbeResponse::error("RATE_LIMITED"));
    let h = into_employment(field).await?;

    let outcome = h.answer("Acme Logistics").await;
    assert_eq!(
        outcome,
        SubmitOutcome::ProbeFailed {
            error: ProbeError::Service {
                code: "RATE_LIMITED".to_string()
            }
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_retry_without_failed_probe_is_stale() -> DossierResult<()> {
    let h = Harness::open().await?;
    let item = h.current().unwrap();
    let outcome = h.engine.submit(&item, SubmitInput::Retry).await?;
    assert_eq!(outcome, SubmitOutcome::Stale);
    Ok(())
}

#[tokio::test]
async fn test_invalid_field_answer_can_be_corrected() -> DossierResult<()> {
    let h = into_employment(ScriptedFieldProber::new()).await?;
    h.answer_all(&["Acme Logistics"]).await;

    match h.answer("spring 2020").await {
        SubmitOutcome::Rejected { error, .. } => {
            assert!(matches!(error, ValidationError::InvalidDate { .. }));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(field_position(&h.current()), Some((1, None)));

    h.answer_all(&["4/2020"]).await;
    assert_eq!(field_position(&h.current()), Some((2, None)));
    Ok(())
}

#[tokio::test]
async fn test_confident_suggestion_fills_later_field() -> DossierResult<()> {
    let field = ScriptedFieldProber::new()
        .then(FieldProbeResponse::next_field())
        .then(FieldProbeResponse::next_field().with_suggestion("reason", "Laid off", 0.9));
    let h = into_employment(field).await?;

    // "reason" is filled; "rehire" only shows for fired or terminated
    h.answer_all(&["Acme Logistics"]).await;
    let outcome = h.answer("4/2020").await;
    assert_eq!(
        outcome,
        SubmitOutcome::Advanced {
            current: Some(InterviewItem::question("Q030"))
        }
    );
    assert_system_entry(&h.engine.transcript()?, "autofill");
    Ok(())
}

#[tokio::test]
async fn test_weak_suggestion_is_ignored() -> DossierResult<()> {
    let field = ScriptedFieldProber::new()
        .then(FieldProbeResponse::next_field())
        .then(FieldProbeResponse::next_field().with_suggestion("reason", "Laid off", 0.6));
    let h = into_employment(field).await?;

    h.answer_all(&["Acme Logistics", "4/2020"]).await;
    assert_eq!(field_position(&h.current()), Some((2, None)));

    // Fired makes the rehire question visible
    h.answer_all(&["Fired"]).await;
    assert_eq!(field_position(&h.current()), Some((3, None)));
    Ok(())
}

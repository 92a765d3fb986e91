//! Integration tests for full-AI and multi-incident packs
//!
//! Tests verify:
//! - Opener, prompt and answer turns in order
//! - Multi-incident packs end at the gate; single incidents leave a note
//! - The turn cap and prober failures end the incident
//! - The stall watchdog re-shows the opener, then exits

#[path = "support/engine.rs"]
mod test_engine_support;

use dossier_core::{DossierResult, InterviewItem, ProbeError};
use dossier_engine::SubmitOutcome;
use dossier_test_utils::assertions::{assert_base_pair, assert_system_entry, assert_unique_keys};
use dossier_test_utils::fixtures::{ALTERCATION_PACK, THEFT_PACK};
use dossier_test_utils::ScriptedIncidentProber;
use std::time::Duration;
use test_engine_support::{Harness, HarnessBuilder};

async fn into_theft(incident: ScriptedIncidentProber) -> DossierResult<Harness> {
    let h = HarnessBuilder::new().incident(incident).open().await?;
    h.answer_all(&["No", "No", "No", "Yes"]).await;
    assert!(matches!(
        h.current(),
        Some(InterviewItem::PackOpener { attempt: 1, .. })
    ));
    Ok(h)
}

fn prompt_of(outcome: &SubmitOutcome) -> Option<(u32, String)> {
    match outcome {
        SubmitOutcome::Advanced {
            current:
                Some(InterviewItem::Probing {
                    turn,
                    prompt: Some(prompt),
                    ..
                }),
        } => Some((*turn, prompt.clone())),
        _ => None,
    }
}

#[tokio::test]
async fn test_multi_incident_ends_at_gate() -> DossierResult<()> {
    let incident = ScriptedIncidentProber::new().then_prompt("Who else was involved?");
    let h = HarnessBuilder::new().incident(incident.clone()).open().await?;
    h.answer_all(&["No", "No", "No", "No", "Yes"]).await;

    match h.current() {
        Some(InterviewItem::PackOpener {
            pack_id,
            category_id,
            ..
        }) => {
            assert_eq!(pack_id, ALTERCATION_PACK);
            assert_eq!(category_id, "violence");
        }
        other => panic!("expected opener, got {:?}", other),
    }

    let outcome = h.answer("We argued outside a bar in 2021.").await;
    assert_eq!(
        prompt_of(&outcome),
        Some((0, "Who else was involved?".to_string()))
    );

    // Script exhausted: the prober reports the incident complete
    let outcome = h.answer("Two friends of mine.").await;
    assert_eq!(
        outcome,
        SubmitOutcome::Advanced {
            current: Some(InterviewItem::MultiInstanceGate {
                pack_id: ALTERCATION_PACK.to_string(),
                base_question_id: "Q040".to_string(),
                instance_number: 1,
            })
        }
    );

    let outcome = h.answer("No").await;
    assert_eq!(
        outcome,
        SubmitOutcome::Advanced {
            current: Some(InterviewItem::question("Q050"))
        }
    );

    let requests = incident.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].opener_answer, "We argued outside a bar in 2021.");
    assert_eq!(requests[1].exchanges.len(), 1);

    let transcript = h.engine.transcript()?;
    assert_base_pair(&transcript, "Q040", "Yes");
    assert_unique_keys(&transcript);
    Ok(())
}

#[tokio::test]
async fn test_turn_cap_ends_incident_with_note() -> DossierResult<()> {
    let incident = ScriptedIncidentProber::new()
        .then_prompt("What did you take?")
        .then_prompt("Was it returned?")
        .then_prompt("Did anyone report it?")
        .then_prompt("Anything else?");
    let h = into_theft(incident.clone()).await?;

    let outcome = h.answer("I took a laptop from work.").await;
    assert_eq!(prompt_of(&outcome).map(|(turn, _)| turn), Some(0));
    let outcome = h.answer("A laptop.").await;
    assert_eq!(prompt_of(&outcome).map(|(turn, _)| turn), Some(1));
    let outcome = h.answer("Yes, the next week.").await;
    assert_eq!(prompt_of(&outcome).map(|(turn, _)| turn), Some(2));

    // Third answer hits the cap of three turns
    let outcome = h.answer("No.").await;
    assert_eq!(
        outcome,
        SubmitOutcome::Advanced {
            current: Some(InterviewItem::question("Q040"))
        }
    );
    assert_eq!(incident.call_count(), 3);
    assert_system_entry(&h.engine.transcript()?, "exit");
    Ok(())
}

#[tokio::test]
async fn test_prober_failure_exits_incident() -> DossierResult<()> {
    let incident = ScriptedIncidentProber::new().then_fail(ProbeError::RequestFailed {
        provider: "scripted".to_string(),
        status: 503,
        message: "unavailable".to_string(),
    });
    let h = into_theft(incident).await?;

    let outcome = h.answer("I took a laptop from work.").await;
    assert_eq!(
        outcome,
        SubmitOutcome::Advanced {
            current: Some(InterviewItem::question("Q040"))
        }
    );

    let transcript = h.engine.transcript()?;
    assert_system_entry(&transcript, "exit");
    assert_base_pair(&transcript, "Q030", "Yes");

    h.drain().await;
    assert_eq!(h.audit.count("probe_failed"), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_answer_while_prompt_pending_is_busy() -> DossierResult<()> {
    let h = into_theft(ScriptedIncidentProber::stalled()).await?;
    let outcome = h.answer("I took a laptop from work.").await;
    assert!(matches!(
        outcome,
        SubmitOutcome::Advanced {
            current: Some(InterviewItem::Probing { prompt: None, .. })
        }
    ));

    let waiting = h.current().unwrap();
    assert_eq!(h.answer("Hello?").await, SubmitOutcome::Busy);
    assert_eq!(h.current(), Some(waiting));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stalled_prober_reshows_opener_then_exits() -> DossierResult<()> {
    let h = into_theft(ScriptedIncidentProber::stalled()).await?;

    // Returns once the prompt wait runs out
    let outcome = h.answer("I took a laptop from work.").await;
    assert!(matches!(
        outcome,
        SubmitOutcome::Advanced {
            current: Some(InterviewItem::Probing { prompt: None, turn: 0, .. })
        }
    ));

    tokio::time::sleep(Duration::from_secs(13)).await;
    match h.current() {
        Some(InterviewItem::PackOpener {
            pack_id, attempt, ..
        }) => {
            assert_eq!(pack_id, THEFT_PACK);
            assert_eq!(attempt, 2);
        }
        other => panic!("expected re-shown opener, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(h.current(), Some(InterviewItem::question("Q040")));

    let transcript = h.engine.transcript()?;
    assert_base_pair(&transcript, "Q030", "Yes");
    assert_system_entry(&transcript, "stall");
    assert_system_entry(&transcript, "stall_exit");
    assert_system_entry(&transcript, "exit");
    assert!(!h.engine.snapshot()?.committing);

    h.drain().await;
    assert_eq!(h.audit.count("stall_recovered"), 2);
    Ok(())
}

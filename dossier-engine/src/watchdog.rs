//! Stall watchdog for the incident flow
//!
//! Every opener or probe answer issues a fresh token and starts a two-stage
//! timer. When a stage fires, `assess` decides from the current state alone
//! what, if anything, to do; any newer token turns the timer into a no-op.

use crate::engine::InterviewEngine;
use crate::session::SessionState;
use dossier_core::{DossierResult, InterviewItem, StallError};
use dossier_events::{InterviewEventKind, WatchdogStage};

/// Recovery step chosen for a fired watchdog stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    Ignore,
    /// No AI turn yet: show the opener again with the next attempt number
    ReshowOpener,
    /// At least one AI turn done: ask the prober again
    ReissuePrompt,
    /// Leave the pack through the gate or an exit note
    Exit,
}

impl WatchdogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchdogAction::Ignore => "ignore",
            WatchdogAction::ReshowOpener => "reshow_opener",
            WatchdogAction::ReissuePrompt => "reissue_prompt",
            WatchdogAction::Exit => "exit",
        }
    }
}

/// Decide what a watchdog carrying `token` should do at `stage`.
pub fn assess(state: &SessionState, token: u64, stage: WatchdogStage) -> WatchdogAction {
    if token != state.watchdog_token || state.committing {
        return WatchdogAction::Ignore;
    }
    let turns = state
        .instance
        .as_ref()
        .map(|i| i.incident_turns)
        .unwrap_or(0);
    match (stage, &state.current_item) {
        (WatchdogStage::First, Some(InterviewItem::Probing { prompt: None, .. })) => {
            if turns == 0 {
                WatchdogAction::ReshowOpener
            } else {
                WatchdogAction::ReissuePrompt
            }
        }
        (WatchdogStage::Second, Some(InterviewItem::Probing { prompt: None, .. })) => {
            WatchdogAction::Exit
        }
        (WatchdogStage::Second, Some(InterviewItem::PackOpener { attempt, .. })) if *attempt > 1 => {
            WatchdogAction::Exit
        }
        _ => WatchdogAction::Ignore,
    }
}

impl InterviewEngine {
    /// Start both watchdog stages for `token`.
    pub(crate) fn spawn_watchdog(&self, token: u64) {
        let engine = self.clone();
        let windows = self.inner.config.watchdog.clone();
        tokio::spawn(async move {
            tokio::time::sleep(windows.first_window).await;
            if let Err(e) = engine.fire_watchdog(token, WatchdogStage::First).await {
                engine.on_fatal(&e);
                return;
            }
            tokio::time::sleep(windows.second_window).await;
            if let Err(e) = engine.fire_watchdog(token, WatchdogStage::Second).await {
                engine.on_fatal(&e);
            }
        });
    }

    async fn fire_watchdog(&self, token: u64, stage: WatchdogStage) -> DossierResult<()> {
        let fired = self.with_state(|s| {
            let action = assess(s, token, stage);
            if action == WatchdogAction::Ignore {
                return None;
            }
            let stalled = s.current_item.clone()?;
            let instance = s.instance.as_ref()?;
            let pack_id = instance.pack_id.clone();
            let instance_number = instance.instance_number;
            let stall = StallError::NoPrompt {
                pack_id: pack_id.clone(),
                instance_number,
                turn: instance.incident_turns,
            };

            let tag = match stage {
                WatchdogStage::First => "stall",
                WatchdogStage::Second => "stall_exit",
            };
            let meta = s.meta_for(&stalled);
            s.transcript
                .append_system(s.session_id, &stalled, tag, &stall.to_string(), meta);

            match (action, &stalled) {
                (WatchdogAction::ReshowOpener, InterviewItem::Probing { category_id, .. }) => {
                    let attempt = s.opener_attempt + 1;
                    self.present_opener(s, category_id, attempt);
                }
                (WatchdogAction::Exit, _) => {
                    s.issue_token();
                    s.committing = true;
                }
                _ => {}
            }
            Some((action, pack_id, instance_number, stall))
        })?;
        let Some((action, pack_id, instance_number, stall)) = fired else {
            tracing::trace!(token, stage = ?stage, "Watchdog idle");
            return Ok(());
        };

        tracing::warn!(
            pack_id = %pack_id,
            instance = instance_number,
            stage = ?stage,
            action = action.as_str(),
            error = %stall,
            "Recovering stalled incident follow-up"
        );
        self.audit(InterviewEventKind::StallRecovered {
            pack_id,
            instance_number,
            stage,
            action: action.as_str().to_string(),
        });

        match action {
            WatchdogAction::ReissuePrompt => {
                self.spawn_prompt_request(token);
                self.persist().await
            }
            WatchdogAction::Exit => self.exit_incident("no AI response").await,
            _ => self.persist().await,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

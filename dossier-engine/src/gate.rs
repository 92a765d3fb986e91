//! Multi-instance gate
//!
//! "Another incident?" after a repeatable question or a multi-incident pack.
//! Yes starts the next instance of the same pack on the same route; No moves
//! on to the next base question.

use crate::engine::{Admission, InterviewEngine, SubmitOutcome};
use dossier_core::{submission_key, DossierResult, InterviewItem, PackInstance, YesNo};

impl InterviewEngine {
    pub(crate) async fn submit_gate(
        &self,
        item: &InterviewItem,
        value: &str,
    ) -> DossierResult<SubmitOutcome> {
        let answer = match YesNo::parse(value) {
            Ok(answer) => answer,
            Err(e) => return Ok(self.rejected(item, e)),
        };
        // An answer already in the transcript under this gate's key means
        // the gate was answered before a restart emptied the ledger.
        let key = submission_key(item, answer.as_str());
        if let Admission::Refused(outcome) = self.admit(item, &key, Some(answer.as_str()), true)? {
            return Ok(outcome);
        }
        self.ensure_instance(item).await?;

        let base_question_id = item.base_question_id();
        match answer {
            YesNo::Yes => {
                let next = self.with_state(|s| s.instance.as_ref().map(PackInstance::next))?;
                match next {
                    Some(next) => {
                        tracing::info!(
                            pack_id = %next.pack_id,
                            instance = next.instance_number,
                            "Another instance requested"
                        );
                        self.start_instance(next).await?;
                    }
                    None => {
                        tracing::warn!(
                            question_id = %base_question_id,
                            "Gate answered without an instance, advancing"
                        );
                        self.with_state(|s| self.advance_from(s, base_question_id))?;
                    }
                }
            }
            YesNo::No => self.with_state(|s| self.advance_from(s, base_question_id))?,
        }

        self.settle().await
    }
}

use std::time::Instant;

use serde::Serialize;

use crate::error::{EnqueteError, Result};
use crate::models::{CompletionReceipt, Credentials, SessionPatch};

use super::SurveyFlow;

/// Where a flow stands in its lifecycle. `Completed` is terminal; a flow
/// stuck in `Finalizing` after a failed step may retry finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStage {
    Collecting,
    AwaitingAuth,
    Finalizing,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// No identity is attached yet; the flow suspends until authentication.
    AwaitingAuth,
    Completed(CompletionReceipt),
}

impl SurveyFlow {
    /// Finish-intent at the last question. Settles pending debounced writes
    /// first, so the terminal write lock cannot eat the final text answer,
    /// then finalizes directly when an identity is already signed in or
    /// suspends in `AwaitingAuth` otherwise. Suspension has no timeout:
    /// abandoning here leaves the session recoverable through a cold start.
    pub fn finish(&mut self) -> Result<FinishOutcome> {
        self.ensure_collecting()?;
        if self.current_step + 1 != self.catalog.len() {
            return Err(EnqueteError::Validation(
                "finish is only available at the last question".to_string(),
            ));
        }
        if !self.is_answered() {
            return Err(EnqueteError::Validation(format!(
                "question {} is not answered yet",
                self.current_question().id
            )));
        }
        self.settle();

        let started = Instant::now();
        match self.gate.current_identity() {
            Ok(Some(identity)) => {
                self.stage = FlowStage::Finalizing;
                self.journal.log_status(
                    "finish",
                    "ok",
                    started,
                    Some(&self.session_id),
                    None,
                    Some(serde_json::json!({ "identity": "present" })),
                );
                self.finalize(&identity.user_id).map(FinishOutcome::Completed)
            }
            Ok(None) => {
                self.stage = FlowStage::AwaitingAuth;
                self.journal.log_status(
                    "finish",
                    "ok",
                    started,
                    Some(&self.session_id),
                    None,
                    Some(serde_json::json!({ "identity": "none" })),
                );
                Ok(FinishOutcome::AwaitingAuth)
            }
            Err(err) => {
                // Identity lookup failing is not fatal; wait for an explicit
                // sign-in instead.
                self.stage = FlowStage::AwaitingAuth;
                self.journal.log_warning(
                    "finish",
                    started,
                    Some(&self.session_id),
                    None,
                    &format!("identity lookup failed: {err}"),
                );
                Ok(FinishOutcome::AwaitingAuth)
            }
        }
    }

    /// Runs the sign-up/sign-in exchange while the flow waits for an
    /// identity. An auth failure leaves the stage untouched and may be
    /// retried with new credentials.
    pub fn authenticate(&mut self, credentials: &Credentials) -> Result<CompletionReceipt> {
        if !matches!(self.stage, FlowStage::AwaitingAuth | FlowStage::Finalizing) {
            return Err(EnqueteError::Conflict(
                "the survey is not waiting for authentication".to_string(),
            ));
        }
        let started = Instant::now();
        let identity = match self.gate.complete_signup_or_signin(credentials) {
            Ok(identity) => identity,
            Err(err) => {
                self.journal.log_error(
                    "authenticate",
                    started,
                    Some(&self.session_id),
                    None,
                    &err,
                );
                return Err(err);
            }
        };
        self.journal.log_status(
            "authenticate",
            "ok",
            started,
            Some(&self.session_id),
            None,
            Some(serde_json::json!({ "mode": credentials.mode.as_str() })),
        );
        self.complete_with_identity(&identity.user_id)
    }

    /// Finalizes with a known user id, either from `AwaitingAuth` or as a
    /// retry after a failed `Finalizing` step. Linking is idempotent, so
    /// retrying a partially finalized session is safe.
    pub fn complete_with_identity(&mut self, user_id: &str) -> Result<CompletionReceipt> {
        match self.stage {
            FlowStage::AwaitingAuth | FlowStage::Finalizing => {}
            FlowStage::Collecting => {
                return Err(EnqueteError::Conflict(
                    "the survey is still collecting answers".to_string(),
                ));
            }
            FlowStage::Completed => {
                return Err(EnqueteError::Conflict("session is completed".to_string()));
            }
        }
        self.stage = FlowStage::Finalizing;
        self.finalize(user_id)
    }

    fn finalize(&mut self, user_id: &str) -> Result<CompletionReceipt> {
        let started = Instant::now();
        let result = self.try_finalize(user_id);
        match &result {
            Ok(receipt) => self.journal.log_status(
                "finalize",
                "ok",
                started,
                Some(&self.session_id),
                None,
                Some(serde_json::json!({ "user_id": receipt.user_id })),
            ),
            // Stage stays Finalizing; no compensating transaction, the
            // partial state is observable and re-invocation retries.
            Err(err) => self
                .journal
                .log_error("finalize", started, Some(&self.session_id), None, err),
        }
        result
    }

    fn try_finalize(&mut self, user_id: &str) -> Result<CompletionReceipt> {
        self.store
            .update_session(&self.session_id, &SessionPatch::link(user_id))?;
        let completed = self
            .store
            .update_session(&self.session_id, &SessionPatch::complete())?;
        self.cache.clear()?;
        self.stage = FlowStage::Completed;
        Ok(CompletionReceipt {
            session_id: self.session_id.clone(),
            user_id: user_id.to_string(),
            completed_at: completed.completed_at.unwrap_or(completed.updated_at),
        })
    }
}
